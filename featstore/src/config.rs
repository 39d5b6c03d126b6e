use crate::encoder::{EncoderSpec, UnknownCategoryPolicy};
use crate::errors::{Result, StoreError};
use crate::features::FEATURE_COLUMNS;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Debug, Clone)]
pub struct StorageConfig {
    pub lake_path: PathBuf,
    pub catalog_path: PathBuf,
    pub artifacts_path: PathBuf,
}

impl StorageConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            lake_path: base_path.join("lake"),
            catalog_path: base_path.join("catalog.sqlite"),
            artifacts_path: base_path.join("artifacts"),
        }
    }
}

/// Where raw and processed objects live inside the lake.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LakeLayout {
    pub power_prefix: String,
    pub weather_prefix: String,
    pub processed_prefix: String,
    pub power_file: String,
    pub weather_file: String,
    pub power_column: String,
    pub power_skip_rows: usize,
    pub page_size: usize,
}

impl Default for LakeLayout {
    fn default() -> Self {
        Self {
            power_prefix: "raw_power_usage/".to_string(),
            weather_prefix: "raw_weather_data/".to_string(),
            processed_prefix: "processed/".to_string(),
            power_file: "power_usage.csv".to_string(),
            weather_file: "weather_data.csv".to_string(),
            power_column: "usage".to_string(),
            power_skip_rows: 0,
            page_size: 1000,
        }
    }
}

impl LakeLayout {
    /// `<prefix>YYYY-MM/YYYY-MM-DD/<file>`
    pub fn partition_key(prefix: &str, date: NaiveDate, file: &str) -> String {
        format!(
            "{}{}/{}/{}",
            prefix,
            date.format("%Y-%m"),
            date.format("%Y-%m-%d"),
            file
        )
    }

    pub fn power_key(&self, date: NaiveDate) -> String {
        Self::partition_key(&self.power_prefix, date, &self.power_file)
    }

    pub fn weather_key(&self, date: NaiveDate) -> String {
        Self::partition_key(&self.weather_prefix, date, &self.weather_file)
    }

    pub fn processed_key(&self, date: NaiveDate) -> String {
        format!(
            "{}dt={}/record.json",
            self.processed_prefix,
            date.format("%Y-%m-%d")
        )
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct FeatureThresholds {
    pub hot_day: f64,
    pub cold_day: f64,
    pub cdd_base: f64,
    pub hdd_base: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SplitConfig {
    pub test_date: Option<NaiveDate>,
    pub test_size: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_date: None,
            test_size: 0.2,
        }
    }
}

fn default_job_name() -> String {
    "power_weather_daily".to_string()
}

fn default_target() -> String {
    "max_power".to_string()
}

/// Run configuration, usually loaded from `config.yaml`.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RunConfig {
    #[serde(default = "default_job_name")]
    pub job_name: String,
    #[serde(default)]
    pub layout: LakeLayout,
    pub feature_thresholds: FeatureThresholds,
    #[serde(default)]
    pub encoders: Vec<EncoderSpec>,
    #[serde(default)]
    pub unknown_category: UnknownCategoryPolicy,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default = "default_target")]
    pub target: String,
}

impl RunConfig {
    pub fn with_thresholds(feature_thresholds: FeatureThresholds) -> Self {
        Self {
            job_name: default_job_name(),
            layout: LakeLayout::default(),
            feature_thresholds,
            encoders: Vec::new(),
            unknown_category: UnknownCategoryPolicy::default(),
            split: SplitConfig::default(),
            target: default_target(),
        }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: RunConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("failed to read config '{}': {}", path.display(), e))
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.job_name.trim().is_empty() {
            return Err(StoreError::Config("job_name must not be empty".into()));
        }
        if self.target.trim().is_empty() {
            return Err(StoreError::Config("target must not be empty".into()));
        }
        if self.layout.page_size == 0 {
            return Err(StoreError::Config("layout.page_size must be > 0".into()));
        }
        if self.layout.power_prefix == self.layout.weather_prefix {
            return Err(StoreError::Config(
                "layout.power_prefix and layout.weather_prefix must differ".into(),
            ));
        }

        let t = &self.feature_thresholds;
        for (name, value) in [
            ("hot_day", t.hot_day),
            ("cold_day", t.cold_day),
            ("cdd_base", t.cdd_base),
            ("hdd_base", t.hdd_base),
        ] {
            if !value.is_finite() {
                return Err(StoreError::Config(format!(
                    "feature_thresholds.{name} must be a finite number"
                )));
            }
        }

        if !(self.split.test_size > 0.0 && self.split.test_size < 1.0) {
            return Err(StoreError::Config(format!(
                "split.test_size must be in (0, 1), got {}",
                self.split.test_size
            )));
        }

        let mut names = HashSet::new();
        for spec in &self.encoders {
            if !names.insert(spec.name.as_str()) {
                return Err(StoreError::Config(format!(
                    "duplicate encoder name '{}'",
                    spec.name
                )));
            }
            if spec.columns.is_empty() {
                return Err(StoreError::Config(format!(
                    "encoder '{}' declares no columns",
                    spec.name
                )));
            }
            for column in &spec.columns {
                if !FEATURE_COLUMNS.contains(&column.as_str()) {
                    return Err(StoreError::Config(format!(
                        "encoder '{}' targets unknown feature column '{}'",
                        spec.name, column
                    )));
                }
            }
        }

        Ok(())
    }
}
