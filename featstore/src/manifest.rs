use crate::config::FeatureThresholds;
use crate::encoder::{EncoderRegistry, FittedEncoder, UnknownCategoryPolicy};
use crate::errors::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const BUNDLE_FORMAT_VERSION: u32 = 1;
pub const BUNDLE_FILE: &str = "feature_bundle.json";
pub const FEATURES_FILE: &str = "features.txt";

/// Ordered feature column names agreed between training and inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureManifest {
    columns: Vec<String>,
}

impl FeatureManifest {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// One name per line.
    pub fn to_lines(&self) -> String {
        let mut out = self.columns.join("\n");
        out.push('\n');
        out
    }

    pub fn from_lines(raw: &str) -> Self {
        Self {
            columns: raw
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Everything inference needs to reproduce training features: the
/// calibration thresholds, the fitted encoders and the frozen manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBundle {
    pub format_version: u32,
    pub created_at: i64,
    pub target: String,
    pub thresholds: FeatureThresholds,
    pub unknown_category: UnknownCategoryPolicy,
    pub encoders: Vec<FittedEncoder>,
    pub manifest: FeatureManifest,
}

impl FeatureBundle {
    pub fn new(target: &str, thresholds: FeatureThresholds, registry: &EncoderRegistry) -> Self {
        Self {
            format_version: BUNDLE_FORMAT_VERSION,
            created_at: chrono::Utc::now().timestamp(),
            target: target.to_string(),
            thresholds,
            unknown_category: registry.policy(),
            encoders: registry.encoders().to_vec(),
            manifest: FeatureManifest::new(registry.manifest().to_vec()),
        }
    }

    /// The frozen registry described by this bundle.
    pub fn registry(&self) -> Result<EncoderRegistry> {
        EncoderRegistry::from_parts(
            self.encoders.clone(),
            self.manifest.columns().to_vec(),
            self.unknown_category,
        )
    }

    /// Column layout of the training CSVs: target first, then the manifest.
    pub fn training_columns(&self) -> FeatureManifest {
        let mut columns = Vec::with_capacity(self.manifest.columns().len() + 1);
        columns.push(self.target.clone());
        columns.extend(self.manifest.columns().iter().cloned());
        FeatureManifest::new(columns)
    }

    pub fn validate(&self) -> Result<()> {
        if self.format_version != BUNDLE_FORMAT_VERSION {
            return Err(StoreError::ManifestMismatch(format!(
                "unsupported bundle format version {} (expected {})",
                self.format_version, BUNDLE_FORMAT_VERSION
            )));
        }
        if self.manifest.columns().contains(&self.target) {
            return Err(StoreError::ManifestMismatch(format!(
                "target '{}' must not appear among the feature columns",
                self.target
            )));
        }
        self.registry().map(|_| ())
    }

    pub async fn save(&self, dir: &Path) -> Result<()> {
        self.validate()?;
        tokio::fs::create_dir_all(dir).await?;
        let bundle_path = dir.join(BUNDLE_FILE);
        tokio::fs::write(&bundle_path, serde_json::to_vec_pretty(self)?).await?;
        tokio::fs::write(dir.join(FEATURES_FILE), self.training_columns().to_lines()).await?;
        log::info!(
            "Saved feature bundle with {} column(s) to {}",
            self.manifest.columns().len(),
            bundle_path.display()
        );
        Ok(())
    }

    /// Loads and validates a bundle. When `features.txt` is present it must
    /// agree with the bundle's own manifest.
    pub async fn load(dir: &Path) -> Result<Self> {
        let bundle_path = dir.join(BUNDLE_FILE);
        let raw = match tokio::fs::read(&bundle_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(format!(
                    "feature bundle '{}'",
                    bundle_path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let bundle: FeatureBundle = serde_json::from_slice(&raw)?;
        bundle.validate()?;

        let features_path = dir.join(FEATURES_FILE);
        if tokio::fs::try_exists(&features_path).await? {
            let listed = FeatureManifest::from_lines(&tokio::fs::read_to_string(&features_path).await?);
            if listed != bundle.training_columns() {
                return Err(StoreError::ManifestMismatch(format!(
                    "{} does not match {}",
                    FEATURES_FILE, BUNDLE_FILE
                )));
            }
        }
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{EncoderKind, EncoderSpec};
    use crate::features::{FeatureFrame, FeatureValue, FrameRow};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn thresholds() -> FeatureThresholds {
        FeatureThresholds {
            hot_day: 30.0,
            cold_day: 5.0,
            cdd_base: 18.0,
            hdd_base: 18.0,
        }
    }

    fn registry() -> EncoderRegistry {
        let frame = FeatureFrame {
            columns: vec!["avg".into(), "weather_category".into()],
            rows: ["sunny", "snow"]
                .iter()
                .enumerate()
                .map(|(i, w)| FrameRow {
                    date: NaiveDate::from_ymd_opt(2024, 1, i as u32 + 1).unwrap(),
                    target: Some(1.0),
                    cells: vec![FeatureValue::Float(1.0), FeatureValue::Text(w.to_string())],
                })
                .collect(),
        };
        let spec = EncoderSpec {
            name: "w".into(),
            kind: EncoderKind::OneHot,
            columns: vec!["weather_category".into()],
        };
        EncoderRegistry::fit_transform(&[spec], &frame, UnknownCategoryPolicy::Reserved)
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn test_save_and_load_bundle() {
        let dir = tempdir().unwrap();
        let bundle = FeatureBundle::new("max_power", thresholds(), &registry());
        bundle.save(dir.path()).await.unwrap();

        let features = std::fs::read_to_string(dir.path().join(FEATURES_FILE)).unwrap();
        assert_eq!(
            features,
            "max_power\navg\nweather_category_sunny\nweather_category_snow\n"
        );

        let loaded = FeatureBundle::load(dir.path()).await.unwrap();
        assert_eq!(loaded, bundle);
        assert_eq!(loaded.registry().unwrap(), registry());
    }

    #[tokio::test]
    async fn test_load_detects_tampering() {
        let dir = tempdir().unwrap();
        FeatureBundle::new("max_power", thresholds(), &registry())
            .save(dir.path())
            .await
            .unwrap();
        std::fs::write(dir.path().join(FEATURES_FILE), "max_power\navg\n").unwrap();
        assert!(matches!(
            FeatureBundle::load(dir.path()).await,
            Err(StoreError::ManifestMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_load_missing_bundle() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            FeatureBundle::load(dir.path()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_version_and_target_checks() {
        let mut bundle = FeatureBundle::new("max_power", thresholds(), &registry());
        bundle.format_version = 99;
        assert!(bundle.validate().is_err());

        let bundle = FeatureBundle::new("avg", thresholds(), &registry());
        assert!(matches!(
            bundle.validate(),
            Err(StoreError::ManifestMismatch(_))
        ));
    }
}
