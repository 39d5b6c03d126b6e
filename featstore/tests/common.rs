use std::sync::Arc;

use chrono::NaiveDate;
use featstore::{
    catalog::Catalog,
    config::{FeatureThresholds, LakeLayout, RunConfig, StorageConfig},
    lake::Lake,
};
use tempfile::TempDir;

#[allow(dead_code)]
pub struct TestContext {
    pub temp_dir: TempDir,
    pub config: StorageConfig,
    pub catalog: Arc<Catalog>,
    pub lake: Arc<Lake>,
}

pub async fn init_test_context() -> anyhow::Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let config = StorageConfig::new(temp_dir.path());

    let catalog = Arc::new(Catalog::new(&config)?);
    catalog.initialize_schema()?;

    let lake = Arc::new(Lake::new(config.clone(), 3).await?);

    Ok(TestContext {
        temp_dir,
        config,
        catalog,
        lake,
    })
}

#[allow(dead_code)]
pub fn run_config() -> RunConfig {
    RunConfig::with_thresholds(FeatureThresholds {
        hot_day: 30.0,
        cold_day: 5.0,
        cdd_base: 18.0,
        hdd_base: 18.0,
    })
}

#[allow(dead_code)]
pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("test date")
}

/// Drops a power file for `day` the way the upstream unzip job does.
#[allow(dead_code)]
pub async fn upload_power(lake: &Lake, layout: &LakeLayout, day: &str, peaks: &[u32]) -> anyhow::Result<()> {
    let mut body = String::from("usage\n");
    for peak in peaks {
        body.push_str(&format!("{peak}\n"));
    }
    lake.write_object(&layout.power_key(date(day)), body.as_bytes())
        .await?;
    Ok(())
}

/// Drops a weather file for `day` the way the upstream extract job does.
#[allow(dead_code)]
pub async fn upload_weather(
    lake: &Lake,
    layout: &LakeLayout,
    day: &str,
    max_temp: f64,
    min_temp: f64,
    weather: &str,
) -> anyhow::Result<()> {
    let body = format!("date,max_temp,min_temp,weather\n{day},{max_temp},{min_temp},{weather}\n");
    lake.write_object(&layout.weather_key(date(day)), body.as_bytes())
        .await?;
    Ok(())
}
