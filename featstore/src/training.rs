//! Training preparation and inference-time feature replay.

use crate::config::{LakeLayout, RunConfig};
use crate::encoder::EncoderRegistry;
use crate::errors::{Result, StoreError};
use crate::features::{FeatureEngine, FeatureFrame, HolidayCalendar};
use crate::lake::Lake;
use crate::listing::{key_stream, ObjectLister};
use crate::manifest::FeatureBundle;
use crate::models::RawDailyRecord;
use crate::split::{write_csv, TrainServeSplitter};
use futures_util::TryStreamExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const TRAIN_FILE: &str = "train.csv";
pub const TEST_FILE: &str = "test.csv";
const PROCESSED_FILE: &str = "record.json";

#[derive(Debug, Clone)]
pub struct TrainingArtifacts {
    pub dir: PathBuf,
    pub bundle: FeatureBundle,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Every processed record in the lake, ordered by date.
pub async fn load_processed(lake: Arc<Lake>, layout: &LakeLayout) -> Result<Vec<RawDailyRecord>> {
    let lister: Arc<dyn ObjectLister> = lake.clone();
    let keys: Vec<String> = key_stream(lister, layout.processed_prefix.clone())
        .try_filter(|key| std::future::ready(key.ends_with(PROCESSED_FILE)))
        .try_collect()
        .await?;

    let mut records = Vec::with_capacity(keys.len());
    for key in keys {
        let bytes = lake.read_object(&key).await?;
        let record: RawDailyRecord = serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::InvalidRawData(format!("processed record '{key}' is unreadable: {e}"))
        })?;
        records.push(record);
    }
    records.sort_by_key(|r| r.date);
    Ok(records)
}

/// Builds the training set from all processed records: derive features, fit
/// the encoders once, split by date and write the CSVs plus the feature
/// bundle into `artifacts_dir`.
pub async fn prepare_training(
    lake: Arc<Lake>,
    artifacts_dir: &Path,
    config: &RunConfig,
    calendar: Arc<dyn HolidayCalendar>,
) -> Result<TrainingArtifacts> {
    config.validate()?;
    let records = load_processed(lake, &config.layout).await?;
    if records.is_empty() {
        return Err(StoreError::NotFound(format!(
            "no processed records under '{}'",
            config.layout.processed_prefix
        )));
    }
    log::info!("Preparing training data from {} record(s)", records.len());

    let engine = FeatureEngine::new(config.feature_thresholds, calendar);
    let frame = engine.frame(&records)?;
    let (registry, encoded) =
        EncoderRegistry::fit_transform(&config.encoders, &frame, config.unknown_category)?;
    let split = TrainServeSplitter::new(config.target.clone(), &config.split)?.split(&encoded)?;

    tokio::fs::create_dir_all(artifacts_dir).await?;
    write_csv(&artifacts_dir.join(TRAIN_FILE), &split.train).await?;
    write_csv(&artifacts_dir.join(TEST_FILE), &split.test).await?;

    let bundle = FeatureBundle::new(&config.target, config.feature_thresholds, &registry);
    bundle.save(artifacts_dir).await?;

    Ok(TrainingArtifacts {
        dir: artifacts_dir.to_path_buf(),
        bundle,
        train_rows: split.train.len(),
        test_rows: split.test.len(),
    })
}

/// One inference row, values in manifest order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceRow {
    pub date: chrono::NaiveDate,
    pub values: Vec<crate::features::FeatureValue>,
}

/// Replays the training-time transformation with frozen encoders.
pub struct InferenceFeaturizer {
    engine: FeatureEngine,
    registry: EncoderRegistry,
}

impl InferenceFeaturizer {
    pub fn from_bundle(bundle: &FeatureBundle, calendar: Arc<dyn HolidayCalendar>) -> Result<Self> {
        Ok(Self {
            engine: FeatureEngine::new(bundle.thresholds, calendar),
            registry: bundle.registry()?,
        })
    }

    pub async fn load(artifacts_dir: &Path, calendar: Arc<dyn HolidayCalendar>) -> Result<Self> {
        let bundle = FeatureBundle::load(artifacts_dir).await?;
        Self::from_bundle(&bundle, calendar)
    }

    pub fn manifest(&self) -> &[String] {
        self.registry.manifest()
    }

    /// Features for `records`; any target on the input is dropped.
    pub fn featurize(&self, records: &[RawDailyRecord]) -> Result<FeatureFrame> {
        let mut frame = self.registry.transform(&self.engine.frame(records)?)?;
        for row in &mut frame.rows {
            row.target = None;
        }
        Ok(frame)
    }

    pub fn featurize_rows(&self, records: &[RawDailyRecord]) -> Result<Vec<InferenceRow>> {
        Ok(self
            .featurize(records)?
            .rows
            .into_iter()
            .map(|row| InferenceRow {
                date: row.date,
                values: row.cells,
            })
            .collect())
    }
}
