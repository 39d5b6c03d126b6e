pub mod batch;
pub mod catalog;
pub mod config;
pub mod encoder;
pub mod errors;
pub mod features;
pub mod lake;
pub mod listing;
pub mod manifest;
pub mod models;
pub mod partition;
pub mod raw;
pub mod split;
pub mod training;
pub mod watermark;

use crate::batch::BatchCoordinator;
use crate::catalog::Catalog;
use crate::config::{RunConfig, StorageConfig};
use crate::errors::Result;
use crate::features::HolidayCalendar;
use crate::lake::Lake;
use crate::listing::ObjectLister;
use crate::partition::PartitionResolver;
use crate::raw::LakeRawSource;
use crate::training::{InferenceFeaturizer, TrainingArtifacts};
use crate::watermark::WatermarkStore;
use std::sync::Arc;

/// The main entry point for the `featstore` library.
///
/// `FeatureStore` bundles the storage pieces every flow needs:
/// - a local object lake (`Lake`) holding raw per-date uploads and processed records,
/// - a SQLite catalog (`Catalog`) holding job watermarks and the batch-run log,
/// - the artifacts directory where training writes its CSVs and feature bundle.
///
/// # Example
///
/// ```rust,no_run
/// use featstore::{FeatureStore, config::StorageConfig};
/// use tempfile::tempdir;
///
/// #[tokio::main]
/// async fn main() {
///     let dir = tempdir().unwrap();
///     let config = StorageConfig::new(dir.path());
///     let store = FeatureStore::new(config, 1000).await.unwrap();
///
///     // Now you can use store.catalog, store.lake, etc.
/// }
/// ```
pub struct FeatureStore {
    pub config: StorageConfig,
    pub catalog: Arc<Catalog>,
    pub lake: Arc<Lake>,
}

impl FeatureStore {
    /// Opens (creating if needed) the lake directory, the catalog database
    /// and the artifacts directory.
    pub async fn new(config: StorageConfig, page_size: usize) -> Result<Self> {
        tokio::fs::create_dir_all(&config.artifacts_path).await?;
        if let Some(parent) = config.catalog_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let catalog = Arc::new(Catalog::new(&config)?);
        catalog.initialize_schema()?;

        let lake = Arc::new(Lake::new(config.clone(), page_size).await?);

        Ok(Self {
            config,
            catalog,
            lake,
        })
    }

    /// Opens the store with the page size from a run configuration.
    pub async fn open(config: StorageConfig, run: &RunConfig) -> Result<Self> {
        Self::new(config, run.layout.page_size).await
    }

    pub fn partition_resolver(&self, run: &RunConfig) -> PartitionResolver {
        let lister: Arc<dyn ObjectLister> = self.lake.clone();
        let watermarks: Arc<dyn WatermarkStore> = self.catalog.clone();
        PartitionResolver::new(
            lister,
            watermarks,
            run.layout.power_prefix.clone(),
            run.layout.weather_prefix.clone(),
        )
    }

    pub fn batch_coordinator(
        &self,
        run: &RunConfig,
        calendar: Arc<dyn HolidayCalendar>,
    ) -> BatchCoordinator {
        let source = Arc::new(LakeRawSource::new(
            Arc::clone(&self.lake),
            run.layout.clone(),
        ));
        BatchCoordinator::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.lake),
            source,
            run,
            calendar,
        )
    }

    pub async fn prepare_training(
        &self,
        run: &RunConfig,
        calendar: Arc<dyn HolidayCalendar>,
    ) -> Result<TrainingArtifacts> {
        training::prepare_training(
            Arc::clone(&self.lake),
            &self.config.artifacts_path,
            run,
            calendar,
        )
        .await
    }

    pub async fn inference_featurizer(
        &self,
        calendar: Arc<dyn HolidayCalendar>,
    ) -> Result<InferenceFeaturizer> {
        InferenceFeaturizer::load(&self.config.artifacts_path, calendar).await
    }
}
