use crate::catalog::Catalog;
use crate::config::{LakeLayout, RunConfig};
use crate::errors::Result;
use crate::features::{FeatureEngine, HolidayCalendar};
use crate::lake::Lake;
use crate::listing::ObjectLister;
use crate::models::{AdvanceOutcome, BatchOutcome};
use crate::partition::PartitionResolver;
use crate::raw::RawRecordSource;
use crate::watermark::WatermarkStore;
use chrono::NaiveDate;
use std::sync::Arc;

pub const STATUS_SUCCESS: &str = "SUCCESS";
pub const STATUS_FAILED: &str = "FAILED";

/// Drives one daily ingestion batch: resolve new dates, fetch and validate
/// their raw records, persist them, then advance the watermark.
pub struct BatchCoordinator {
    catalog: Arc<Catalog>,
    lake: Arc<Lake>,
    source: Arc<dyn RawRecordSource>,
    resolver: PartitionResolver,
    engine: FeatureEngine,
    layout: LakeLayout,
}

impl BatchCoordinator {
    pub fn new(
        catalog: Arc<Catalog>,
        lake: Arc<Lake>,
        source: Arc<dyn RawRecordSource>,
        config: &RunConfig,
        calendar: Arc<dyn HolidayCalendar>,
    ) -> Self {
        let lister: Arc<dyn ObjectLister> = lake.clone();
        let watermarks: Arc<dyn WatermarkStore> = catalog.clone();
        let resolver = PartitionResolver::new(
            lister,
            watermarks,
            config.layout.power_prefix.clone(),
            config.layout.weather_prefix.clone(),
        );
        Self {
            catalog,
            lake,
            source,
            resolver,
            engine: FeatureEngine::new(config.feature_thresholds, calendar),
            layout: config.layout.clone(),
        }
    }

    pub fn resolver(&self) -> &PartitionResolver {
        &self.resolver
    }

    /// Runs the batch under a batch-run log entry. Any error leaves the
    /// watermark untouched so the whole batch can be retried.
    pub async fn run_daily_batch(&self, job_name: &str) -> Result<BatchOutcome> {
        let run_id = self.catalog.create_batch_run(job_name)?;
        log::info!("Starting daily batch for job '{}' (run {})", job_name, run_id);

        match self.process(job_name).await {
            Ok(outcome) => {
                let details = describe(&outcome);
                self.catalog
                    .finish_batch_run(run_id, STATUS_SUCCESS, &details)?;
                log::info!("Daily batch for job '{}' finished: {}", job_name, details);
                Ok(outcome)
            }
            Err(err) => {
                if let Err(log_err) =
                    self.catalog
                        .finish_batch_run(run_id, STATUS_FAILED, &err.to_string())
                {
                    log::warn!("Failed to record failure of run {}: {}", run_id, log_err);
                }
                log::error!("Daily batch for job '{}' failed: {}", job_name, err);
                Err(err)
            }
        }
    }

    async fn process(&self, job_name: &str) -> Result<BatchOutcome> {
        let dates = self.resolver.resolve(job_name).await?;
        let Some(&last) = dates.last() else {
            return Ok(BatchOutcome::NothingNew);
        };

        for &date in &dates {
            let record = self.source.fetch(date).await?;
            // Rejects records the feature engine cannot use before anything is committed.
            self.engine.derive(&record)?;
            self.lake
                .write_json(&self.layout.processed_key(date), &record)
                .await?;
            log::debug!("Stored processed record for {}", date);
        }

        match self.catalog.advance(job_name, last)? {
            AdvanceOutcome::Accepted => Ok(BatchOutcome::Processed { dates }),
            AdvanceOutcome::Rejected { current } => {
                log::info!(
                    "Another run already advanced '{}' to {}; treating this run as a no-op",
                    job_name,
                    current
                );
                Ok(BatchOutcome::AlreadyAdvanced { dates, current })
            }
        }
    }
}

fn describe(outcome: &BatchOutcome) -> String {
    fn span(dates: &[NaiveDate]) -> String {
        match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => format!("{} date(s) {}..={}", dates.len(), first, last),
            _ => "0 date(s)".to_string(),
        }
    }
    match outcome {
        BatchOutcome::NothingNew => "No new dates to process.".to_string(),
        BatchOutcome::Processed { dates } => format!("Processed {}.", span(dates)),
        BatchOutcome::AlreadyAdvanced { dates, current } => format!(
            "Processed {}; watermark already at {}.",
            span(dates),
            current
        ),
    }
}
