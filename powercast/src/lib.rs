use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use featstore::{
    config::{RunConfig, StorageConfig},
    features::{HolidayCalendar, JapaneseHolidays},
    models::{AdvanceOutcome, BatchOutcome, RawDailyRecord, Watermark},
    training::{InferenceFeaturizer, InferenceRow, TrainingArtifacts},
    watermark::WatermarkStore,
    FeatureStore,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Runs the command line interface for the powercast pipeline.
pub async fn run_cli() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Some(command) => execute(command).await?,
        None => {
            println!("No subcommand provided. Use --help to see available commands.");
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Prints the dates that are complete on both raw sources and not yet processed
    Resolve(JobArgs),
    /// Runs the daily ingestion batch and advances the watermark
    Ingest(JobArgs),
    /// Inspects or moves the job watermark
    Watermark(WatermarkArgs),
    /// Builds train/test CSVs and the feature bundle from processed records
    Prepare(JobArgs),
    /// Replays the frozen feature pipeline over raw JSON records
    Featurize(FeaturizeArgs),
}

#[derive(Args, Clone)]
pub struct StoreArgs {
    /// Base directory for the lake, catalog and artifacts
    #[arg(long, env = "POWERCAST_BASE_PATH")]
    pub base_path: PathBuf,
}

#[derive(Args, Clone)]
pub struct JobArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Run configuration (YAML)
    #[arg(long, env = "POWERCAST_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,
    /// Overrides the job name from the configuration
    #[arg(long)]
    pub job: Option<String>,
}

#[derive(Args)]
pub struct WatermarkArgs {
    #[command(flatten)]
    pub job: JobArgs,
    #[command(subcommand)]
    pub action: WatermarkAction,
}

#[derive(Subcommand)]
pub enum WatermarkAction {
    /// Prints the stored watermark
    Show,
    /// Moves the watermark forward; never moves it back
    Advance { date: NaiveDate },
}

#[derive(Args)]
pub struct FeaturizeArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// JSON array of `{date, max_temp, min_temp, weather}` records
    #[arg(long)]
    pub input: PathBuf,
}

/// Output of `featurize`: the manifest once, then one value row per date.
#[derive(Debug, Serialize)]
pub struct FeaturizeOutput {
    pub columns: Vec<String>,
    pub rows: Vec<InferenceRow>,
}

/// An opened store plus the run configuration for one job.
pub struct Pipeline {
    pub store: FeatureStore,
    pub run: RunConfig,
    calendar: Arc<dyn HolidayCalendar>,
}

impl Pipeline {
    pub async fn open(base_path: PathBuf, run: RunConfig) -> anyhow::Result<Self> {
        let store = FeatureStore::open(StorageConfig::new(base_path), &run)
            .await
            .context("failed to open feature store")?;
        Ok(Self {
            store,
            run,
            calendar: Arc::new(JapaneseHolidays),
        })
    }

    pub async fn from_args(args: &JobArgs) -> anyhow::Result<Self> {
        let mut run = RunConfig::load(&args.config)
            .with_context(|| format!("failed to load config '{}'", args.config.display()))?;
        if let Some(job) = &args.job {
            run.job_name = job.clone();
        }
        Self::open(args.store.base_path.clone(), run).await
    }

    pub async fn resolve(&self) -> anyhow::Result<Vec<NaiveDate>> {
        let dates = self
            .store
            .partition_resolver(&self.run)
            .resolve(&self.run.job_name)
            .await?;
        Ok(dates)
    }

    pub async fn ingest(&self) -> anyhow::Result<BatchOutcome> {
        let outcome = self
            .store
            .batch_coordinator(&self.run, self.calendar.clone())
            .run_daily_batch(&self.run.job_name)
            .await
            .with_context(|| format!("daily batch for '{}' failed", self.run.job_name))?;
        Ok(outcome)
    }

    pub fn watermark(&self) -> anyhow::Result<Option<Watermark>> {
        Ok(self.store.catalog.record(&self.run.job_name)?)
    }

    pub fn advance_watermark(&self, date: NaiveDate) -> anyhow::Result<AdvanceOutcome> {
        Ok(self.store.catalog.advance(&self.run.job_name, date)?)
    }

    pub async fn prepare(&self) -> anyhow::Result<TrainingArtifacts> {
        let artifacts = self
            .store
            .prepare_training(&self.run, self.calendar.clone())
            .await
            .context("training preparation failed")?;
        Ok(artifacts)
    }
}

/// Replays stored artifacts over raw records; needs no run configuration.
pub async fn featurize(
    base_path: PathBuf,
    records: &[RawDailyRecord],
) -> anyhow::Result<FeaturizeOutput> {
    let config = StorageConfig::new(base_path);
    let featurizer = InferenceFeaturizer::load(&config.artifacts_path, Arc::new(JapaneseHolidays))
        .await
        .context("failed to load feature artifacts")?;
    Ok(FeaturizeOutput {
        columns: featurizer.manifest().to_vec(),
        rows: featurizer.featurize_rows(records)?,
    })
}

pub async fn execute(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Resolve(args) => {
            let pipeline = Pipeline::from_args(&args).await?;
            let dates = pipeline.resolve().await?;
            if dates.is_empty() {
                info!("No unprocessed dates for '{}'", pipeline.run.job_name);
            }
            for date in dates {
                println!("{date}");
            }
        }
        Command::Ingest(args) => {
            let pipeline = Pipeline::from_args(&args).await?;
            match pipeline.ingest().await? {
                BatchOutcome::NothingNew => info!("Nothing new to process"),
                BatchOutcome::Processed { dates } => {
                    info!("Processed {} date(s)", dates.len());
                }
                BatchOutcome::AlreadyAdvanced { dates, current } => {
                    warn!(
                        "Processed {} date(s) but another run had already advanced to {}",
                        dates.len(),
                        current
                    );
                }
            }
        }
        Command::Watermark(args) => {
            let pipeline = Pipeline::from_args(&args.job).await?;
            match args.action {
                WatermarkAction::Show => match pipeline.watermark()? {
                    Some(w) => println!("{} {}", w.job_name, w.last_processed),
                    None => println!("{} (none)", pipeline.run.job_name),
                },
                WatermarkAction::Advance { date } => match pipeline.advance_watermark(date)? {
                    AdvanceOutcome::Accepted => println!("advanced to {date}"),
                    AdvanceOutcome::Rejected { current } => {
                        println!("already at {current}; left unchanged")
                    }
                },
            }
        }
        Command::Prepare(args) => {
            let pipeline = Pipeline::from_args(&args).await?;
            let artifacts = pipeline.prepare().await?;
            info!(
                "Wrote {} train / {} test row(s) and {} feature column(s) to {}",
                artifacts.train_rows,
                artifacts.test_rows,
                artifacts.bundle.manifest.columns().len(),
                artifacts.dir.display()
            );
        }
        Command::Featurize(args) => {
            let raw = tokio::fs::read(&args.input)
                .await
                .with_context(|| format!("failed to read '{}'", args.input.display()))?;
            let records: Vec<RawDailyRecord> =
                serde_json::from_slice(&raw).context("input must be a JSON array of records")?;
            let output = featurize(args.store.base_path, &records).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watermark_advance() {
        let cli = Cli::try_parse_from([
            "powercast",
            "watermark",
            "--base-path",
            "/tmp/pc",
            "--job",
            "nightly",
            "advance",
            "2024-03-01",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Watermark(args)) => {
                assert_eq!(args.job.job.as_deref(), Some("nightly"));
                assert_eq!(args.job.config, PathBuf::from("config.yaml"));
                assert!(matches!(
                    args.action,
                    WatermarkAction::Advance { date } if date == NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
                ));
            }
            _ => panic!("expected watermark command"),
        }
    }

    #[test]
    fn test_parse_featurize() {
        let cli = Cli::try_parse_from([
            "powercast",
            "featurize",
            "--base-path",
            "/tmp/pc",
            "--input",
            "records.json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Command::Featurize(ref a)) if a.input == PathBuf::from("records.json")));
    }

    #[test]
    fn test_rejects_bad_date() {
        assert!(Cli::try_parse_from([
            "powercast",
            "watermark",
            "--base-path",
            "/tmp/pc",
            "advance",
            "2024-13-01",
        ])
        .is_err());
    }
}
