use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use featstore::FeatureStore;
use featstore::config::StorageConfig;
use featstore::listing::{ObjectLister, key_stream};
use featstore::manifest::FeatureBundle;
use futures_util::TryStreamExt;
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(
    name = "featstore-cli",
    about = "Inspect the catalog, lake and feature artifacts of a featstore deployment."
)]
struct Cli {
    /// Base path of the featstore instance (directory containing lake/catalog/artifacts).
    #[arg(short, long, default_value = ".", value_hint = clap::ValueHint::DirPath)]
    base_path: PathBuf,

    /// Minimum log level to display.
    #[arg(long, default_value_t = LogLevelArg::Info, value_enum)]
    log_level: LogLevelArg,

    /// Lake listing page size.
    #[arg(long, default_value_t = 1000)]
    page_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print job watermarks.
    Catalog {
        /// Emit JSON instead of a textual table.
        #[arg(long)]
        json: bool,
    },
    /// Print recent batch runs for a job.
    Runs {
        job: String,

        /// Maximum number of runs to display.
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Emit JSON instead of a textual table.
        #[arg(long)]
        json: bool,
    },
    /// List lake keys under a prefix.
    List {
        #[arg(long, default_value = "")]
        prefix: String,

        /// Maximum number of keys to print (0 = no limit).
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
    /// Print the saved feature bundle.
    Manifest {
        /// Emit the full bundle as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LevelFilter {
    fn from(value: LogLevelArg) -> Self {
        match value {
            LogLevelArg::Error => LevelFilter::Error,
            LogLevelArg::Warn => LevelFilter::Warn,
            LogLevelArg::Info => LevelFilter::Info,
            LogLevelArg::Debug => LevelFilter::Debug,
            LogLevelArg::Trace => LevelFilter::Trace,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default());
    logger.filter_level(LevelFilter::from(cli.log_level));
    let _ = logger.try_init();

    let base_hint = if cli.base_path == PathBuf::from(".") {
        std::env::var("POWERCAST_BASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| cli.base_path.clone())
    } else {
        cli.base_path.clone()
    };

    let base_path = if base_hint.is_absolute() {
        base_hint
    } else {
        std::env::current_dir()
            .context("failed to resolve current directory")?
            .join(&base_hint)
    };

    if !base_path.exists() {
        bail!("Base path '{}' does not exist", base_path.display());
    }

    let config = StorageConfig::new(base_path);
    let store = FeatureStore::new(config, cli.page_size)
        .await
        .context("failed to open featstore instance")?;

    match cli.command {
        Commands::Catalog { json } => handle_catalog(&store, json),
        Commands::Runs { job, limit, json } => handle_runs(&store, &job, limit, json),
        Commands::List { prefix, limit } => handle_list(&store, prefix, limit).await,
        Commands::Manifest { json } => handle_manifest(&store, json).await,
    }
}

fn handle_catalog(store: &FeatureStore, json: bool) -> Result<()> {
    let watermarks = store.catalog.list_watermarks()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&watermarks)?);
        return Ok(());
    }

    if watermarks.is_empty() {
        println!("No watermarks recorded yet.");
        return Ok(());
    }

    println!("{:<32} {:<12} {}", "JOB", "LAST DATE", "UPDATED AT");
    println!("{}", "-".repeat(72));
    for watermark in watermarks {
        println!(
            "{:<32} {:<12} {}",
            watermark.job_name,
            watermark.last_processed,
            format_timestamp(watermark.updated_at)
        );
    }
    Ok(())
}

fn handle_runs(store: &FeatureStore, job: &str, limit: usize, json: bool) -> Result<()> {
    let runs = store
        .catalog
        .list_batch_runs(job, limit)
        .with_context(|| format!("failed to read batch runs for '{job}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    println!(
        "{:<8} {:<10} {:<20} {:<20} {}",
        "RUN", "STATUS", "STARTED", "ENDED", "DETAILS"
    );
    println!("{}", "-".repeat(100));
    for run in runs {
        println!(
            "{:<8} {:<10} {:<20} {:<20} {}",
            run.run_id,
            run.status,
            format_timestamp(run.start_time),
            run.end_time.map(format_timestamp).unwrap_or_else(|| "-".to_string()),
            run.details
        );
    }
    Ok(())
}

async fn handle_list(store: &FeatureStore, prefix: String, limit: usize) -> Result<()> {
    let lister: Arc<dyn ObjectLister> = store.lake.clone();
    let mut keys = Box::pin(key_stream(lister, prefix.clone()));
    let mut printed = 0usize;
    while let Some(key) = keys
        .try_next()
        .await
        .with_context(|| format!("failed to list keys under '{prefix}'"))?
    {
        println!("{key}");
        printed += 1;
        if limit > 0 && printed >= limit {
            break;
        }
    }
    if printed == 0 {
        println!("No keys found under prefix '{}'.", prefix);
    }
    Ok(())
}

async fn handle_manifest(store: &FeatureStore, json: bool) -> Result<()> {
    let bundle = FeatureBundle::load(&store.config.artifacts_path)
        .await
        .context("failed to load feature bundle")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(());
    }

    println!("target:    {}", bundle.target);
    println!("created:   {}", format_timestamp(bundle.created_at));
    println!("encoders:  {}", bundle.encoders.len());
    println!("policy:    {:?}", bundle.unknown_category);
    println!("columns:");
    for (idx, column) in bundle.manifest.columns().iter().enumerate() {
        println!("  {:>3}  {}", idx, column);
    }
    Ok(())
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}
