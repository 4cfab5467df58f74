// ABOUTME: Command-line entry point for running and inspecting integration sync jobs
// ABOUTME: Wires configuration, logging and storage into the sync runner

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crm_sync_engine::remote::RemoteDatasetClient;
use crm_sync_engine::store::{self, SyncStore};
use crm_sync_engine::{
    Config, DatasetSource, FileDatasetSource, JobLedger, JobStatus, SyncError, SyncJobView,
    SyncRunner,
};

#[derive(Parser)]
#[command(
    name = "crm-sync",
    version,
    about = "Reconcile integration datasets into the CRM sync mirror"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = "crm-sync.toml")]
    config: PathBuf,

    /// SQLite database path (overrides storage.database; ":memory:" for a throwaway store)
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sync job from a JSON dataset file
    Run {
        #[arg(long)]
        integration: String,
        #[arg(long)]
        datasets: PathBuf,
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Run a sync job against a remote dataset endpoint
    Pull {
        #[arg(long)]
        integration: String,
        /// Base URL of the adapter service (overrides remote.base_url)
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Show one sync job
    Job { job_id: String },
    /// List sync jobs for an integration
    Jobs {
        #[arg(long)]
        integration: String,
    },
    /// List mirrored records for an integration and record type
    Records {
        #[arg(long)]
        integration: String,
        #[arg(long)]
        record_type: String,
    },
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_job(
    store: Arc<dyn SyncStore>,
    config: &Config,
    integration: &str,
    max_attempts: Option<u32>,
    source: &dyn DatasetSource,
) -> Result<()> {
    let runner = SyncRunner::new(store, config.sync.clone());
    let view: SyncJobView = runner.run(integration, max_attempts, source).await?;
    print_json(&view)?;
    if view.status == JobStatus::Failed {
        anyhow::bail!(
            "Sync job {} failed after {} attempt(s): {}",
            view.job_id,
            view.attempt,
            view.last_error.unwrap_or_default()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(database) = cli.database {
        config.storage.database = database;
    }
    config.validate()?;
    init_tracing(&config);

    let store = store::open(&config.storage.database)?;

    match cli.command {
        Commands::Run {
            integration,
            datasets,
            max_attempts,
        } => {
            let source = FileDatasetSource::new(datasets);
            run_job(store, &config, &integration, max_attempts, &source).await
        }
        Commands::Pull {
            integration,
            url,
            max_attempts,
        } => {
            let base_url = url
                .or_else(|| config.remote.base_url.clone())
                .ok_or_else(|| {
                    SyncError::Config("no --url given and remote.base_url is not set".to_string())
                })?;
            let client = RemoteDatasetClient::new(
                base_url,
                Duration::from_secs(config.remote.timeout_secs),
            )?;
            run_job(store, &config, &integration, max_attempts, &client).await
        }
        Commands::Job { job_id } => {
            let view = JobLedger::new(store)
                .get_job_view(&job_id)
                .with_context(|| format!("Failed to load sync job {}", job_id))?;
            print_json(&view)
        }
        Commands::Jobs { integration } => {
            print_json(&JobLedger::new(store).list_job_views(&integration)?)
        }
        Commands::Records {
            integration,
            record_type,
        } => print_json(&store.list_records(&integration, &record_type)?),
    }
}
