//! Playbill Ingest - editorial feed ingestion tool

use anyhow::Result;
use clap::Parser;
use playbill_common::logging::{init_logging, LogConfig, LogLevel};
use playbill_ingest::config::Config;
use playbill_ingest::orchestrator::IngestOrchestrator;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "playbill-ingest")]
#[command(author, version, about = "Playbill editorial feed ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Ingest one feed column
    Run {
        /// Feed column id
        #[arg(long)]
        column: String,

        /// Override the configured page limit
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Ingest every configured column
    RunAll,

    /// Show per-column sync checkpoints
    Status {
        /// Restrict to one column id
        #[arg(long)]
        column: Option<String>,
    },

    /// Generate a time-limited read URL for a stored object
    Presign {
        /// Object key
        #[arg(long)]
        key: String,

        /// Expiry in seconds (default: 7 days)
        #[arg(long, default_value_t = 604_800)]
        ttl_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env()?;
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    init_logging(&log_config)?;

    let config = Config::load()?;
    let orchestrator = IngestOrchestrator::bootstrap(config).await?;

    match cli.command {
        Command::Run { column, limit } => {
            let outcome = orchestrator.run_column(&column, limit).await?;
            info!("{}", outcome.summary());
        },
        Command::RunAll => {
            let outcomes = orchestrator.run_all().await;
            if outcomes.is_empty() {
                anyhow::bail!("every configured column failed to ingest");
            }
        },
        Command::Status { column } => {
            let now = chrono::Utc::now();
            let checkpoints = match column {
                Some(id) => orchestrator
                    .checkpoints()
                    .read(&id)
                    .await?
                    .into_iter()
                    .collect(),
                None => orchestrator.checkpoints().read_all().await?,
            };

            if checkpoints.is_empty() {
                println!("No columns have been synced yet");
            }
            for checkpoint in checkpoints {
                println!(
                    "{:<4} {:<20} last fetch: {:<14} latest item: {} ({} fetched)",
                    checkpoint.column_id,
                    checkpoint.column_name,
                    checkpoint.display_last_fetch(now),
                    checkpoint.latest_item_id,
                    checkpoint.fetch_count,
                );
            }
        },
        Command::Presign { key, ttl_secs } => {
            let url = orchestrator
                .storage()
                .presigned_get(&key, Duration::from_secs(ttl_secs))
                .await?;
            println!("{}", url);
        },
    }

    info!("Done");
    Ok(())
}
