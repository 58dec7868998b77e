//! Segwatch collector
//!
//! Calls the segment stats API, keeps JSON and flattened CSV snapshots,
//! upserts them into the time-series store and runs the online monitor.
//! `schedule` replaces an external orchestrator with a fixed cadence.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use segwatch_kernel::monitor::DEFAULT_STORE_PATH;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod client;
mod ingest;
mod outputs;
mod schedule;
mod sim_clock;


use ingest::{run_ingestion, store_snapshot_csv, IngestionOptions};

#[derive(Parser, Debug)]
#[command(name = "segwatch-collector")]
#[command(about = "Collect segment statistics snapshots and feed the online monitor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one ingestion
    Collect(IngestionOptions),

    /// Load an existing flattened CSV into the store
    Store {
        #[arg(long)]
        csv_path: PathBuf,

        #[arg(long, default_value = DEFAULT_STORE_PATH)]
        db_path: PathBuf,

        /// Batch timestamp; defaults to the one in the file name, then now
        #[arg(long)]
        timestamp: Option<String>,
    },

    /// Run ingestions on a fixed cadence until Ctrl-C
    Schedule {
        #[arg(long, default_value_t = 60)]
        every_seconds: u64,

        #[command(flatten)]
        ingestion: IngestionOptions,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // load .env first so the clap env fallbacks see it
    dotenvy::dotenv().ok();
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Collect(opts) => {
            let report = run_ingestion(&opts).await.context("Ingestion failed")?;
            println!("Ingestion finished for timestamp {}", report.generated_at);
            if let Some(result) = report.monitor {
                println!("{}", result.message);
            }
        }
        Command::Store { csv_path, db_path, timestamp } => {
            let (ts, rows) = store_snapshot_csv(&csv_path, &db_path, timestamp.as_deref())?;
            println!("Stored {rows} rows from {} at {ts}", csv_path.display());
        }
        Command::Schedule { every_seconds, ingestion } => {
            let every = Duration::from_secs(every_seconds.max(1));
            let summary = schedule::run_schedule(&ingestion, every, None, async {
                tokio::signal::ctrl_c().await.ok();
            })
            .await;
            info!(?summary, "collector stopped");
        }
    }
    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
