//! Évaluation ponctuelle du % de machines en ligne sur la dernière heure.
//!
//! Imprime le message composé sur stdout. L'absence d'historique n'est pas
//! un échec : code de sortie 0, rien sur stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use segwatch_kernel::monitor::{
    MonitorSettings, OnlineMonitor, DEFAULT_ALERT_LOG, DEFAULT_DROP_THRESHOLD, DEFAULT_HISTORY,
    DEFAULT_INVENTORY_PATH, DEFAULT_SEGMENT, DEFAULT_STORE_PATH,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "segwatch-monitor")]
#[command(about = "Evaluate the percentage of machines online in the last hour")]
struct Args {
    /// SQLite store with ingestion snapshots
    #[arg(long, default_value = DEFAULT_STORE_PATH)]
    db_path: PathBuf,

    /// CSV containing the device inventory
    #[arg(long, default_value = DEFAULT_INVENTORY_PATH)]
    dataset_path: PathBuf,

    /// Segment summed for total online counts
    #[arg(long, default_value = DEFAULT_SEGMENT)]
    segment: String,

    /// How many prior snapshots to average for the baseline (at least 1)
    #[arg(long, default_value_t = DEFAULT_HISTORY as i64, allow_negative_numbers = true)]
    history: i64,

    /// Alert when the drop fraction reaches this value (0.15 = 15%)
    #[arg(long, default_value_t = DEFAULT_DROP_THRESHOLD)]
    drop_threshold: f64,

    /// Log file for alerts
    #[arg(long, default_value = DEFAULT_ALERT_LOG)]
    alert_log: PathBuf,

    /// Skip writing alert entries to disk
    #[arg(long)]
    disable_alert_log: bool,
}

impl Args {
    fn settings(self) -> MonitorSettings {
        MonitorSettings {
            store_path: self.db_path,
            inventory_path: self.dataset_path,
            segment: self.segment,
            history: self.history.max(1) as usize,
            drop_threshold: self.drop_threshold,
            alert_log: self.alert_log,
            enable_alert_log: !self.disable_alert_log,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // logs sur stderr, "warn" par défaut pour garder la sortie propre
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let monitor = OnlineMonitor::new(args.settings());

    let result = monitor
        .evaluate_latest(Utc::now())
        .context("online monitor evaluation failed")?;
    println!("{}", result.message);
    Ok(())
}
