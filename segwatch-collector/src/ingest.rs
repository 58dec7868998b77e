//! One ingestion run: API call, snapshot files, store upsert, monitor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use segwatch_kernel::monitor::{
    run_post_ingestion_monitor, MonitorResult, DEFAULT_DROP_THRESHOLD, DEFAULT_HISTORY, DEFAULT_INVENTORY_PATH,
    DEFAULT_STORE_PATH,
};
use segwatch_kernel::segments::{
    SegmentStatsRequest, DEFAULT_FREQUENCY_MINUTES, DEFAULT_UPDATE_PROBABILITY, DEFAULT_WINDOW_MINUTES,
};
use segwatch_kernel::store::{batch_timestamp, store_csv, SnapshotStore};
use tracing::{info, warn};

use crate::client::{SegmentStatsClient, DEFAULT_API_URL};
use crate::outputs::persist_outputs;
use crate::sim_clock::{determine_current_time, DEFAULT_STATE_FILE};

#[derive(clap::Args, Debug, Clone)]
pub struct IngestionOptions {
    /// Segment stats endpoint
    #[arg(long, env = "SEGMENT_STATS_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Base directory for JSON/CSV outputs
    #[arg(long, default_value = "data_collection")]
    pub output_dir: PathBuf,

    /// Timestamp override sent to the API (YYYY-MM-DD HH:MM:SS)
    #[arg(long)]
    pub current_time: Option<String>,

    #[arg(long, default_value_t = DEFAULT_WINDOW_MINUTES)]
    pub window_minutes: i64,

    /// Frequency metadata passed through to the payload
    #[arg(long, default_value_t = DEFAULT_FREQUENCY_MINUTES)]
    pub frequency_minutes: i64,

    /// Heartbeat refresh probability applied by the API
    #[arg(long, default_value_t = DEFAULT_UPDATE_PROBABILITY)]
    pub update_probability: f64,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Advance a simulated clock by this many minutes per run
    #[arg(long, env = "SEGMENT_STATS_SIM_MINUTES")]
    pub simulate_minutes: Option<i64>,

    #[arg(long, env = "SEGMENT_STATS_SIM_STATE_FILE", default_value = DEFAULT_STATE_FILE)]
    pub simulation_state_file: PathBuf,

    /// Time-series store
    #[arg(long, default_value = DEFAULT_STORE_PATH)]
    pub db_path: PathBuf,

    /// Device inventory used as the monitor's denominator
    #[arg(long, default_value = DEFAULT_INVENTORY_PATH)]
    pub dataset_path: PathBuf,

    /// Only write the JSON/CSV snapshot files
    #[arg(long)]
    pub skip_store: bool,

    /// Do not evaluate the online monitor after storing
    #[arg(long)]
    pub skip_monitor: bool,
}

#[derive(Debug)]
pub struct IngestionReport {
    pub generated_at: String,
    pub json_path: PathBuf,
    pub csv_path: PathBuf,
    pub rows_stored: Option<usize>,
    pub monitor: Option<MonitorResult>,
}

pub async fn run_ingestion(opts: &IngestionOptions) -> Result<IngestionReport> {
    let current_time = determine_current_time(
        opts.current_time.as_deref(),
        opts.simulate_minutes,
        &opts.simulation_state_file,
        Utc::now().naive_utc(),
    )?;

    let request = SegmentStatsRequest {
        current_time,
        window_minutes: opts.window_minutes,
        frequency_minutes: opts.frequency_minutes,
        update_probability: opts.update_probability,
    };
    let client = SegmentStatsClient::new(&opts.api_url, Duration::from_secs(opts.timeout))?;
    let payload = client.fetch(&request).await?;

    let outputs = persist_outputs(&payload, &opts.output_dir)?;
    info!(
        generated_at = %payload.generated_at,
        csv = %outputs.csv_path.display(),
        in_window = payload.device_count_in_window,
        "ingestion finished"
    );

    let mut report = IngestionReport {
        generated_at: payload.generated_at.clone(),
        json_path: outputs.json_path,
        csv_path: outputs.csv_path,
        rows_stored: None,
        monitor: None,
    };
    if opts.skip_store {
        return Ok(report);
    }

    let csv_path = report.csv_path.clone();
    let db_path = opts.db_path.clone();
    let ts = payload.generated_at.clone();
    let rows = tokio::task::spawn_blocking(move || -> Result<usize> {
        let mut store = SnapshotStore::open(&db_path)?;
        Ok(store_csv(&csv_path, &mut store, &ts)?)
    })
    .await
    .context("store task panicked")?
    .with_context(|| format!("Failed to store snapshot into {}", opts.db_path.display()))?;
    report.rows_stored = Some(rows);

    if opts.skip_monitor {
        return Ok(report);
    }

    let db_path = opts.db_path.clone();
    let dataset_path = opts.dataset_path.clone();
    let evaluated_at = Utc::now();
    let monitor = tokio::task::spawn_blocking(move || {
        run_post_ingestion_monitor(&db_path, &dataset_path, DEFAULT_HISTORY, DEFAULT_DROP_THRESHOLD, evaluated_at)
    })
    .await
    .context("monitor task panicked")?;

    // the snapshot is already stored; a monitor failure is only reported
    match monitor {
        Ok(result) => {
            info!("{}", result.message);
            report.monitor = Some(result);
        }
        Err(e) => warn!(error = %e, "post-ingestion monitor failed"),
    }
    Ok(report)
}

/// Stand-alone CSV -> store ingestion (`store` subcommand)
pub fn store_snapshot_csv(csv_path: &Path, db_path: &Path, timestamp: Option<&str>) -> Result<(String, usize)> {
    let ts = batch_timestamp(csv_path, timestamp, Utc::now().naive_utc())?;
    let mut store = SnapshotStore::open(db_path)?;
    let rows = store_csv(csv_path, &mut store, &ts)
        .with_context(|| format!("Failed to store {}", csv_path.display()))?;
    info!(csv = %csv_path.display(), db = %db_path.display(), ts = %ts, rows, "snapshot stored");
    Ok((ts, rows))
}
