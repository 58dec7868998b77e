//! In-process cadence: one ingestion per tick, never two at once, no
//! catch-up of missed ticks. Stops on the shutdown future (Ctrl-C in main).

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::ingest::{run_ingestion, IngestionOptions};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSummary {
    pub succeeded: u64,
    pub failed: u64,
}

/// Runs until `shutdown` resolves or `max_runs` runs have completed.
pub async fn run_schedule<F>(
    opts: &IngestionOptions,
    every: Duration,
    max_runs: Option<u64>,
    shutdown: F,
) -> ScheduleSummary
where
    F: Future<Output = ()>,
{
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut summary = ScheduleSummary::default();
    info!(every_seconds = every.as_secs_f64(), api = %opts.api_url, "ingestion schedule started");

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("shutdown requested, stopping schedule");
                break;
            }
            _ = ticker.tick() => {
                // awaited inline: the next tick cannot start a concurrent run
                match run_ingestion(opts).await {
                    Ok(report) => {
                        summary.succeeded += 1;
                        info!(generated_at = %report.generated_at, rows = ?report.rows_stored, "scheduled run done");
                    }
                    Err(e) => {
                        summary.failed += 1;
                        error!(error = %format!("{e:#}"), "scheduled run failed");
                    }
                }
                if max_runs.is_some_and(|max| summary.succeeded + summary.failed >= max) {
                    break;
                }
            }
        }
    }

    info!(succeeded = summary.succeeded, failed = summary.failed, "ingestion schedule stopped");
    summary
}
