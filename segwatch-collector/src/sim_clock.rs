//! Accelerated simulation clock: each run advances a persisted instant by a
//! fixed number of minutes, so a fast cadence covers hours of fleet time.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime};
use segwatch_kernel::clock::{format_timestamp, parse_timestamp};
use segwatch_kernel::persist::write_atomically;

pub const DEFAULT_STATE_FILE: &str = "data_collection/simulation_clock.txt";

/// Missing, empty or unreadable state => None
pub fn load_simulated_time(path: &Path) -> Option<NaiveDateTime> {
    let text = std::fs::read_to_string(path).ok()?;
    parse_timestamp(text.trim())
}

pub fn save_simulated_time(path: &Path, value: NaiveDateTime) -> Result<()> {
    write_atomically(path, |out| out.write_all(format_timestamp(value).as_bytes()))
        .with_context(|| format!("Failed to save simulated clock to {}", path.display()))
}

/// Instant sent as `current_time`: explicit override first, then the
/// simulated clock if enabled, otherwise None (server clock).
pub fn determine_current_time(
    explicit: Option<&str>,
    simulate_minutes: Option<i64>,
    state_file: &Path,
    wall_now: NaiveDateTime,
) -> Result<Option<String>> {
    if let Some(explicit) = explicit.filter(|v| !v.is_empty()) {
        return Ok(Some(explicit.to_string()));
    }
    let Some(minutes) = simulate_minutes else {
        return Ok(None);
    };

    let last = load_simulated_time(state_file).unwrap_or(wall_now);
    let next = last + Duration::minutes(minutes);
    save_simulated_time(state_file, next)?;
    Ok(Some(format_timestamp(next)))
}
