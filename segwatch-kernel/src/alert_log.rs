//! Journal d'alertes : une ligne `|` par alerte déclenchée, en append seul.
//!
//! Format : `<rfc3339> | ts=<snapshot> | online=<n> | pct=<xx.xx> | baseline=<xx.xx> | drop=<xx.xx>%`

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Result, SegwatchError};
use crate::persist::ensure_parent_dir;

#[derive(Debug, Clone, PartialEq)]
pub struct AlertLogEntry {
    pub evaluated_at: DateTime<Utc>,
    pub snapshot_ts: String,
    pub online: u64,
    pub percentage: f64,
    pub baseline: f64,
    /// Fraction (0.3789), affichée en pourcentage dans la ligne
    pub drop_fraction: f64,
}

impl fmt::Display for AlertLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | ts={} | online={} | pct={:.2} | baseline={:.2} | drop={:.2}%",
            self.evaluated_at.to_rfc3339_opts(SecondsFormat::Micros, false),
            self.snapshot_ts,
            self.online,
            self.percentage,
            self.baseline,
            self.drop_fraction * 100.0,
        )
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed alert line: {line:?}")]
pub struct MalformedAlertLine {
    pub line: String,
}

impl FromStr for AlertLogEntry {
    type Err = MalformedAlertLine;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let bad = || MalformedAlertLine { line: line.to_string() };

        let parts: Vec<&str> = line.trim_end().split(" | ").collect();
        let [evaluated_at, ts, online, pct, baseline, drop] = parts.as_slice() else {
            return Err(bad());
        };

        let field = |raw: &'_ str, key: &str| raw.strip_prefix(key).map(str::to_string);
        let number = |raw: &str, key: &str| -> Option<f64> { raw.strip_prefix(key)?.parse().ok() };

        Ok(Self {
            evaluated_at: DateTime::parse_from_rfc3339(evaluated_at)
                .map_err(|_| bad())?
                .with_timezone(&Utc),
            snapshot_ts: field(ts, "ts=").ok_or_else(bad)?,
            online: online
                .strip_prefix("online=")
                .and_then(|v| v.parse().ok())
                .ok_or_else(bad)?,
            percentage: number(pct, "pct=").ok_or_else(bad)?,
            baseline: number(baseline, "baseline=").ok_or_else(bad)?,
            drop_fraction: drop
                .strip_prefix("drop=")
                .and_then(|v| v.strip_suffix('%'))
                .and_then(|v| v.parse::<f64>().ok())
                .map(|pct| pct / 100.0)
                .ok_or_else(bad)?,
        })
    }
}

/// Ajoute une ligne au journal (dossier parent créé au besoin).
pub fn append_alert(path: &Path, entry: &AlertLogEntry) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SegwatchError::io(path, e))?;
    writeln!(file, "{entry}").map_err(|e| SegwatchError::io(path, e))
}

/// Relit le journal ; les lignes illisibles sont ignorées.
pub fn read_alerts(path: &Path) -> Result<Vec<AlertLogEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).map_err(|e| SegwatchError::io(path, e))?;
    Ok(text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| l.parse().ok())
        .collect())
}
