//! Format horaire commun et helpers de temps.
//!
//! Le cœur ne lit jamais l'horloge murale : `now` est toujours injecté par
//! l'appelant (handler HTTP, CLI, collector).

use chrono::{Duration, NaiveDateTime};
use rand::Rng;

use crate::error::{Result, SegwatchError};

/// Format des timestamps (lexicographique == chronologique)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ISO_T_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse un timestamp au format fixe. Vide ou illisible => None.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    if value.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).ok()
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Résout l'instant de référence d'une requête : override explicite ou `now`.
pub fn parse_current_time(value: Option<&str>, now: NaiveDateTime) -> Result<NaiveDateTime> {
    let Some(raw) = value.filter(|v| !v.is_empty()) else {
        return Ok(now);
    };

    [TIMESTAMP_FORMAT, ISO_T_FORMAT]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| SegwatchError::InvalidTimestamp {
            field: "current_time",
            value: raw.to_string(),
        })
}

/// Instant uniforme dans [start, end] à la seconde près (bornes inversées tolérées)
pub fn random_timestamp_between<R: Rng + ?Sized>(
    start: NaiveDateTime,
    end: NaiveDateTime,
    rng: &mut R,
) -> NaiveDateTime {
    let (start, end) = if start > end { (end, start) } else { (start, end) };
    let total_seconds = (end - start).num_seconds();
    if total_seconds <= 0 {
        return start;
    }
    start + Duration::seconds(rng.gen_range(0..=total_seconds))
}
