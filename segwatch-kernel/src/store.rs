/**
 * SNAPSHOT STORE - Time series SQLite des agrégations par segment
 *
 * RÔLE :
 * Persiste chaque ingestion sous forme de lignes plates
 * (ts, segment, count, dim1..dim3 name/value) et sert l'historique au
 * moniteur et aux vues de séries.
 *
 * FONCTIONNEMENT :
 * - Clé primaire = toutes les colonnes sauf `count`
 * - `upsert_batch` : INSERT OR REPLACE dans UNE transaction (tout-ou-rien),
 *   ré-ingérer le même timestamp écrase au lieu de dupliquer
 * - Store absent ou sans table => historique vide (pas une erreur) ;
 *   un fichier corrompu remonte en erreur SQLite
 */

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use serde::Serialize;
use tracing::info;

use crate::clock::{format_timestamp, parse_current_time};
use crate::error::{Result, SegwatchError};
use crate::persist::ensure_parent_dir;
use crate::segments::{dimension_label, FlatColumns, FlatRecord};

pub const TABLE_NAME: &str = "segment_timeseries";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS segment_timeseries (
    ts TEXT NOT NULL,
    segment TEXT NOT NULL,
    count INTEGER NOT NULL,
    dim1_name TEXT,
    dim1_value TEXT,
    dim2_name TEXT,
    dim2_value TEXT,
    dim3_name TEXT,
    dim3_value TEXT,
    PRIMARY KEY (ts, segment, dim1_name, dim1_value, dim2_name, dim2_value, dim3_name, dim3_value)
);
";

const UPSERT_SQL: &str = "
INSERT OR REPLACE INTO segment_timeseries (
    ts, segment, count, dim1_name, dim1_value, dim2_name, dim2_value, dim3_name, dim3_value
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
";

/// Une ligne persistée, avec son libellé de série
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRow {
    pub ts: String,
    #[serde(flatten)]
    pub columns: FlatColumns,
    pub label: String,
}

impl StoredRow {
    pub fn record(&self) -> FlatRecord {
        FlatRecord::from_columns(self.columns.clone())
    }
}

pub struct SnapshotStore {
    path: PathBuf,
    conn: Connection,
}

impl SnapshotStore {
    /// Ouvre (ou crée) le store en écriture, schéma compris.
    pub fn open(path: &Path) -> Result<Self> {
        ensure_parent_dir(path)?;
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    /// Ouverture lecture seule ; `None` si le fichier n'existe pas encore.
    pub fn open_existing(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Some(Self {
            path: path.to_path_buf(),
            conn,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn has_table(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![TABLE_NAME],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Écrit un lot complet sous `ts`. Tout-ou-rien.
    pub fn upsert_batch(&mut self, ts: &str, records: &[FlatRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(UPSERT_SQL)?;
            for record in records {
                let c = record.to_columns();
                stmt.execute(params![
                    ts,
                    c.segment,
                    c.count as i64,
                    c.dim1_name,
                    c.dim1_value,
                    c.dim2_name,
                    c.dim2_value,
                    c.dim3_name,
                    c.dim3_value,
                ])?;
            }
        }
        tx.commit()?;

        info!(path = %self.path.display(), ts, rows = records.len(), "snapshot batch stored");
        Ok(records.len())
    }

    pub fn row_count(&self) -> Result<u64> {
        if !self.has_table()? {
            return Ok(0);
        }
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM segment_timeseries", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Total "en ligne" par timestamp pour un segment, ts croissants.
    pub fn online_totals(&self, segment: &str) -> Result<Vec<(String, u64)>> {
        if !self.has_table()? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT ts, SUM(count) AS total_online
             FROM segment_timeseries
             WHERE segment = ?1
             GROUP BY ts
             ORDER BY ts ASC",
        )?;
        let rows = stmt.query_map(params![segment], |row| {
            let total: i64 = row.get(1)?;
            Ok((row.get::<_, String>(0)?, total.max(0) as u64))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_segments(&self) -> Result<Vec<String>> {
        if !self.has_table()? {
            return Ok(Vec::new());
        }
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT segment FROM segment_timeseries ORDER BY segment")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Toutes les lignes des segments demandés, ts croissants.
    pub fn segment_series(&self, segments: &[String]) -> Result<Vec<StoredRow>> {
        if segments.is_empty() || !self.has_table()? {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; segments.len()].join(",");
        let sql = format!(
            "SELECT ts, segment, count, dim1_name, dim1_value, dim2_name, dim2_value, dim3_name, dim3_value
             FROM segment_timeseries
             WHERE segment IN ({placeholders})
             ORDER BY ts ASC, segment ASC, dim1_value ASC, dim2_value ASC, dim3_value ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(segments.iter()), |row| {
            let text = |idx: usize| -> rusqlite::Result<String> {
                Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
            };
            let count: i64 = row.get(2)?;
            Ok((
                row.get::<_, String>(0)?,
                FlatColumns {
                    segment: row.get(1)?,
                    count: count.max(0) as u64,
                    dim1_name: text(3)?,
                    dim1_value: text(4)?,
                    dim2_name: text(5)?,
                    dim2_value: text(6)?,
                    dim3_name: text(7)?,
                    dim3_value: text(8)?,
                },
            ))
        })?;

        let mut series = Vec::new();
        for row in rows {
            let (ts, columns) = row?;
            let record = FlatRecord::from_columns(columns.clone());
            series.push(StoredRow {
                ts,
                label: dimension_label(&record.segment, &record.dims),
                columns,
            });
        }
        Ok(series)
    }
}

/// Lit un CSV plat produit par l'ingestion.
pub fn read_flat_csv(path: &Path) -> Result<Vec<FlatRecord>> {
    if !path.exists() {
        return Err(SegwatchError::MissingData {
            what: "Segment CSV",
            path: path.to_path_buf(),
        });
    }
    let mut reader = csv::Reader::from_path(path).map_err(|e| SegwatchError::csv(path, e))?;
    reader
        .deserialize::<FlatColumns>()
        .map(|row| row.map(FlatRecord::from_columns).map_err(|e| SegwatchError::csv(path, e)))
        .collect()
}

/// Timestamp d'un lot : override explicite, sinon nom de fichier
/// `segment_stats_<YYYYMMDDHHMMSS>.csv` (ou 12 chiffres), sinon `now`.
pub fn batch_timestamp(csv_path: &Path, override_ts: Option<&str>, now: NaiveDateTime) -> Result<String> {
    if let Some(raw) = override_ts.filter(|v| !v.is_empty()) {
        return Ok(format_timestamp(parse_current_time(Some(raw), now)?));
    }

    let from_name = csv_path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_prefix("segment_stats_"))
        .and_then(|n| n.strip_suffix(".csv"))
        .filter(|digits| digits.chars().all(|c| c.is_ascii_digit()))
        .and_then(|digits| match digits.len() {
            14 => NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S").ok(),
            12 => NaiveDateTime::parse_from_str(&format!("{digits}00"), "%Y%m%d%H%M%S").ok(),
            _ => None,
        });

    Ok(format_timestamp(from_name.unwrap_or(now)))
}

/// Ingestion d'un CSV plat dans le store sous `ts`.
pub fn store_csv(csv_path: &Path, store: &mut SnapshotStore, ts: &str) -> Result<usize> {
    let records = read_flat_csv(csv_path)?;
    store.upsert_batch(ts, &records)
}
