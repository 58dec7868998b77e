//! Snapshot files: `json/segment_stats_<stamp>.json` and the flattened
//! `csv/segment_stats_<stamp>.csv`, both written temp-then-rename.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use segwatch_kernel::persist::write_atomically;
use segwatch_kernel::segments::{flatten_segments, SegmentPayload, FLAT_FIELDNAMES};

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedOutputs {
    pub json_path: PathBuf,
    pub csv_path: PathBuf,
}

/// "2025-11-16 12:00:00" -> "20251116120000"
pub fn output_stamp(generated_at: &str) -> String {
    generated_at.chars().filter(|c| !matches!(c, ' ' | ':' | '-')).collect()
}

pub fn persist_outputs(payload: &SegmentPayload, output_dir: &Path) -> Result<PersistedOutputs> {
    let stamp = output_stamp(&payload.generated_at);
    let json_path = output_dir.join("json").join(format!("segment_stats_{stamp}.json"));
    let csv_path = output_dir.join("csv").join(format!("segment_stats_{stamp}.csv"));

    write_atomically(&json_path, |out| {
        serde_json::to_writer_pretty(&mut *out, payload).map_err(io::Error::from)
    })
    .with_context(|| format!("Failed to write {}", json_path.display()))?;

    let records = flatten_segments(payload);
    write_atomically(&csv_path, |out| {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);
        writer.write_record(FLAT_FIELDNAMES)?;
        for record in &records {
            writer.serialize(record.to_columns())?;
        }
        writer.flush()
    })
    .with_context(|| format!("Failed to write {}", csv_path.display()))?;

    Ok(PersistedOutputs { json_path, csv_path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use segwatch_kernel::segments::{AggregationRow, SegmentRows};
    use segwatch_kernel::store::read_flat_csv;
    use std::collections::BTreeMap;

    fn payload() -> SegmentPayload {
        SegmentPayload {
            generated_at: "2025-11-16 12:00:00".to_string(),
            window_minutes: 60,
            frequency_minutes: 15,
            device_count_in_window: 3,
            segments: vec![SegmentRows {
                name: "Type".to_string(),
                dimensions: vec!["machine_type".to_string()],
                rows: vec![
                    AggregationRow {
                        dimensions: BTreeMap::from([("machine_type".to_string(), "ATM".to_string())]),
                        count: 2,
                    },
                    AggregationRow {
                        dimensions: BTreeMap::from([("machine_type".to_string(), "PC".to_string())]),
                        count: 1,
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_output_stamp() {
        assert_eq!(output_stamp("2025-11-16 12:00:00"), "20251116120000");
    }

    #[test]
    fn test_persist_outputs_layout() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = persist_outputs(&payload(), dir.path()).unwrap();

        assert_eq!(outputs.json_path, dir.path().join("json/segment_stats_20251116120000.json"));
        assert_eq!(outputs.csv_path, dir.path().join("csv/segment_stats_20251116120000.csv"));

        let json: SegmentPayload =
            serde_json::from_str(&std::fs::read_to_string(&outputs.json_path).unwrap()).unwrap();
        assert_eq!(json, payload());

        let csv_text = std::fs::read_to_string(&outputs.csv_path).unwrap();
        let mut lines = csv_text.lines();
        assert_eq!(
            lines.next(),
            Some("segment,count,dim1_name,dim1_value,dim2_name,dim2_value,dim3_name,dim3_value")
        );
        assert_eq!(lines.next(), Some("Type,2,machine_type,ATM,,,,"));

        let records = read_flat_csv(&outputs.csv_path).unwrap();
        assert_eq!(records.iter().map(|r| r.count).sum::<u64>(), 3);
    }
}
