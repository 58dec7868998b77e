/**
 * SEGMENTS - Moteur d'agrégation multi-dimensions du parc
 *
 * RÔLE :
 * Transforme l'inventaire plat en comptages par segment (State, Type,
 * Model...) pour les machines actives dans une fenêtre glissante.
 *
 * FONCTIONNEMENT :
 * - Catalogue figé de 8 segments, chacun = 1 à 3 dimensions typées
 * - `filter_recent` : now - window <= last_connection_ts <= now
 * - `aggregate_segment` : comptage par tuple de valeurs, lignes triées
 *   par ordre lexicographique du tuple (sortie déterministe)
 * - `flatten_segments` : une ligne plate par groupe, 3 slots de dimension
 *   fixes (les slots inutilisés sont des chaînes vides en CSV/SQL)
 *
 * INVARIANT : pour chaque segment, la somme des `count` == nombre de
 * machines dans la fenêtre.
 */

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::clock::{format_timestamp, parse_current_time};
use crate::error::{Result, SegwatchError};
use crate::inventory::DeviceRecord;

pub const MAX_DIMENSIONS: usize = 3;

pub const DEFAULT_WINDOW_MINUTES: i64 = 60;
pub const DEFAULT_FREQUENCY_MINUTES: i64 = 15;
pub const DEFAULT_UPDATE_PROBABILITY: f64 = 0.10;
const MINUTES_RANGE: (i64, i64) = (1, 1440);

/// Attribut d'inventaire utilisable comme dimension de segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    State,
    MachineType,
    MachineModel,
    Supplier,
    OperatingSystem,
    OsVersion,
}

impl Dimension {
    /// Nom de colonne dans l'inventaire (et dans le payload)
    pub const fn as_str(self) -> &'static str {
        match self {
            Dimension::State => "state",
            Dimension::MachineType => "machine_type",
            Dimension::MachineModel => "machine_model",
            Dimension::Supplier => "supplier",
            Dimension::OperatingSystem => "operating_system",
            Dimension::OsVersion => "os_version",
        }
    }

    pub fn value_of(self, device: &DeviceRecord) -> &str {
        match self {
            Dimension::State => &device.state,
            Dimension::MachineType => &device.machine_type,
            Dimension::MachineModel => &device.machine_model,
            Dimension::Supplier => &device.supplier,
            Dimension::OperatingSystem => &device.operating_system,
            Dimension::OsVersion => &device.os_version,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SegmentDefinition {
    pub name: &'static str,
    pub dimensions: &'static [Dimension],
}

pub const SEGMENTS: [SegmentDefinition; 8] = [
    SegmentDefinition { name: "State", dimensions: &[Dimension::State] },
    SegmentDefinition { name: "Type", dimensions: &[Dimension::MachineType] },
    SegmentDefinition { name: "Model", dimensions: &[Dimension::MachineModel] },
    SegmentDefinition { name: "Supplier", dimensions: &[Dimension::Supplier] },
    SegmentDefinition {
        name: "Model and Supplier",
        dimensions: &[Dimension::MachineModel, Dimension::Supplier],
    },
    SegmentDefinition { name: "OS", dimensions: &[Dimension::OperatingSystem] },
    SegmentDefinition { name: "OS_Version", dimensions: &[Dimension::OsVersion] },
    SegmentDefinition {
        name: "Type and OS and OS_version",
        dimensions: &[Dimension::MachineType, Dimension::OperatingSystem, Dimension::OsVersion],
    },
];

pub fn find_segment(name: &str) -> Option<&'static SegmentDefinition> {
    SEGMENTS.iter().find(|s| s.name == name)
}

// ===== Requête / payload =====

fn default_window() -> i64 {
    DEFAULT_WINDOW_MINUTES
}
fn default_frequency() -> i64 {
    DEFAULT_FREQUENCY_MINUTES
}
fn default_probability() -> f64 {
    DEFAULT_UPDATE_PROBABILITY
}

/// Corps de `POST /segment-stats`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentStatsRequest {
    #[serde(default)]
    pub current_time: Option<String>,
    #[serde(default = "default_window")]
    pub window_minutes: i64,
    /// Métadonnée pour l'ordonnancement aval, sans effet sur le calcul
    #[serde(default = "default_frequency")]
    pub frequency_minutes: i64,
    #[serde(default = "default_probability")]
    pub update_probability: f64,
}

impl Default for SegmentStatsRequest {
    fn default() -> Self {
        Self {
            current_time: None,
            window_minutes: DEFAULT_WINDOW_MINUTES,
            frequency_minutes: DEFAULT_FREQUENCY_MINUTES,
            update_probability: DEFAULT_UPDATE_PROBABILITY,
        }
    }
}

impl SegmentStatsRequest {
    pub fn validate(&self) -> Result<()> {
        check_minutes("window_minutes", self.window_minutes)?;
        check_minutes("frequency_minutes", self.frequency_minutes)?;
        if !(0.0..=1.0).contains(&self.update_probability) {
            return Err(SegwatchError::OutOfRange {
                field: "update_probability",
                value: self.update_probability.to_string(),
                min: "0".into(),
                max: "1".into(),
            });
        }
        Ok(())
    }

    /// Valide la requête puis résout l'instant de référence.
    pub fn resolve_now(&self, now: NaiveDateTime) -> Result<NaiveDateTime> {
        self.validate()?;
        parse_current_time(self.current_time.as_deref(), now)
    }
}

fn check_minutes(field: &'static str, value: i64) -> Result<()> {
    let (min, max) = MINUTES_RANGE;
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(SegwatchError::OutOfRange {
            field,
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationRow {
    pub dimensions: BTreeMap<String, String>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRows {
    pub name: String,
    pub dimensions: Vec<String>,
    pub rows: Vec<AggregationRow>,
}

/// Réponse de `POST /segment-stats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPayload {
    pub generated_at: String,
    pub window_minutes: i64,
    pub frequency_minutes: i64,
    pub device_count_in_window: usize,
    pub segments: Vec<SegmentRows>,
}

// ===== Agrégation =====

/// Machines dont le dernier contact tombe dans [now - window, now].
/// Timestamp vide ou illisible => exclue, sans erreur.
pub fn filter_recent(
    devices: &[DeviceRecord],
    now: NaiveDateTime,
    window_minutes: i64,
) -> Vec<&DeviceRecord> {
    let cutoff = now - Duration::minutes(window_minutes);
    devices
        .iter()
        .filter(|d| matches!(d.last_connection(), Some(ts) if cutoff <= ts && ts <= now))
        .collect()
}

pub fn aggregate_segment<'a, I>(devices: I, dimensions: &[Dimension]) -> Vec<AggregationRow>
where
    I: IntoIterator<Item = &'a DeviceRecord>,
{
    let mut counter: BTreeMap<Vec<&'a str>, u64> = BTreeMap::new();
    for device in devices {
        let key = dimensions.iter().map(|d| d.value_of(device)).collect();
        *counter.entry(key).or_insert(0) += 1;
    }

    // BTreeMap => tuples déjà triés
    counter
        .into_iter()
        .map(|(key, count)| AggregationRow {
            dimensions: dimensions
                .iter()
                .zip(key)
                .map(|(d, v)| (d.as_str().to_string(), v.to_string()))
                .collect(),
            count,
        })
        .collect()
}

/// Construit le payload complet à partir des machines déjà filtrées.
pub fn build_payload(
    recent: &[&DeviceRecord],
    now: NaiveDateTime,
    window_minutes: i64,
    frequency_minutes: i64,
) -> SegmentPayload {
    let segments = SEGMENTS
        .iter()
        .map(|segment| SegmentRows {
            name: segment.name.to_string(),
            dimensions: segment.dimensions.iter().map(|d| d.as_str().to_string()).collect(),
            rows: aggregate_segment(recent.iter().copied(), segment.dimensions),
        })
        .collect();

    SegmentPayload {
        generated_at: format_timestamp(now),
        window_minutes,
        frequency_minutes,
        device_count_in_window: recent.len(),
        segments,
    }
}

// ===== Aplatissement =====

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DimensionPair {
    pub name: String,
    pub value: String,
}

/// Clé de groupe à arité variable, en largeur fixe
pub type DimensionSlots = [Option<DimensionPair>; MAX_DIMENSIONS];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatRecord {
    pub segment: String,
    pub count: u64,
    pub dims: DimensionSlots,
}

/// Projection colonne par colonne (CSV d'ingestion, table SQLite)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatColumns {
    pub segment: String,
    pub count: u64,
    #[serde(default)]
    pub dim1_name: String,
    #[serde(default)]
    pub dim1_value: String,
    #[serde(default)]
    pub dim2_name: String,
    #[serde(default)]
    pub dim2_value: String,
    #[serde(default)]
    pub dim3_name: String,
    #[serde(default)]
    pub dim3_value: String,
}

pub const FLAT_FIELDNAMES: [&str; 8] = [
    "segment",
    "count",
    "dim1_name",
    "dim1_value",
    "dim2_name",
    "dim2_value",
    "dim3_name",
    "dim3_value",
];

fn slot_columns(slot: &Option<DimensionPair>) -> (String, String) {
    match slot {
        Some(pair) => (pair.name.clone(), pair.value.clone()),
        None => (String::new(), String::new()),
    }
}

/// Un nom de dimension vide == slot inutilisé
pub fn slot_from_columns(name: String, value: String) -> Option<DimensionPair> {
    if name.is_empty() {
        None
    } else {
        Some(DimensionPair { name, value })
    }
}

impl FlatRecord {
    pub fn to_columns(&self) -> FlatColumns {
        let [d1, d2, d3] = &self.dims;
        let (dim1_name, dim1_value) = slot_columns(d1);
        let (dim2_name, dim2_value) = slot_columns(d2);
        let (dim3_name, dim3_value) = slot_columns(d3);
        FlatColumns {
            segment: self.segment.clone(),
            count: self.count,
            dim1_name,
            dim1_value,
            dim2_name,
            dim2_value,
            dim3_name,
            dim3_value,
        }
    }

    pub fn from_columns(columns: FlatColumns) -> Self {
        Self {
            segment: columns.segment,
            count: columns.count,
            dims: [
                slot_from_columns(columns.dim1_name, columns.dim1_value),
                slot_from_columns(columns.dim2_name, columns.dim2_value),
                slot_from_columns(columns.dim3_name, columns.dim3_value),
            ],
        }
    }
}

pub fn flatten_segments(payload: &SegmentPayload) -> Vec<FlatRecord> {
    let mut records = Vec::new();
    for segment in &payload.segments {
        for row in &segment.rows {
            let dims = std::array::from_fn(|idx| {
                segment.dimensions.get(idx).map(|name| DimensionPair {
                    name: name.clone(),
                    value: row.dimensions.get(name).cloned().unwrap_or_default(),
                })
            });
            records.push(FlatRecord {
                segment: segment.name.clone(),
                count: row.count,
                dims,
            });
        }
    }
    records
}

/// Ré-agrège des lignes plates par (segment, dimensions).
pub fn rollup_flat_records<'a, I>(records: I) -> BTreeMap<(String, DimensionSlots), u64>
where
    I: IntoIterator<Item = &'a FlatRecord>,
{
    let mut totals = BTreeMap::new();
    for record in records {
        *totals
            .entry((record.segment.clone(), record.dims.clone()))
            .or_insert(0) += record.count;
    }
    totals
}

/// Libellé lisible d'une série : "machine_type=ATM | operating_system=Ubuntu"
pub fn dimension_label(segment: &str, dims: &DimensionSlots) -> String {
    let parts: Vec<String> = dims
        .iter()
        .flatten()
        .filter(|pair| !pair.name.trim().is_empty())
        .map(|pair| {
            let value = if pair.value.trim().is_empty() { "(blank)" } else { pair.value.as_str() };
            format!("{}={}", pair.name, value)
        })
        .collect();

    if parts.is_empty() {
        segment.to_string()
    } else {
        parts.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::parse_timestamp;
    use crate::inventory::tests::device;

    fn now() -> NaiveDateTime {
        parse_timestamp("2025-11-16 12:00:00").unwrap()
    }

    fn sample_fleet() -> Vec<DeviceRecord> {
        let mut fleet = vec![
            device("AT000001", "ATM", false, "2025-11-16 11:59:00"),
            device("AT000002", "ATM", false, "2025-11-16 11:00:00"), // borne basse incluse
            device("PC000003", "PC", false, "2025-11-16 12:00:00"),  // borne haute incluse
            device("PD000004", "PD", true, "2025-11-16 11:30:00"),
            device("CC000005", "CC", false, "2025-11-16 10:59:59"), // trop vieux
            device("CC000006", "CC", false, "2025-11-16 12:00:01"), // futur
            device("CC000007", "CC", false, ""),
            device("CC000008", "CC", false, "not a date"),
        ];
        fleet[3].operating_system = "Windows".into();
        fleet[2].state = "RJ".into();
        fleet[2].supplier = "Bell".into();
        fleet
    }

    #[test]
    fn test_filter_recent_window_bounds() {
        let fleet = sample_fleet();
        let recent = filter_recent(&fleet, now(), 60);
        let codes: Vec<&str> = recent.iter().map(|d| d.device_code.as_str()).collect();
        assert_eq!(codes, vec!["AT000001", "AT000002", "PC000003", "PD000004"]);
    }

    #[test]
    fn test_every_segment_partitions_the_window() {
        let fleet = sample_fleet();
        for window in [1, 30, 60, 1440] {
            let recent = filter_recent(&fleet, now(), window);
            let payload = build_payload(&recent, now(), window, 15);

            assert_eq!(payload.segments.len(), SEGMENTS.len());
            assert_eq!(payload.device_count_in_window, recent.len());
            for segment in &payload.segments {
                let total: u64 = segment.rows.iter().map(|r| r.count).sum();
                assert_eq!(total as usize, recent.len(), "segment {}", segment.name);
                for row in &segment.rows {
                    assert_eq!(row.dimensions.len(), segment.dimensions.len());
                }
            }
        }
    }

    #[test]
    fn test_rows_sorted_and_deterministic() {
        let fleet = sample_fleet();
        let all: Vec<&DeviceRecord> = fleet.iter().collect();
        let rows = aggregate_segment(all.iter().copied(), &[Dimension::MachineType]);

        let types: Vec<&str> = rows.iter().map(|r| r.dimensions["machine_type"].as_str()).collect();
        assert_eq!(types, vec!["ATM", "CC", "PC", "PD"]);
        assert_eq!(rows[1].count, 4);

        let mut reversed = all.clone();
        reversed.reverse();
        let first = serde_json::to_string(&build_payload(&all, now(), 60, 15)).unwrap();
        let second = serde_json::to_string(&build_payload(&reversed, now(), 60, 15)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_flatten_pads_unused_slots() {
        let fleet = sample_fleet();
        let recent = filter_recent(&fleet, now(), 60);
        let payload = build_payload(&recent, now(), 60, 15);
        let flat = flatten_segments(&payload);

        let state_row = flat.iter().find(|r| r.segment == "State").unwrap();
        assert_eq!(state_row.dims[0].as_ref().unwrap().name, "state");
        assert!(state_row.dims[1].is_none() && state_row.dims[2].is_none());

        let columns = state_row.to_columns();
        assert_eq!(columns.dim2_name, "");
        assert_eq!(columns.dim3_value, "");

        let triple = flat.iter().find(|r| r.segment == "Type and OS and OS_version").unwrap();
        assert!(triple.dims.iter().all(Option::is_some));
        assert_eq!(FlatRecord::from_columns(triple.to_columns()), *triple);
    }

    #[test]
    fn test_flattened_csv_rolls_back_up_to_same_counts() {
        let fleet = sample_fleet();
        let recent = filter_recent(&fleet, now(), 90);
        let payload = build_payload(&recent, now(), 90, 15);
        let flat = flatten_segments(&payload);

        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in &flat {
            writer.serialize(record.to_columns()).unwrap();
        }
        let bytes = writer.into_inner().unwrap();

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let reread: Vec<FlatRecord> = reader
            .deserialize::<FlatColumns>()
            .map(|c| FlatRecord::from_columns(c.unwrap()))
            .collect();

        assert_eq!(rollup_flat_records(&reread), rollup_flat_records(&flat));
        for segment in &payload.segments {
            let total: u64 = reread.iter().filter(|r| r.segment == segment.name).map(|r| r.count).sum();
            assert_eq!(total as usize, payload.device_count_in_window);
        }
    }

    #[test]
    fn test_request_validation() {
        let request: SegmentStatsRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request, SegmentStatsRequest::default());
        assert_eq!(request.resolve_now(now()).unwrap(), now());

        let bad = SegmentStatsRequest { window_minutes: 0, ..Default::default() };
        assert!(bad.validate().unwrap_err().to_string().contains("window_minutes"));

        let bad = SegmentStatsRequest { frequency_minutes: 1441, ..Default::default() };
        assert!(bad.validate().is_err());

        let bad = SegmentStatsRequest { update_probability: 1.5, ..Default::default() };
        assert!(bad.validate().unwrap_err().is_validation());

        let bad = SegmentStatsRequest {
            current_time: Some("2025/11/16".into()),
            ..Default::default()
        };
        assert!(bad.resolve_now(now()).unwrap_err().is_validation());
    }

    #[test]
    fn test_dimension_label() {
        let dims: DimensionSlots = [
            Some(DimensionPair { name: "machine_model".into(), value: "GH".into() }),
            Some(DimensionPair { name: "supplier".into(), value: "".into() }),
            None,
        ];
        assert_eq!(dimension_label("Model and Supplier", &dims), "machine_model=GH | supplier=(blank)");
        assert_eq!(dimension_label("Type", &[None, None, None]), "Type");
    }
}
