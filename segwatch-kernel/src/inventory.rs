/**
 * INVENTAIRE - Parc de machines simulé (fichier CSV 13 colonnes)
 *
 * RÔLE :
 * Lecture/écriture de l'inventaire produit par le générateur, et simulation
 * des "check-in" des machines (heartbeat) avant chaque agrégation.
 *
 * FONCTIONNEMENT :
 * - `load_devices` lit le CSV (has_error absent ou vide => false)
 * - `refresh_heartbeats` réécrit `last_connection_ts` des machines saines
 *   avec une probabilité donnée, dans les 15 dernières minutes
 * - `FleetInventory::check_in` enchaîne lecture → heartbeat → écriture
 *   atomique sous un verrou exclusif (un seul écrivain à la fois)
 *
 * INVARIANT : une machine en erreur n'est jamais rafraîchie, quelle que soit
 * la probabilité (même 1.0).
 */

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};

use crate::clock::{format_timestamp, parse_timestamp, random_timestamp_between};
use crate::error::{Result, SegwatchError};
use crate::persist::write_atomically;

/// Fenêtre dans laquelle tombe un heartbeat simulé
pub const UPDATE_WINDOW_MINUTES: i64 = 15;

pub const DEVICE_FIELDNAMES: [&str; 13] = [
    "device_code",
    "acquisition_sequence",
    "branch_id",
    "state",
    "has_error",
    "machine_type",
    "machine_model",
    "supplier",
    "network_address",
    "operating_system",
    "os_version",
    "acquisition_date",
    "last_connection_ts",
];

/// Une ligne d'inventaire. L'ordre des champs est celui des colonnes CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_code: String,
    pub acquisition_sequence: String,
    pub branch_id: String,
    pub state: String,
    #[serde(
        default,
        deserialize_with = "deserialize_flag",
        serialize_with = "serialize_flag"
    )]
    pub has_error: bool,
    pub machine_type: String,
    pub machine_model: String,
    pub supplier: String,
    pub network_address: String,
    pub operating_system: String,
    pub os_version: String,
    pub acquisition_date: String,
    /// Texte brut : une valeur illisible est conservée telle quelle
    #[serde(default)]
    pub last_connection_ts: String,
}

impl DeviceRecord {
    pub fn last_connection(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.last_connection_ts)
    }
}

pub fn to_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "y"
    )
}

fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(to_bool).unwrap_or(false))
}

fn serialize_flag<S: Serializer>(flag: &bool, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(if *flag { "True" } else { "False" })
}

/// Charge tout l'inventaire. Fichier absent => erreur explicite avec le chemin.
pub fn load_devices(path: &Path) -> Result<Vec<DeviceRecord>> {
    if !path.exists() {
        return Err(SegwatchError::MissingData {
            what: "Dataset",
            path: path.to_path_buf(),
        });
    }

    let mut reader = csv::Reader::from_path(path).map_err(|e| SegwatchError::csv(path, e))?;
    let devices = reader
        .deserialize()
        .collect::<std::result::Result<Vec<DeviceRecord>, _>>()
        .map_err(|e| SegwatchError::csv(path, e))?;

    debug!(path = %path.display(), devices = devices.len(), "inventory loaded");
    Ok(devices)
}

/// Réécrit l'inventaire complet (en-tête toujours présent), en tout-ou-rien.
pub fn write_devices(path: &Path, devices: &[DeviceRecord]) -> Result<()> {
    write_atomically(path, |out| {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);
        writer.write_record(DEVICE_FIELDNAMES)?;
        for device in devices {
            writer.serialize(device)?;
        }
        writer.flush()
    })
}

/// Nombre de machines de l'inventaire (dénominateur du % en ligne).
pub fn count_devices(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Err(SegwatchError::MissingData {
            what: "Dataset",
            path: path.to_path_buf(),
        });
    }

    let mut reader = csv::Reader::from_path(path).map_err(|e| SegwatchError::csv(path, e))?;
    let mut total = 0usize;
    for record in reader.records() {
        record.map_err(|e| SegwatchError::csv(path, e))?;
        total += 1;
    }

    if total == 0 {
        return Err(SegwatchError::EmptyInventory {
            path: path.to_path_buf(),
        });
    }
    Ok(total)
}

/// Simule les check-in : chaque machine saine a `probability` chances de
/// recevoir un `last_connection_ts` aléatoire dans [now - 15min, now].
/// Retourne le nombre de machines rafraîchies.
pub fn refresh_heartbeats<R: Rng + ?Sized>(
    devices: &mut [DeviceRecord],
    now: NaiveDateTime,
    probability: f64,
    rng: &mut R,
) -> usize {
    let probability = if probability.is_nan() { 0.0 } else { probability.clamp(0.0, 1.0) };
    let window_start = now - Duration::minutes(UPDATE_WINDOW_MINUTES);

    let mut updated = 0;
    for device in devices.iter_mut().filter(|d| !d.has_error) {
        if rng.gen_bool(probability) {
            let ts = random_timestamp_between(window_start, now, rng);
            device.last_connection_ts = format_timestamp(ts);
            updated += 1;
        }
    }
    updated
}

/// Inventaire partagé : sérialise les cycles lecture-modification-écriture.
#[derive(Debug)]
pub struct FleetInventory {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FleetInventory {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Heartbeat + persistance, puis retourne l'état à jour du parc.
    /// Rien n'est écrit si la lecture échoue.
    pub fn check_in<R: Rng + ?Sized>(
        &self,
        now: NaiveDateTime,
        probability: f64,
        rng: &mut R,
    ) -> Result<Vec<DeviceRecord>> {
        let _guard = self.lock.lock();

        let mut devices = load_devices(&self.path)?;
        let updated = refresh_heartbeats(&mut devices, now, probability, rng);
        write_devices(&self.path, &devices)?;

        info!(
            path = %self.path.display(),
            devices = devices.len(),
            refreshed = updated,
            "inventory heartbeat applied"
        );
        Ok(devices)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    pub(crate) fn device(code: &str, machine_type: &str, has_error: bool, last_ts: &str) -> DeviceRecord {
        DeviceRecord {
            device_code: code.to_string(),
            acquisition_sequence: "1234520230101".to_string(),
            branch_id: "12345".to_string(),
            state: "SP".to_string(),
            has_error,
            machine_type: machine_type.to_string(),
            machine_model: format!("{machine_type}-m1"),
            supplier: "Best Supplier".to_string(),
            network_address: "10.0.0.1".to_string(),
            operating_system: "Ubuntu".to_string(),
            os_version: "20.1".to_string(),
            acquisition_date: "2023-01-01".to_string(),
            last_connection_ts: last_ts.to_string(),
        }
    }

    fn now() -> NaiveDateTime {
        parse_timestamp("2025-11-16 12:00:00").unwrap()
    }

    #[test]
    fn test_missing_has_error_column_defaults_to_false() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.csv");
        let header: Vec<&str> = DEVICE_FIELDNAMES.iter().copied().filter(|c| *c != "has_error").collect();
        let content = format!(
            "{}\nAT000001,1,12345,SP,ATM,ATMv17,Best Supplier,10.0.0.1,Ubuntu,20.1,2023-01-01,2025-11-16 11:30:00\n",
            header.join(",")
        );
        std::fs::write(&path, content).unwrap();

        let devices = load_devices(&path).unwrap();
        assert_eq!(devices.len(), 1);
        assert!(!devices[0].has_error);
        assert_eq!(devices[0].supplier, "Best Supplier");
    }

    #[test]
    fn test_flag_parsing() {
        assert!(to_bool(" TRUE "));
        assert!(to_bool("y"));
        assert!(to_bool("1"));
        assert!(!to_bool("False"));
        assert!(!to_bool(""));
    }

    #[test]
    fn test_write_then_load_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data_raw/devices.csv");
        let devices = vec![
            device("AT000001", "ATM", false, "2025-11-16 11:30:00"),
            device("PC000002", "PC", true, ""),
        ];

        write_devices(&path, &devices).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("device_code,acquisition_sequence,branch_id,state,has_error"));
        assert!(text.contains(",True,"));

        assert_eq!(load_devices(&path).unwrap(), devices);
        assert_eq!(count_devices(&path).unwrap(), 2);
    }

    #[test]
    fn test_missing_and_empty_inventory_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.csv");
        let err = load_devices(&path).unwrap_err();
        assert!(err.to_string().contains("absent.csv"));

        write_devices(&path, &[]).unwrap();
        assert!(matches!(
            count_devices(&path).unwrap_err(),
            SegwatchError::EmptyInventory { .. }
        ));
    }

    #[test]
    fn test_heartbeat_never_touches_error_devices() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut devices = vec![
            device("AT000001", "ATM", true, "2020-01-01 00:00:00"),
            device("AT000002", "ATM", false, "2020-01-01 00:00:00"),
            device("AT000003", "ATM", true, "garbage"),
        ];

        let updated = refresh_heartbeats(&mut devices, now(), 1.0, &mut rng);
        assert_eq!(updated, 1);
        assert_eq!(devices[0].last_connection_ts, "2020-01-01 00:00:00");
        assert_eq!(devices[2].last_connection_ts, "garbage");

        let ts = devices[1].last_connection().unwrap();
        assert!(ts <= now() && ts >= now() - Duration::minutes(UPDATE_WINDOW_MINUTES));
    }

    #[test]
    fn test_heartbeat_zero_probability_is_noop() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut devices = vec![device("AT000002", "ATM", false, "")];
        assert_eq!(refresh_heartbeats(&mut devices, now(), 0.0, &mut rng), 0);
        assert_eq!(devices[0].last_connection_ts, "");
    }

    #[test]
    fn test_check_in_persists_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.csv");
        write_devices(&path, &[device("CC000001", "CC", false, "")]).unwrap();

        let fleet = FleetInventory::new(&path);
        let mut rng = StdRng::seed_from_u64(3);
        let devices = fleet.check_in(now(), 1.0, &mut rng).unwrap();

        assert!(devices[0].last_connection().is_some());
        assert_eq!(load_devices(&path).unwrap(), devices);
    }
}
