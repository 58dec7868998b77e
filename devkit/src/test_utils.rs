/*!
Test Harness pour segwatch

Facilite l'écriture de tests avec:
- Dossier temporaire isolé (inventaire, store, journal d'alertes)
- Parc synthétique "tout en ligne" à un instant donné
- Historique du store pré-rempli pour le moniteur
*/

use anyhow::{ensure, Result};
use chrono::NaiveDateTime;
use rand::rngs::StdRng;
use rand::SeedableRng;
use segwatch_kernel::clock::format_timestamp;
use segwatch_kernel::config::KernelConfig;
use segwatch_kernel::inventory::{write_devices, DeviceRecord};
use segwatch_kernel::monitor::MonitorSettings;
use segwatch_kernel::segments::{DimensionPair, FlatRecord};
use segwatch_kernel::store::SnapshotStore;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

use crate::fleet_gen::generate_records;

/// Seed fixe : les parcs de test sont reproductibles
pub const HARNESS_SEED: u64 = 42;

/// Harness de test : un environnement segwatch complet dans un dossier temporaire
pub struct TestHarness {
    pub temp_dir: TempDir,
    pub inventory_path: PathBuf,
    pub store_path: PathBuf,
    pub alert_log_path: PathBuf,
}

impl TestHarness {
    /// Crée un nouveau harness de test
    pub fn new() -> Result<Self> {
        // Init logging pour tests
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        let temp_dir = tempfile::tempdir()?;
        let root = temp_dir.path().to_path_buf();
        Ok(Self {
            inventory_path: root.join("data_raw/synthetic_devices.csv"),
            store_path: root.join("data_collection/segment_timeseries.db"),
            alert_log_path: root.join("sre_analysis/alerts.log"),
            temp_dir,
        })
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// `n` machines saines, toutes vues à `now`
    pub fn with_online_fleet(self, n: usize, now: NaiveDateTime) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(HARNESS_SEED);
        let fleet: Vec<DeviceRecord> = generate_records(n, &mut rng, now)
            .into_iter()
            .map(|mut device| {
                device.has_error = false;
                device.last_connection_ts = format_timestamp(now);
                device
            })
            .collect();
        self.write_fleet(&fleet)?;
        Ok(self)
    }

    pub fn write_fleet(&self, devices: &[DeviceRecord]) -> Result<()> {
        write_devices(&self.inventory_path, devices)?;
        info!("🧪 Wrote {} devices to test inventory", devices.len());
        Ok(())
    }

    /// Un lot par timestamp, une seule ligne `machine_type=ATM` portant `count`.
    pub fn seed_online_history(&self, segment: &str, timestamps: &[&str], counts: &[u64]) -> Result<()> {
        ensure!(
            timestamps.len() == counts.len(),
            "timestamps ({}) and counts ({}) differ in length",
            timestamps.len(),
            counts.len()
        );

        let mut store = SnapshotStore::open(&self.store_path)?;
        for (ts, count) in timestamps.iter().zip(counts) {
            let record = FlatRecord {
                segment: segment.to_string(),
                count: *count,
                dims: [
                    Some(DimensionPair {
                        name: "machine_type".to_string(),
                        value: "ATM".to_string(),
                    }),
                    None,
                    None,
                ],
            };
            store.upsert_batch(ts, &[record])?;
        }
        Ok(())
    }

    /// Réglages du moniteur pointant sur les fichiers du harness
    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            store_path: self.store_path.clone(),
            inventory_path: self.inventory_path.clone(),
            alert_log: self.alert_log_path.clone(),
            ..MonitorSettings::default()
        }
    }

    pub fn kernel_config(&self) -> KernelConfig {
        KernelConfig {
            bind: "127.0.0.1:0".to_string(),
            inventory_path: self.inventory_path.clone(),
            store_path: self.store_path.clone(),
            alert_log: self.alert_log_path.clone(),
            ..KernelConfig::default()
        }
    }
}
