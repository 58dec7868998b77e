/**
 * MONITEUR "EN LIGNE" - Détection de chute vs baseline glissante
 *
 * RÔLE :
 * Transforme l'historique d'un segment du store en série de % en ligne,
 * puis décide si le dernier point chute trop sous la moyenne des précédents.
 *
 * FONCTIONNEMENT :
 * - total en ligne = SUM(count) par ts pour le segment surveillé
 * - % = total / nb machines de l'inventaire courant × 100
 * - baseline = moyenne des `history` snapshots précédant le dernier
 * - drop = max(0, (baseline - dernier) / baseline), défini si baseline > 0
 * - alerte ssi drop >= seuil ; une ligne ajoutée au journal d'alertes
 *
 * États : NO_HISTORY → HISTORY_ONLY → BASELINED → ALERTING.
 * Aucun état en mémoire entre deux évaluations.
 *
 * ATTENTION (dénominateur) : le nombre de machines est relu dans l'inventaire
 * COURANT à chaque évaluation, pas figé au moment du snapshot. Si la taille du
 * parc change, les % historiques se décalent. Comportement conservé tel quel.
 */

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::alert_log::{append_alert, AlertLogEntry};
use crate::error::Result;
use crate::inventory::count_devices;
use crate::store::SnapshotStore;

pub const DEFAULT_STORE_PATH: &str = "data_collection/segment_timeseries.db";
pub const DEFAULT_INVENTORY_PATH: &str = "data_raw/synthetic_devices.csv";
pub const DEFAULT_ALERT_LOG: &str = "sre_analysis/alerts.log";
pub const DEFAULT_SEGMENT: &str = "Type";
pub const DEFAULT_HISTORY: usize = 4;
pub const DEFAULT_DROP_THRESHOLD: f64 = 0.15;

pub const NO_HISTORY_MESSAGE: &str = "No ingestion snapshots found in the time-series database.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub store_path: PathBuf,
    pub inventory_path: PathBuf,
    pub segment: String,
    pub history: usize,
    pub drop_threshold: f64,
    pub alert_log: PathBuf,
    pub enable_alert_log: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            store_path: DEFAULT_STORE_PATH.into(),
            inventory_path: DEFAULT_INVENTORY_PATH.into(),
            segment: DEFAULT_SEGMENT.to_string(),
            history: DEFAULT_HISTORY,
            drop_threshold: DEFAULT_DROP_THRESHOLD,
            alert_log: DEFAULT_ALERT_LOG.into(),
            enable_alert_log: true,
        }
    }
}

/// Un point de la série : ts d'ingestion, total en ligne, % du parc.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnlineSnapshot {
    pub timestamp: String,
    pub total_online: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorState {
    NoHistory,
    HistoryOnly,
    Baselined,
    Alerting,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorResult {
    pub snapshot: Option<OnlineSnapshot>,
    pub baseline_percentage: Option<f64>,
    pub drop_fraction: Option<f64>,
    pub alert_triggered: bool,
    pub message: String,
}

impl MonitorResult {
    pub fn no_history() -> Self {
        Self {
            snapshot: None,
            baseline_percentage: None,
            drop_fraction: None,
            alert_triggered: false,
            message: NO_HISTORY_MESSAGE.to_string(),
        }
    }

    pub fn state(&self) -> MonitorState {
        match (&self.snapshot, self.baseline_percentage) {
            (None, _) => MonitorState::NoHistory,
            _ if self.alert_triggered => MonitorState::Alerting,
            (Some(_), Some(_)) => MonitorState::Baselined,
            (Some(_), None) => MonitorState::HistoryOnly,
        }
    }
}

/// Résumé texte unique, utilisé par la CLI, les logs et le transport HTTP.
pub fn compose_message(
    latest: &OnlineSnapshot,
    baseline_percentage: Option<f64>,
    drop_fraction: Option<f64>,
    alert_triggered: bool,
) -> String {
    let mut parts = vec![format!(
        "[SRE] Latest snapshot @ {}: {} machines online ({:.2}%).",
        latest.timestamp, latest.total_online, latest.percentage
    )];
    if let Some(baseline) = baseline_percentage {
        parts.push(format!("Rolling baseline: {baseline:.2}%."));
    }
    if let Some(drop) = drop_fraction {
        parts.push(format!("Drop vs. baseline: {:.2}%.", drop * 100.0));
    }
    if alert_triggered {
        parts.push("ALERT: online percentage fell beyond the allowed threshold.".to_string());
    }
    parts.join(" ")
}

/// Décision pure sur une série déjà triée (aucun IO).
pub fn evaluate_snapshots(snapshots: &[OnlineSnapshot], history: usize, drop_threshold: f64) -> MonitorResult {
    let Some((latest, prior)) = snapshots.split_last() else {
        return MonitorResult::no_history();
    };

    let samples = &prior[prior.len().saturating_sub(history.max(1))..];
    let baseline = (!samples.is_empty())
        .then(|| samples.iter().map(|s| s.percentage).sum::<f64>() / samples.len() as f64);

    let drop_fraction = baseline
        .filter(|b| *b > 0.0)
        .map(|b| ((b - latest.percentage) / b).max(0.0));
    let alert_triggered = drop_fraction.is_some_and(|d| d >= drop_threshold);

    MonitorResult {
        message: compose_message(latest, baseline, drop_fraction, alert_triggered),
        snapshot: Some(latest.clone()),
        baseline_percentage: baseline,
        drop_fraction,
        alert_triggered,
    }
}

pub struct OnlineMonitor {
    settings: MonitorSettings,
}

impl OnlineMonitor {
    pub fn new(mut settings: MonitorSettings) -> Self {
        settings.history = settings.history.max(1);
        settings.drop_threshold = if settings.drop_threshold.is_nan() {
            0.0
        } else {
            settings.drop_threshold.max(0.0)
        };
        Self { settings }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Série complète du segment. Store absent ou vide => série vide,
    /// sans lire l'inventaire.
    pub fn load_history(&self) -> Result<Vec<OnlineSnapshot>> {
        let totals = match SnapshotStore::open_existing(&self.settings.store_path)? {
            Some(store) => store.online_totals(&self.settings.segment)?,
            None => Vec::new(),
        };
        if totals.is_empty() {
            return Ok(Vec::new());
        }

        let total_devices = count_devices(&self.settings.inventory_path)?;
        Ok(totals
            .into_iter()
            .map(|(timestamp, total_online)| OnlineSnapshot {
                percentage: total_online as f64 * 100.0 / total_devices as f64,
                timestamp,
                total_online,
            })
            .collect())
    }

    /// Évalue le dernier snapshot. `evaluated_at` n'est utilisé que pour
    /// horodater la ligne du journal d'alertes.
    pub fn evaluate_latest(&self, evaluated_at: DateTime<Utc>) -> Result<MonitorResult> {
        let snapshots = self.load_history()?;
        let result = evaluate_snapshots(&snapshots, self.settings.history, self.settings.drop_threshold);

        match (&result.snapshot, result.alert_triggered) {
            (None, _) => {
                debug!(store = %self.settings.store_path.display(), "monitor: no history yet");
            }
            (Some(latest), true) => {
                warn!(
                    segment = %self.settings.segment,
                    ts = %latest.timestamp,
                    pct = latest.percentage,
                    drop = result.drop_fraction.unwrap_or(0.0),
                    "online percentage drop detected"
                );
                if self.settings.enable_alert_log {
                    append_alert(
                        &self.settings.alert_log,
                        &AlertLogEntry {
                            evaluated_at,
                            snapshot_ts: latest.timestamp.clone(),
                            online: latest.total_online,
                            percentage: latest.percentage,
                            baseline: result.baseline_percentage.unwrap_or(0.0),
                            drop_fraction: result.drop_fraction.unwrap_or(0.0),
                        },
                    )?;
                }
            }
            (Some(latest), false) => {
                info!(segment = %self.settings.segment, ts = %latest.timestamp, pct = latest.percentage, "monitor evaluated");
            }
        }
        Ok(result)
    }
}

/// Évaluation post-ingestion avec segment et journal par défaut.
pub fn run_post_ingestion_monitor(
    store_path: &Path,
    inventory_path: &Path,
    history: usize,
    drop_threshold: f64,
    evaluated_at: DateTime<Utc>,
) -> Result<MonitorResult> {
    OnlineMonitor::new(MonitorSettings {
        store_path: store_path.to_path_buf(),
        inventory_path: inventory_path.to_path_buf(),
        history,
        drop_threshold,
        ..MonitorSettings::default()
    })
    .evaluate_latest(evaluated_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert_log::read_alerts;
    use crate::error::SegwatchError;
    use crate::inventory::{tests::device, write_devices};
    use crate::segments::{DimensionPair, FlatRecord};

    struct Fixture {
        _dir: tempfile::TempDir,
        settings: MonitorSettings,
    }

    fn fixture(devices: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let inventory_path = dir.path().join("devices.csv");
        let fleet: Vec<_> = (0..devices)
            .map(|i| device(&format!("AT{i:06}"), "ATM", false, ""))
            .collect();
        write_devices(&inventory_path, &fleet).unwrap();

        let settings = MonitorSettings {
            store_path: dir.path().join("ts.db"),
            inventory_path,
            alert_log: dir.path().join("alerts.log"),
            ..MonitorSettings::default()
        };
        Fixture { _dir: dir, settings }
    }

    fn seed(settings: &MonitorSettings, counts: &[u64]) {
        let mut store = SnapshotStore::open(&settings.store_path).unwrap();
        for (i, count) in counts.iter().enumerate() {
            // réparti sur deux lignes pour vérifier le SUM par ts
            let half = count / 2;
            let rows: Vec<FlatRecord> = [("ATM", half), ("PC", count - half)]
                .into_iter()
                .map(|(value, c)| FlatRecord {
                    segment: "Type".to_string(),
                    count: c,
                    dims: [
                        Some(DimensionPair { name: "machine_type".into(), value: value.into() }),
                        None,
                        None,
                    ],
                })
                .collect();
            store.upsert_batch(&format!("2025-11-16 1{i}:00:00"), &rows).unwrap();
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-11-16T15:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_drop_against_rolling_baseline_alerts() {
        let f = fixture(100);
        seed(&f.settings, &[80, 82, 79, 81, 50]);

        let result = OnlineMonitor::new(f.settings.clone()).evaluate_latest(now()).unwrap();
        assert_eq!(result.baseline_percentage, Some(80.5));
        let drop = result.drop_fraction.unwrap();
        assert!((drop - 0.3789).abs() < 1e-4);
        assert!(result.alert_triggered);
        assert_eq!(result.state(), MonitorState::Alerting);
        assert_eq!(
            result.message,
            "[SRE] Latest snapshot @ 2025-11-16 14:00:00: 50 machines online (50.00%). \
             Rolling baseline: 80.50%. Drop vs. baseline: 37.89%. \
             ALERT: online percentage fell beyond the allowed threshold."
        );

        let alerts = read_alerts(&f.settings.alert_log).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].snapshot_ts, "2025-11-16 14:00:00");
        assert_eq!(alerts[0].online, 50);
    }

    #[test]
    fn test_history_window_is_bounded() {
        let f = fixture(100);
        // le 10 initial sort de la fenêtre de 4
        seed(&f.settings, &[10, 80, 82, 79, 81, 50]);
        let result = OnlineMonitor::new(f.settings.clone()).evaluate_latest(now()).unwrap();
        assert_eq!(result.baseline_percentage, Some(80.5));
    }

    #[test]
    fn test_single_snapshot_has_no_baseline() {
        let f = fixture(10);
        seed(&f.settings, &[7]);

        let result = OnlineMonitor::new(f.settings.clone()).evaluate_latest(now()).unwrap();
        assert_eq!(result.baseline_percentage, None);
        assert_eq!(result.drop_fraction, None);
        assert!(!result.alert_triggered);
        assert_eq!(result.state(), MonitorState::HistoryOnly);
        assert!(!result.message.contains("baseline"));
        assert!(result.message.contains("7 machines online (70.00%)"));
    }

    #[test]
    fn test_no_history_is_not_an_error() {
        let f = fixture(0);
        // inventaire vide : jamais lu tant qu'il n'y a pas d'historique
        let result = OnlineMonitor::new(f.settings.clone()).evaluate_latest(now()).unwrap();
        assert_eq!(result.snapshot, None);
        assert_eq!(result.message, NO_HISTORY_MESSAGE);
        assert_eq!(result.state(), MonitorState::NoHistory);
        assert!(!f.settings.alert_log.exists());
    }

    #[test]
    fn test_missing_inventory_with_history_is_an_error() {
        let mut f = fixture(10);
        seed(&f.settings, &[5, 6]);
        f.settings.inventory_path = f.settings.inventory_path.with_file_name("gone.csv");

        let err = OnlineMonitor::new(f.settings.clone()).evaluate_latest(now()).unwrap_err();
        assert!(matches!(err, SegwatchError::MissingData { .. }));
        assert!(err.to_string().contains("gone.csv"));
    }

    #[test]
    fn test_rise_is_never_a_drop() {
        let snaps: Vec<OnlineSnapshot> = [50.0, 90.0]
            .iter()
            .enumerate()
            .map(|(i, pct)| OnlineSnapshot {
                timestamp: format!("2025-11-16 1{i}:00:00"),
                total_online: *pct as u64,
                percentage: *pct,
            })
            .collect();
        let result = evaluate_snapshots(&snaps, 4, 0.0);
        assert_eq!(result.drop_fraction, Some(0.0));
        // seuil 0 => 0 >= 0 déclenche
        assert!(result.alert_triggered);

        let result = evaluate_snapshots(&snaps, 4, 0.15);
        assert_eq!(result.state(), MonitorState::Baselined);
    }

    #[test]
    fn test_zero_baseline_disables_drop() {
        let snaps = vec![
            OnlineSnapshot { timestamp: "a".into(), total_online: 0, percentage: 0.0 },
            OnlineSnapshot { timestamp: "b".into(), total_online: 0, percentage: 0.0 },
        ];
        let result = evaluate_snapshots(&snaps, 4, 0.15);
        assert_eq!(result.baseline_percentage, Some(0.0));
        assert_eq!(result.drop_fraction, None);
        assert!(!result.alert_triggered);
    }

    #[test]
    fn test_n_alerts_give_n_lines() {
        let mut f = fixture(100);
        seed(&f.settings, &[80, 80, 40]);
        let monitor = OnlineMonitor::new(f.settings.clone());
        for _ in 0..3 {
            assert!(monitor.evaluate_latest(now()).unwrap().alert_triggered);
        }
        let alerts = read_alerts(&f.settings.alert_log).unwrap();
        assert_eq!(alerts.len(), 3);
        assert!(alerts.iter().all(|a| a.percentage == 40.0 && a.baseline == 80.0));

        f.settings.enable_alert_log = false;
        OnlineMonitor::new(f.settings.clone()).evaluate_latest(now()).unwrap();
        assert_eq!(read_alerts(&f.settings.alert_log).unwrap().len(), 3);
    }

    #[test]
    fn test_settings_are_clamped() {
        let monitor = OnlineMonitor::new(MonitorSettings {
            history: 0,
            drop_threshold: -1.0,
            ..MonitorSettings::default()
        });
        assert_eq!(monitor.settings().history, 1);
        assert_eq!(monitor.settings().drop_threshold, 0.0);
    }
}
