use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

use crate::monitor::{
    MonitorSettings, DEFAULT_ALERT_LOG, DEFAULT_DROP_THRESHOLD, DEFAULT_HISTORY, DEFAULT_INVENTORY_PATH,
    DEFAULT_SEGMENT, DEFAULT_STORE_PATH,
};

pub const CONFIG_ENV: &str = "SEGWATCH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "segwatch.yaml";
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub bind: String,
    pub inventory_path: PathBuf,
    pub store_path: PathBuf,
    pub alert_log: PathBuf,
    pub monitor: MonitorConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MonitorConf {
    pub segment: String,
    pub history: usize,
    pub drop_threshold: f64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.into(),
            inventory_path: DEFAULT_INVENTORY_PATH.into(),
            store_path: DEFAULT_STORE_PATH.into(),
            alert_log: DEFAULT_ALERT_LOG.into(),
            monitor: MonitorConf::default(),
        }
    }
}

impl Default for MonitorConf {
    fn default() -> Self {
        Self {
            segment: DEFAULT_SEGMENT.into(),
            history: DEFAULT_HISTORY,
            drop_threshold: DEFAULT_DROP_THRESHOLD,
        }
    }
}

impl KernelConfig {
    /// Réglages du moniteur dérivés de la conf kernel
    pub fn monitor_settings(&self, enable_alert_log: bool) -> MonitorSettings {
        MonitorSettings {
            store_path: self.store_path.clone(),
            inventory_path: self.inventory_path.clone(),
            segment: self.monitor.segment.clone(),
            history: self.monitor.history,
            drop_threshold: self.monitor.drop_threshold,
            alert_log: self.alert_log.clone(),
            enable_alert_log,
        }
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    load_config_from(Path::new(&path)).await
}

/// Fichier absent, vide ou invalide => conf par défaut (avec un warning)
pub async fn load_config_from(path: &Path) -> KernelConfig {
    if !path.exists() {
        warn!(path = %path.display(), "no config file, using defaults");
        return KernelConfig::default();
    }

    let txt = fs::read_to_string(path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        warn!(path = %path.display(), "empty config file, using defaults");
        return KernelConfig::default();
    }
    serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "invalid config, using defaults");
        KernelConfig::default()
    })
}
