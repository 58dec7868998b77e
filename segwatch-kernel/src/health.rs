use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::state::{new_state, Shared};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub requests_served: u64,
    pub devices_tracked: usize,
    pub last_generated_at: Option<String>,
    pub memory_usage_mb: f32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    requests_served: Arc<AtomicU64>,
    devices_tracked: Arc<AtomicUsize>,
    last_generated_at: Shared<Option<String>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            requests_served: Arc::new(AtomicU64::new(0)),
            devices_tracked: Arc::new(AtomicUsize::new(0)),
            last_generated_at: new_state(None),
        }
    }

    pub fn record_request(&self) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Appelé après chaque payload `/segment-stats` servi
    pub fn record_payload(&self, generated_at: &str, devices_in_inventory: usize) {
        self.devices_tracked.store(devices_in_inventory, Ordering::Relaxed);
        *self.last_generated_at.lock() = Some(generated_at.to_string());
    }

    pub fn get_health(&self) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            requests_served: self.requests_served.load(Ordering::Relaxed),
            devices_tracked: self.devices_tracked.load(Ordering::Relaxed),
            last_generated_at: self.last_generated_at.lock().clone(),
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0; // KB -> MB
            }
        }
    }

    // inconnu hors Linux
    0.0
}
