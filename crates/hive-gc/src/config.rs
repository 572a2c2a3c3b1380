use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Garbage collection settings of a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Cron expression with seconds (`sec min hour day month weekday [year]`).
    pub schedule: String,
    /// Unreferenced objects written this recently before the mark are kept.
    pub grace_minutes: u64,
    pub node_timeout_secs: u64,
    pub dry_run: bool,
    /// Minimum free space required on a hive's filesystem before sweeping it.
    pub min_free_mb: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            schedule: "0 0 3 * * * *".to_string(),
            grace_minutes: 60,
            node_timeout_secs: 30,
            dry_run: false,
            min_free_mb: 0,
        }
    }
}

impl GcConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_minutes.saturating_mul(60))
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_secs(self.node_timeout_secs)
    }

    pub fn min_free_bytes(&self) -> u64 {
        self.min_free_mb.saturating_mul(1024 * 1024)
    }
}
