use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use hive_gc::{GcConfig, GcError, GcResult, ScheduleSource};
use serde::{Deserialize, Serialize};

/// Node configuration, read from TOML.
///
/// ```toml
/// node = "minion-3"
/// storage_roots = ["/var/lib/hive"]
///
/// [gc]
/// schedule = "0 0 3 * * * *"
/// grace_minutes = 60
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveConfig {
    pub node: String,
    /// Directories whose subdirectories are hives.
    pub storage_roots: Vec<PathBuf>,
    pub gc: GcConfig,
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            node: "local".to_string(),
            storage_roots: Vec::new(),
            gc: GcConfig::default(),
        }
    }
}

impl HiveConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    /// [`HiveConfig::load`], or the defaults when `path` does not exist.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Reads the GC schedule from the config file on every call, so edits take
/// effect at the next scheduled run.
#[derive(Clone, Debug)]
pub struct ConfigFileSchedule {
    path: PathBuf,
}

impl ConfigFileSchedule {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScheduleSource for ConfigFileSchedule {
    fn schedule_expression(&self) -> GcResult<String> {
        HiveConfig::load_or_default(&self.path)
            .map(|c| c.gc.schedule)
            .map_err(|e| GcError::Config(format!("{e:#}")))
    }
}
