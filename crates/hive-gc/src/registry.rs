//! Catalog of the hives a node can see.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use hive_core::Hive;
use tracing::{debug, info, warn};

use crate::error::{GcError, GcResult};

/// Named set of open hives, one per instance group.
///
/// Built explicitly by whoever runs garbage collection and passed to it; the
/// registry is a reachability source, not a document access path.
#[derive(Debug, Default)]
pub struct HiveRegistry {
    hives: BTreeMap<String, Arc<Hive>>,
}

impl HiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hive` under `name`. Names are unique.
    pub fn register(&mut self, name: impl Into<String>, hive: Arc<Hive>) -> GcResult<()> {
        let name = name.into();
        if self.hives.contains_key(&name) {
            return Err(GcError::DuplicateHive(name));
        }
        debug!(hive = %name, "hive registered");
        self.hives.insert(name, hive);
        Ok(())
    }

    /// Open every direct subdirectory of `location` that is a hive and
    /// register it under its directory name. Returns how many were added.
    ///
    /// Subdirectories that fail to open, or whose name is already taken, are
    /// logged and skipped.
    pub fn scan_location(&mut self, location: impl AsRef<Path>) -> GcResult<usize> {
        let location = location.as_ref();
        let mut entries = fs::read_dir(location)?.collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.file_name());

        let mut found = 0;
        for entry in entries {
            let path = entry.path();
            if !entry.file_type()?.is_dir() || !Hive::is_hive(&path) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.hives.contains_key(&name) {
                warn!(hive = %name, path = %path.display(), "hive name already registered, skipping");
                continue;
            }
            match Hive::open(&path) {
                Ok(hive) => {
                    self.hives.insert(name, Arc::new(hive));
                    found += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "cannot open hive, skipping"),
            }
        }
        info!(location = %location.display(), found, "scanned storage location");
        Ok(found)
    }

    pub fn get(&self, name: &str) -> GcResult<Arc<Hive>> {
        self.hives
            .get(name)
            .cloned()
            .ok_or_else(|| GcError::HiveNotFound(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Hive>)> {
        self.hives.iter().map(|(name, hive)| (name.as_str(), hive))
    }

    pub fn hives(&self) -> impl Iterator<Item = &Arc<Hive>> {
        self.hives.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.hives.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.hives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hives.is_empty()
    }
}
