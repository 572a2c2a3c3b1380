//! The global mark phase.
//!
//! Walks every live manifest of every registered hive and collects the ids
//! of every object reachable from their roots. Never writes.

use std::collections::HashSet;
use std::time::SystemTime;

use hive_core::{Hive, HiveError};
use hive_types::ObjectId;
use tracing::{debug, info, warn};

use crate::error::GcResult;
use crate::registry::HiveRegistry;

/// Fleet-wide set of objects that must survive a sweep.
#[derive(Clone, Debug)]
pub struct KeepSet {
    ids: HashSet<ObjectId>,
    marked_at: SystemTime,
    manifests: usize,
    missing: usize,
}

impl KeepSet {
    /// A keep-set from ids computed elsewhere.
    pub fn from_ids(ids: impl IntoIterator<Item = ObjectId>, marked_at: SystemTime) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            marked_at,
            manifests: 0,
            missing: 0,
        }
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.ids.iter()
    }

    /// When the mark started. Objects written after this (minus the grace
    /// period) are never swept.
    pub fn marked_at(&self) -> SystemTime {
        self.marked_at
    }

    /// Number of live manifests walked.
    pub fn manifests(&self) -> usize {
        self.manifests
    }

    /// Trees that could not be read during the walk.
    pub fn missing(&self) -> usize {
        self.missing
    }

    /// Whether every reachable tree was read. Descendants of a missing
    /// tree are unknown, so an incomplete set is unsafe to delete against.
    pub fn is_complete(&self) -> bool {
        self.missing == 0
    }
}

/// Compute the keep-set over every hive in `registry`.
pub fn mark(registry: &HiveRegistry) -> GcResult<KeepSet> {
    let mut keep = KeepSet::from_ids(Vec::new(), SystemTime::now());
    for (name, hive) in registry.iter() {
        let manifests = hive.list_manifests()?;
        debug!(hive = name, manifests = manifests.len(), "marking hive");
        for manifest in &manifests {
            mark_tree(hive, manifest.root, &mut keep)?;
        }
        keep.manifests += manifests.len();
    }
    info!(
        hives = registry.len(),
        manifests = keep.manifests,
        reachable = keep.len(),
        missing = keep.missing,
        "mark complete"
    );
    Ok(keep)
}

fn mark_tree(hive: &Hive, root: ObjectId, keep: &mut KeepSet) -> GcResult<()> {
    let mut pending = vec![root];
    while let Some(id) = pending.pop() {
        if !keep.ids.insert(id) {
            continue;
        }
        let tree = match hive.read_tree(&id) {
            Ok(tree) => tree,
            Err(e @ (HiveError::ObjectNotFound(_) | HiveError::Corrupt { .. })) => {
                warn!(hive = hive.name(), %id, error = %e, "reachable tree unreadable during mark");
                keep.missing += 1;
                continue;
            }
            Err(HiveError::Store(e)) => {
                // A root that is a blob rather than a tree.
                debug!(hive = hive.name(), %id, error = %e, "root is not a tree");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        for entry in tree.entries() {
            if entry.entry_type.is_tree() {
                pending.push(entry.object_id);
            } else {
                keep.ids.insert(entry.object_id);
            }
        }
    }
    Ok(())
}
