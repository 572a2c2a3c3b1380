//! The per-node sweep phase.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hive_core::Hive;
use hive_store::ObjectStore;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::GcResult;
use crate::mark::KeepSet;
use crate::space::SpaceGate;

/// Outcome of sweeping one node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub node: String,
    pub dry_run: bool,
    /// Hives swept.
    pub hives: usize,
    /// Objects inspected.
    pub scanned: usize,
    /// Objects deleted, or that would be deleted on a dry run.
    pub deleted: usize,
    pub reclaimed_bytes: u64,
    /// Unreferenced objects kept because they were written inside the grace
    /// window.
    pub retained_recent: usize,
    /// Hives not swept because the free-space gate refused.
    pub skipped_hives: Vec<String>,
    /// The sweep stopped early because its caller gave up on it.
    pub cancelled: bool,
}

/// A fleet member that can sweep its own local stores.
///
/// The transport to a remote node is up to the implementation; the
/// coordinator bounds every call with a timeout.
#[async_trait]
pub trait NodeSweeper: Send + Sync {
    fn node(&self) -> &str;

    async fn sweep(&self, keep: Arc<KeepSet>, dry_run: bool) -> GcResult<SweepReport>;
}

/// Sweeps hives stored on this node.
#[derive(Clone)]
pub struct LocalSweeper {
    node: String,
    hives: Vec<Arc<Hive>>,
    grace: Duration,
    gate: Option<SpaceGate>,
}

impl LocalSweeper {
    pub fn new(node: impl Into<String>, hives: Vec<Arc<Hive>>, grace: Duration) -> Self {
        Self {
            node: node.into(),
            hives,
            grace,
            gate: None,
        }
    }

    /// Consult `gate` before deleting from any on-disk hive.
    pub fn with_space_gate(mut self, gate: SpaceGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Sweep every hive, stopping between objects once `cancel` is set.
    pub fn sweep_blocking(
        &self,
        keep: &KeepSet,
        dry_run: bool,
        cancel: &AtomicBool,
    ) -> GcResult<SweepReport> {
        let cutoff = keep
            .marked_at()
            .checked_sub(self.grace)
            .unwrap_or(UNIX_EPOCH);
        let mut report = SweepReport {
            node: self.node.clone(),
            dry_run,
            ..SweepReport::default()
        };

        for hive in &self.hives {
            if !dry_run {
                if let (Some(gate), Some(path)) = (&self.gate, hive.path()) {
                    if !gate.has_free_space(path) {
                        warn!(node = %self.node, hive = hive.name(), "insufficient free space, not sweeping hive");
                        report.skipped_hives.push(hive.name().to_string());
                        continue;
                    }
                }
            }
            sweep_hive(hive, keep, cutoff, dry_run, cancel, &mut report)?;
            if report.cancelled {
                warn!(node = %self.node, hive = hive.name(), deleted = report.deleted, "sweep cancelled");
                break;
            }
            report.hives += 1;
        }

        info!(
            node = %self.node,
            dry_run,
            hives = report.hives,
            scanned = report.scanned,
            deleted = report.deleted,
            reclaimed_bytes = report.reclaimed_bytes,
            retained_recent = report.retained_recent,
            "sweep complete"
        );
        Ok(report)
    }
}

/// Deletes happen one at a time under the hive's write lock, after
/// re-reading the object's write time, so a commit that rewrote the object
/// after the listing keeps it.
fn sweep_hive(
    hive: &Hive,
    keep: &KeepSet,
    cutoff: SystemTime,
    dry_run: bool,
    cancel: &AtomicBool,
    report: &mut SweepReport,
) -> GcResult<()> {
    let objects = hive.objects();
    for info in objects.list()? {
        if cancel.load(Ordering::Relaxed) {
            report.cancelled = true;
            return Ok(());
        }
        report.scanned += 1;
        if keep.contains(&info.id) {
            continue;
        }
        if info.written_at > cutoff {
            report.retained_recent += 1;
            continue;
        }
        if !dry_run {
            let _write = hive.lock_writes()?;
            match objects.stat(&info.id)? {
                None => continue,
                Some(current) if current.written_at > cutoff => {
                    report.retained_recent += 1;
                    continue;
                }
                Some(_) => {}
            }
            if !objects.delete(&info.id)? {
                continue;
            }
        }
        debug!(hive = hive.name(), id = %info.id, size = info.size, dry_run, "unreferenced object");
        report.deleted += 1;
        report.reclaimed_bytes += info.size;
    }
    Ok(())
}

/// Sets its flag when dropped, which happens when the coordinator's
/// timeout abandons the sweep future.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl NodeSweeper for LocalSweeper {
    fn node(&self) -> &str {
        &self.node
    }

    async fn sweep(&self, keep: Arc<KeepSet>, dry_run: bool) -> GcResult<SweepReport> {
        let this = self.clone();
        let cancel = Arc::new(AtomicBool::new(false));
        let _cancel_on_drop = CancelOnDrop(Arc::clone(&cancel));
        tokio::task::spawn_blocking(move || this.sweep_blocking(&keep, dry_run, &cancel)).await?
    }
}

impl std::fmt::Debug for LocalSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSweeper")
            .field("node", &self.node)
            .field("hives", &self.hives.len())
            .field("grace", &self.grace)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::FreeSpaceProbe;
    use hive_core::{Manifest, ManifestKey, ObjectId};
    use hive_store::{EntryType, ObjectStore, TreeBuilder};
    use std::path::Path;

    fn publish(hive: &Hive, content: &[u8]) -> ObjectId {
        hive.transaction(|tx| {
            let blob = tx.put(content)?;
            let tree = TreeBuilder::new().add("f", blob, EntryType::Blob).build()?;
            let root = tx.put_tree(&tree)?;
            tx.insert_manifest(Manifest::new(ManifestKey::new("app", "1"), root))?;
            Ok(root)
        })
        .unwrap()
    }

    fn keep_after_now(ids: impl IntoIterator<Item = ObjectId>) -> Arc<KeepSet> {
        std::thread::sleep(Duration::from_millis(5));
        Arc::new(KeepSet::from_ids(ids, SystemTime::now()))
    }

    #[tokio::test]
    async fn deletes_only_unkept_objects() {
        let hive = Arc::new(Hive::in_memory("a"));
        let root = publish(&hive, b"live");
        let garbage = hive.transaction(|tx| tx.put(b"garbage")).unwrap();
        let blob = ObjectId::digest(b"live");

        let keep = keep_after_now([root, blob]);
        let sweeper = LocalSweeper::new("node-1", vec![hive.clone()], Duration::ZERO);
        let report = sweeper.sweep(keep, false).await.unwrap();

        assert_eq!(report.deleted, 1);
        assert_eq!(report.reclaimed_bytes, 7);
        assert_eq!(report.scanned, 3);
        assert!(!hive.contains(&garbage).unwrap());
        assert!(hive.contains(&root).unwrap());
        assert!(hive.contains(&blob).unwrap());
    }

    #[tokio::test]
    async fn dry_run_deletes_nothing() {
        let hive = Arc::new(Hive::in_memory("a"));
        let garbage = hive.transaction(|tx| tx.put(b"garbage")).unwrap();
        let sweeper = LocalSweeper::new("node-1", vec![hive.clone()], Duration::ZERO);
        let report = sweeper.sweep(keep_after_now(Vec::new()), true).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.deleted, 1);
        assert!(hive.contains(&garbage).unwrap());
    }

    #[tokio::test]
    async fn grace_window_protects_recent_writes() {
        let hive = Arc::new(Hive::in_memory("a"));
        let fresh = hive.transaction(|tx| tx.put(b"fresh")).unwrap();
        let sweeper = LocalSweeper::new("node-1", vec![hive.clone()], Duration::from_secs(3600));
        let report = sweeper.sweep(keep_after_now(Vec::new()), false).await.unwrap();
        assert_eq!(report.deleted, 0);
        assert_eq!(report.retained_recent, 1);
        assert!(hive.contains(&fresh).unwrap());
    }

    #[tokio::test]
    async fn writes_after_mark_survive() {
        let hive = Arc::new(Hive::in_memory("a"));
        let keep = Arc::new(KeepSet::from_ids(Vec::new(), SystemTime::now()));
        std::thread::sleep(Duration::from_millis(5));
        let late = hive.transaction(|tx| tx.put(b"published after mark")).unwrap();
        let sweeper = LocalSweeper::new("node-1", vec![hive.clone()], Duration::ZERO);
        sweeper.sweep(keep, false).await.unwrap();
        assert!(hive.contains(&late).unwrap());
    }

    #[test]
    fn cancelled_sweep_stops_deleting() {
        let hive = Arc::new(Hive::in_memory("a"));
        let garbage = hive.transaction(|tx| tx.put(b"garbage")).unwrap();
        let sweeper = LocalSweeper::new("node-1", vec![hive.clone()], Duration::ZERO);
        let cancel = AtomicBool::new(true);
        let report = sweeper
            .sweep_blocking(&keep_after_now(Vec::new()), false, &cancel)
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.deleted, 0);
        assert_eq!(report.hives, 0);
        assert!(hive.contains(&garbage).unwrap());
    }

    #[test]
    fn dropping_the_sweep_future_sets_cancel() {
        let flag = Arc::new(AtomicBool::new(false));
        drop(CancelOnDrop(Arc::clone(&flag)));
        assert!(flag.load(Ordering::Relaxed));
    }

    #[test]
    fn rewrite_while_sweep_waits_for_lock_keeps_object() {
        let hive = Arc::new(Hive::in_memory("a"));
        let id = hive.transaction(|tx| tx.put(b"contended")).unwrap();
        let keep = keep_after_now(Vec::new());
        let sweeper = LocalSweeper::new("node-1", vec![hive.clone()], Duration::ZERO);

        let guard = hive.lock_writes().unwrap();
        let report = std::thread::scope(|s| {
            let sweep = s.spawn(|| sweeper.sweep_blocking(&keep, false, &AtomicBool::new(false)));
            std::thread::sleep(Duration::from_millis(100));
            hive.objects().write(b"contended").unwrap();
            drop(guard);
            sweep.join().unwrap()
        })
        .unwrap();

        assert_eq!(report.deleted, 0);
        assert_eq!(report.retained_recent, 1);
        assert!(hive.contains(&id).unwrap());
    }

    struct NoSpace;

    impl FreeSpaceProbe for NoSpace {
        fn available_bytes(&self, _path: &Path) -> std::io::Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn space_gate_skips_on_disk_hives() {
        let dir = tempfile::tempdir().unwrap();
        let hive = Arc::new(Hive::init(dir.path().join("a")).unwrap());
        let garbage = hive.transaction(|tx| tx.put(b"garbage")).unwrap();
        let sweeper = LocalSweeper::new("node-1", vec![hive.clone()], Duration::ZERO)
            .with_space_gate(SpaceGate::new(Arc::new(NoSpace), 1));
        let report = sweeper.sweep(keep_after_now(Vec::new()), false).await.unwrap();
        assert_eq!(report.skipped_hives, ["a"]);
        assert_eq!(report.hives, 0);
        assert!(hive.objects().exists(&garbage).unwrap());
    }
}
