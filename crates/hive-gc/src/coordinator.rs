//! The GC coordinator: one global mark, then a bounded sweep on every node.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hive_core::{AuditField, AuditSink, Auditable};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{GcError, GcResult};
use crate::mark::{mark, KeepSet};
use crate::registry::HiveRegistry;
use crate::sweep::{NodeSweeper, SweepReport};

/// A node that did not complete its sweep.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedNode {
    pub node: String,
    pub reason: String,
}

/// Outcome of one [`FleetGc::run`].
#[derive(Clone, Debug, Serialize)]
pub struct GcReport {
    pub started_at: DateTime<Utc>,
    /// Whether the run was requested as a dry run.
    pub dry_run: bool,
    /// Set when deletion was suppressed because the mark was incomplete.
    pub forced_dry_run: bool,
    pub hives: usize,
    pub manifests: usize,
    pub reachable: usize,
    pub missing: usize,
    pub nodes: Vec<SweepReport>,
    pub skipped: Vec<SkippedNode>,
}

impl GcReport {
    pub fn deleted(&self) -> usize {
        self.nodes.iter().map(|n| n.deleted).sum()
    }

    pub fn reclaimed_bytes(&self) -> u64 {
        self.nodes.iter().map(|n| n.reclaimed_bytes).sum()
    }
}

impl Auditable for GcReport {
    fn operation(&self) -> &'static str {
        "gc.run"
    }

    fn audit_fields(&self) -> Vec<AuditField> {
        let swept: Vec<&str> = self.nodes.iter().map(|n| n.node.as_str()).collect();
        let skipped: Vec<&str> = self.skipped.iter().map(|n| n.node.as_str()).collect();
        vec![
            AuditField::full("started_at", &self.started_at.to_rfc3339()),
            AuditField::full("dry_run", &(self.dry_run || self.forced_dry_run)),
            AuditField::full("reachable", &self.reachable),
            AuditField::full("deleted", &self.deleted()),
            AuditField::full("reclaimed_bytes", &self.reclaimed_bytes()),
            AuditField::peek("swept", 10, &swept),
            AuditField::full("skipped", &skipped),
        ]
    }
}

/// Runs mark-and-sweep across a fleet.
///
/// The mark reads every hive in the registry; the sweep is then sent to
/// every node concurrently, each bounded by the node timeout. A node that
/// fails or times out is recorded in [`GcReport::skipped`] and retried on
/// the next run.
pub struct FleetGc {
    registry: Arc<HiveRegistry>,
    nodes: Vec<Arc<dyn NodeSweeper>>,
    node_timeout: Duration,
    audit: Option<Arc<dyn AuditSink>>,
}

impl FleetGc {
    pub fn new(registry: Arc<HiveRegistry>, node_timeout: Duration) -> Self {
        Self {
            registry,
            nodes: Vec::new(),
            node_timeout,
            audit: None,
        }
    }

    pub fn with_node(mut self, node: Arc<dyn NodeSweeper>) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn registry(&self) -> &Arc<HiveRegistry> {
        &self.registry
    }

    pub fn node_names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.node().to_string()).collect()
    }

    /// Mark the whole registry.
    pub async fn mark(&self) -> GcResult<KeepSet> {
        let registry = Arc::clone(&self.registry);
        tokio::task::spawn_blocking(move || mark(&registry)).await?
    }

    /// Mark, then sweep every node.
    pub async fn run(&self, dry_run: bool) -> GcResult<GcReport> {
        let started_at = Utc::now();
        let keep = Arc::new(self.mark().await?);

        let forced_dry_run = !dry_run && !keep.is_complete();
        if forced_dry_run {
            warn!(missing = keep.missing(), "mark incomplete, sweeping as dry run");
        }
        let sweep_dry_run = dry_run || forced_dry_run;

        let handles: Vec<_> = self
            .nodes
            .iter()
            .map(|node| {
                let node = Arc::clone(node);
                let keep = Arc::clone(&keep);
                let timeout = self.node_timeout;
                let name = node.node().to_string();
                let handle = tokio::spawn(async move {
                    match tokio::time::timeout(timeout, node.sweep(keep, sweep_dry_run)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(GcError::Timeout {
                            node: node.node().to_string(),
                            timeout,
                        }),
                    }
                });
                (name, handle)
            })
            .collect();

        let mut nodes = Vec::new();
        let mut skipped = Vec::new();
        for (name, handle) in handles {
            let outcome = handle.await.map_err(GcError::from).and_then(|r| r);
            match outcome {
                Ok(report) => nodes.push(report),
                Err(e) => {
                    warn!(node = %name, error = %e, "node skipped for this run");
                    skipped.push(SkippedNode {
                        node: name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let report = GcReport {
            started_at,
            dry_run,
            forced_dry_run,
            hives: self.registry.len(),
            manifests: keep.manifests(),
            reachable: keep.len(),
            missing: keep.missing(),
            nodes,
            skipped,
        };
        info!(
            dry_run = sweep_dry_run,
            reachable = report.reachable,
            deleted = report.deleted(),
            reclaimed_bytes = report.reclaimed_bytes(),
            swept = report.nodes.len(),
            skipped = report.skipped.len(),
            "gc run finished"
        );
        if let Some(sink) = &self.audit {
            sink.record(&report.audit_record());
        }
        Ok(report)
    }
}

impl std::fmt::Debug for FleetGc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetGc")
            .field("hives", &self.registry.len())
            .field("nodes", &self.node_names())
            .field("node_timeout", &self.node_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hive_core::{Hive, MemoryAuditSink};
    use hive_store::ObjectStore;

    struct Failing;

    #[async_trait]
    impl NodeSweeper for Failing {
        fn node(&self) -> &str {
            "down"
        }

        async fn sweep(&self, _keep: Arc<KeepSet>, _dry_run: bool) -> GcResult<SweepReport> {
            Err(GcError::Unreachable {
                node: "down".into(),
                reason: "connection refused".into(),
            })
        }
    }

    #[tokio::test]
    async fn empty_fleet_runs() {
        let gc = FleetGc::new(Arc::new(HiveRegistry::new()), Duration::from_secs(1));
        let report = gc.run(true).await.unwrap();
        assert_eq!(report.reachable, 0);
        assert!(report.nodes.is_empty());
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn incomplete_mark_forces_dry_run() {
        use crate::sweep::LocalSweeper;
        use hive_core::{Manifest, ManifestKey};
        use hive_store::{EntryType, TreeBuilder};

        let hive = Arc::new(Hive::in_memory("a"));
        let (inner, garbage) = hive
            .transaction(|tx| {
                let blob = tx.put(b"leaf")?;
                let inner = TreeBuilder::new().add("leaf", blob, EntryType::Blob).build()?;
                let inner_id = tx.put_tree(&inner)?;
                let root = TreeBuilder::new().add("dir", inner_id, EntryType::Tree).build()?;
                let root_id = tx.put_tree(&root)?;
                tx.insert_manifest(Manifest::new(ManifestKey::new("app", "1"), root_id))?;
                Ok((inner_id, tx.put(b"garbage")?))
            })
            .unwrap();
        hive.objects().delete(&inner).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let mut registry = HiveRegistry::new();
        registry.register("a", hive.clone()).unwrap();
        let sink = Arc::new(MemoryAuditSink::new());
        let gc = FleetGc::new(Arc::new(registry), Duration::from_secs(5))
            .with_node(Arc::new(LocalSweeper::new("local", vec![hive.clone()], Duration::ZERO)))
            .with_audit_sink(sink.clone());

        let report = gc.run(false).await.unwrap();
        assert!(report.forced_dry_run);
        assert_eq!(report.missing, 1);
        assert!(hive.contains(&garbage).unwrap());

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, "gc.run");
        assert_eq!(records[0].get("dry_run"), Some("true"));
    }

    #[tokio::test]
    async fn failing_node_is_skipped() {
        let gc = FleetGc::new(Arc::new(HiveRegistry::new()), Duration::from_secs(1))
            .with_node(Arc::new(Failing));
        let report = gc.run(false).await.unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].node, "down");
        assert!(report.skipped[0].reason.contains("connection refused"));
    }
}
