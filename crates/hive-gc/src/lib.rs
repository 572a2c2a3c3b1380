//! Fleet-wide garbage collection for Hive object stores.
//!
//! Hives share a single reachability graph: an object referenced from any
//! hive's manifests must survive. Collection therefore runs in two phases:
//!
//! 1. [`mark`] walks every manifest of every hive in a [`HiveRegistry`] and
//!    builds a [`KeepSet`].
//! 2. Every node runs a [`NodeSweeper`] against that keep-set, deleting
//!    objects that are neither kept nor written inside the grace window.
//!
//! [`FleetGc`] drives both phases and tolerates unreachable nodes;
//! [`GcScheduler`] repeats it on a cron schedule.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use hive_core::Hive;
//! use hive_gc::{FleetGc, HiveRegistry, LocalSweeper};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let hive = Arc::new(Hive::in_memory("group-a"));
//! let mut registry = HiveRegistry::new();
//! registry.register("group-a", hive.clone())?;
//!
//! let gc = FleetGc::new(Arc::new(registry), Duration::from_secs(30))
//!     .with_node(Arc::new(LocalSweeper::new("local", vec![hive], Duration::from_secs(3600))));
//! let report = gc.run(true).await?;
//! assert_eq!(report.deleted(), 0);
//! # Ok::<(), hive_gc::GcError>(())
//! # }).unwrap();
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod mark;
pub mod registry;
pub mod schedule;
pub mod space;
pub mod sweep;

pub use config::GcConfig;
pub use coordinator::{FleetGc, GcReport, SkippedNode};
pub use error::{GcError, GcResult};
pub use mark::{mark, KeepSet};
pub use registry::HiveRegistry;
pub use schedule::{parse_schedule, GcScheduler, ScheduleSource, StaticSchedule};
pub use space::{FreeSpaceProbe, FsSpaceProbe, SpaceGate};
pub use sweep::{LocalSweeper, NodeSweeper, SweepReport};
