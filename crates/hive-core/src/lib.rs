//! The Hive repository API.
//!
//! A [`Hive`] pairs a content-addressed object store with a manifest
//! namespace and guards every mutation with a [`Transaction`]. On top of it
//! sit versioned sidecar documents ([`MetaManifest`]), the per-instance
//! lifecycle log ([`InstanceHistory`]) and rolling usage counters
//! ([`ClientUsage`]).
//!
//! # Quick Start
//!
//! ```
//! use hive_core::{Hive, Manifest, ManifestKey};
//! use hive_store::{EntryType, TreeBuilder};
//!
//! let hive = Hive::in_memory("group-a");
//! let key = ManifestKey::new("app", "1.0");
//! hive.transaction(|tx| {
//!     let blob = tx.put(b"hello")?;
//!     let tree = TreeBuilder::new().add("file.txt", blob, EntryType::Blob).build()?;
//!     let root = tx.put_tree(&tree)?;
//!     tx.insert_manifest(Manifest::new(key.clone(), root))
//! })?;
//!
//! let root = hive.resolve(&key)?.root;
//! assert_eq!(hive.read_tree(&root)?.len(), 1);
//! # Ok::<(), hive_core::HiveError>(())
//! ```
//!
//! # Modules
//!
//! - [`hive`]: [`Hive`] and the [`HiveRead`] trait
//! - [`transaction`]: staged, all-or-nothing write scopes
//! - [`meta`]: [`MetaManifest`] sidecar documents
//! - [`history`]: [`InstanceHistory`]
//! - [`usage`]: [`ClientUsage`]
//! - [`audit`]: [`Auditable`] operations and [`AuditSink`]s
//! - [`ops`]: the operations the hive audits
//! - [`import`]: directory import and export

pub mod audit;
pub mod error;
pub mod history;
pub mod hive;
pub mod import;
pub mod meta;
pub mod ops;
pub mod transaction;
pub mod usage;

pub use audit::{
    AuditField, AuditRecord, AuditSink, AuditStrategy, AuditValue, Auditable, MemoryAuditSink,
    TracingAuditSink,
};
pub use error::{HiveError, HiveResult};
pub use history::{HistoryAction, HistoryRecord, InstanceHistory};
pub use hive::{Hive, HiveRead, WriteGuard, FORMAT_VERSION, LOCK_FILE, MARKER_FILE};
pub use import::{export_tree, import_dir};
pub use meta::MetaManifest;
pub use transaction::Transaction;
pub use usage::{ClientUsage, ClientUsageData};

pub use hive_manifest::Manifest;
pub use hive_types::{ManifestKey, ObjectId};
