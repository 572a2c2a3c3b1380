//! The [`Hive`] handle: one object store plus one manifest namespace.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use fs4::FileExt;
use hive_manifest::{FsManifestStore, InMemoryManifestStore, Manifest, ManifestStore};
use hive_store::{FsObjectStore, InMemoryObjectStore, ObjectStore, Tree};
use hive_types::{ManifestKey, ObjectId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audit::{AuditRecord, AuditSink, Auditable};
use crate::error::{HiveError, HiveResult};
use crate::transaction::Transaction;

/// Marker file identifying a directory as a hive.
pub const MARKER_FILE: &str = "hive.json";
/// On-disk format written by [`Hive::init`].
pub const FORMAT_VERSION: u32 = 1;

/// Lock file serializing commits and collector deletions across processes.
pub const LOCK_FILE: &str = ".lock";

const OBJECTS_DIR: &str = "objects";
const MANIFESTS_DIR: &str = "manifests";

#[derive(Debug, Serialize, Deserialize)]
struct HiveMarker {
    format: u32,
    name: String,
    created: DateTime<Utc>,
}

/// Committed-state reads shared by [`Hive`] and [`Transaction`].
///
/// On a hive these see committed state only; on a transaction they also see
/// the writes staged so far.
pub trait HiveRead {
    fn get(&self, id: &ObjectId) -> HiveResult<Vec<u8>>;

    fn contains(&self, id: &ObjectId) -> HiveResult<bool>;

    fn read_manifest(&self, key: &ManifestKey) -> HiveResult<Option<Manifest>>;

    fn list_tags(&self, name: &str) -> HiveResult<Vec<String>>;

    fn read_tree(&self, id: &ObjectId) -> HiveResult<Tree> {
        Tree::decode(&self.get(id)?).map_err(HiveError::from)
    }

    fn resolve(&self, key: &ManifestKey) -> HiveResult<Manifest> {
        self.read_manifest(key)?
            .ok_or_else(|| HiveError::ManifestNotFound(key.clone()))
    }
}

/// A content-addressed store of immutable trees and the manifests naming
/// them.
///
/// All mutation goes through a [`Transaction`]. Commits against one hive are
/// serialized by its write lock: an in-process mutex and, for an on-disk
/// hive, an exclusive lock on `<hive>/.lock` shared by every handle and
/// process opening the same directory.
pub struct Hive {
    name: String,
    path: Option<PathBuf>,
    objects: Arc<dyn ObjectStore>,
    manifests: Arc<dyn ManifestStore>,
    write_lock: Mutex<()>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl Hive {
    /// Assemble a hive from existing backends.
    pub fn from_parts(
        name: impl Into<String>,
        objects: Arc<dyn ObjectStore>,
        manifests: Arc<dyn ManifestStore>,
    ) -> Self {
        Self {
            name: name.into(),
            path: None,
            objects,
            manifests,
            write_lock: Mutex::new(()),
            audit: None,
        }
    }

    /// A hive held entirely in memory.
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::from_parts(
            name,
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryManifestStore::new()),
        )
    }

    /// Create a hive at `path`, or open it if it is already one.
    ///
    /// The hive is named after the last component of `path`.
    pub fn init(path: impl AsRef<Path>) -> HiveResult<Self> {
        let path = path.as_ref();
        if Self::is_hive(path) {
            return Self::open(path);
        }
        fs::create_dir_all(path)?;
        let marker = HiveMarker {
            format: FORMAT_VERSION,
            name: dir_name(path),
            created: Utc::now(),
        };
        fs::write(path.join(MARKER_FILE), serde_json::to_vec_pretty(&marker)?)?;
        info!(path = %path.display(), "initialized hive");
        Self::open(path)
    }

    /// Open the hive at `path`, failing with [`HiveError::InvalidHive`] if
    /// the marker is missing or of an unknown format.
    pub fn open(path: impl AsRef<Path>) -> HiveResult<Self> {
        let path = path.as_ref();
        let raw = match fs::read(path.join(MARKER_FILE)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(HiveError::InvalidHive(format!(
                    "{} has no {MARKER_FILE}",
                    path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        let marker: HiveMarker = serde_json::from_slice(&raw)
            .map_err(|e| HiveError::InvalidHive(format!("{}: {e}", path.display())))?;
        if marker.format != FORMAT_VERSION {
            return Err(HiveError::InvalidHive(format!(
                "{}: unsupported format {}",
                path.display(),
                marker.format
            )));
        }

        let objects = FsObjectStore::open(path.join(OBJECTS_DIR))?;
        let manifests = FsManifestStore::open(path.join(MANIFESTS_DIR))?;
        debug!(path = %path.display(), "opened hive");

        let mut hive = Self::from_parts(dir_name(path), Arc::new(objects), Arc::new(manifests));
        hive.path = Some(path.to_path_buf());
        Ok(hive)
    }

    /// Whether `path` carries a hive marker.
    pub fn is_hive(path: impl AsRef<Path>) -> bool {
        path.as_ref().join(MARKER_FILE).is_file()
    }

    /// Emit audit records for namespace and meta operations to `sink`.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory of an on-disk hive.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The underlying object store. Deleting through it bypasses every
    /// reachability check and is reserved for the garbage collector.
    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn manifests(&self) -> &Arc<dyn ManifestStore> {
        &self.manifests
    }

    // ---- Committed-state reads ----

    /// Content of an object, or [`HiveError::ObjectNotFound`].
    pub fn get(&self, id: &ObjectId) -> HiveResult<Vec<u8>> {
        self.objects
            .read(id)?
            .ok_or(HiveError::ObjectNotFound(*id))
    }

    pub fn contains(&self, id: &ObjectId) -> HiveResult<bool> {
        Ok(self.objects.exists(id)?)
    }

    pub fn read_tree(&self, id: &ObjectId) -> HiveResult<Tree> {
        HiveRead::read_tree(self, id)
    }

    pub fn read_manifest(&self, key: &ManifestKey) -> HiveResult<Option<Manifest>> {
        Ok(self.manifests.read(key)?)
    }

    /// The manifest bound to `key`, or [`HiveError::ManifestNotFound`].
    pub fn resolve(&self, key: &ManifestKey) -> HiveResult<Manifest> {
        HiveRead::resolve(self, key)
    }

    /// Tags of `name`, oldest first.
    pub fn list_tags(&self, name: &str) -> HiveResult<Vec<String>> {
        Ok(self.manifests.list_tags(name)?)
    }

    pub fn list_names(&self) -> HiveResult<Vec<String>> {
        Ok(self.manifests.list_names()?)
    }

    /// Every live manifest, including meta manifests.
    pub fn list_manifests(&self) -> HiveResult<Vec<Manifest>> {
        Ok(self.manifests.list_all()?)
    }

    // ---- Transactions ----

    /// Open an outermost transaction.
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::begin(self)
    }

    /// Join `outer` if given, otherwise open a new outermost transaction.
    pub fn begin_or_join<'h>(&'h self, outer: Option<&Transaction<'h>>) -> Transaction<'h> {
        match outer {
            Some(tx) => tx.join(),
            None => self.begin(),
        }
    }

    /// Run `f` inside a transaction, committing on `Ok` and rolling back on
    /// `Err`.
    pub fn transaction<R, F>(&self, f: F) -> HiveResult<R>
    where
        F: FnOnce(&Transaction<'_>) -> HiveResult<R>,
    {
        let tx = self.begin();
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback();
                Err(e)
            }
        }
    }

    /// Block until this hive's write lock is held.
    ///
    /// Commits apply under it, and the collector re-checks and deletes each
    /// object under it.
    pub fn lock_writes(&self) -> HiveResult<WriteGuard<'_>> {
        let local = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let file = match &self.path {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .read(true)
                    .write(true)
                    .truncate(false)
                    .open(path.join(LOCK_FILE))?;
                file.lock_exclusive()?;
                Some(file)
            }
            None => None,
        };
        Ok(WriteGuard {
            file,
            _local: local,
        })
    }

    pub(crate) fn emit(&self, op: &dyn Auditable) {
        if let Some(sink) = &self.audit {
            sink.record(&op.audit_record());
        }
    }

    pub(crate) fn emit_record(&self, record: &AuditRecord) {
        if let Some(sink) = &self.audit {
            sink.record(record);
        }
    }
}

/// Proof that the hive's write lock is held. Released on drop.
pub struct WriteGuard<'a> {
    file: Option<File>,
    _local: MutexGuard<'a, ()>,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            let _ = file.unlock();
        }
    }
}

impl fmt::Debug for WriteGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteGuard")
            .field("on_disk", &self.file.is_some())
            .finish()
    }
}

impl HiveRead for Hive {
    fn get(&self, id: &ObjectId) -> HiveResult<Vec<u8>> {
        Hive::get(self, id)
    }

    fn contains(&self, id: &ObjectId) -> HiveResult<bool> {
        Hive::contains(self, id)
    }

    fn read_manifest(&self, key: &ManifestKey) -> HiveResult<Option<Manifest>> {
        Hive::read_manifest(self, key)
    }

    fn list_tags(&self, name: &str) -> HiveResult<Vec<String>> {
        Hive::list_tags(self, name)
    }
}

impl fmt::Debug for Hive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hive")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("audited", &self.audit.is_some())
            .finish()
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
