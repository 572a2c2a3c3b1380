//! Local filesystem object store.
//!
//! Objects live under `<root>/<first two hex chars>/<remaining hex chars>`.
//! Writes go to a temporary file in the target directory and are moved into
//! place with a no-clobber rename, so readers never observe partial content
//! and concurrent writers of the same object cannot interfere.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use hive_types::ObjectId;
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::traits::{ObjectInfo, ObjectStore};

/// Object store backed by a fan-out directory tree.
#[derive(Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Open (or create) an object store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path at which the object with `id` is (or would be) stored.
    pub fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    fn touch(path: &Path) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_modified(SystemTime::now())
    }
}

impl ObjectStore for FsObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<Vec<u8>>> {
        let data = match fs::read(self.object_path(id)) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let computed = ObjectId::digest(&data);
        if computed != *id {
            warn!(%id, %computed, "object content does not match its id");
            return Err(StoreError::Corrupt { id: *id, computed });
        }
        Ok(Some(data))
    }

    fn write(&self, data: &[u8]) -> StoreResult<ObjectId> {
        let id = ObjectId::digest(data);
        let path = self.object_path(&id);

        if path.exists() {
            Self::touch(&path)?;
            return Ok(id);
        }

        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                debug!(%id, size = data.len(), "object written");
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                // Lost a race with another writer of the same content.
                Self::touch(&path)?;
            }
            Err(e) => return Err(e.error.into()),
        }
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.object_path(id).try_exists()?)
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        match fs::remove_file(self.object_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn stat(&self, id: &ObjectId) -> StoreResult<Option<ObjectInfo>> {
        let meta = match fs::metadata(self.object_path(id)) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(ObjectInfo {
            id: *id,
            size: meta.len(),
            written_at: meta.modified()?,
        }))
    }

    fn list(&self) -> StoreResult<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(2).max_depth(2) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.starts_with('.') {
                // In-flight temporary file.
                continue;
            }
            let prefix = entry
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            let id = match ObjectId::from_hex(&format!("{prefix}{name}")) {
                Ok(id) => id,
                Err(_) => {
                    debug!(path = %entry.path().display(), "ignoring foreign file in object store");
                    continue;
                }
            };
            let meta = entry.metadata().map_err(io::Error::from)?;
            objects.push(ObjectInfo {
                id,
                size: meta.len(),
                written_at: meta.modified()?,
            });
        }
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, FsObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path().join("objects")).unwrap();
        (dir, store)
    }

    #[test]
    fn write_and_read() {
        let (_dir, store) = temp_store();
        let id = store.write(b"hello").unwrap();
        assert_eq!(id, ObjectId::digest(b"hello"));
        assert!(store.object_path(&id).is_file());
        assert_eq!(store.read(&id).unwrap().unwrap(), b"hello");
    }

    #[test]
    fn dedup_keeps_single_file() {
        let (_dir, store) = temp_store();
        store.write(b"twice").unwrap();
        store.write(b"twice").unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn dedup_refreshes_mtime() {
        let (_dir, store) = temp_store();
        let id = store.write(b"republished").unwrap();
        let old = SystemTime::now() - std::time::Duration::from_secs(3600);
        OpenOptions::new()
            .write(true)
            .open(store.object_path(&id))
            .unwrap()
            .set_modified(old)
            .unwrap();
        assert_eq!(store.stat(&id).unwrap().unwrap().written_at, old);

        store.write(b"republished").unwrap();
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].written_at > old);
        assert_eq!(store.stat(&id).unwrap().unwrap().written_at, listed[0].written_at);
    }

    #[test]
    fn stat_missing_object() {
        let (_dir, store) = temp_store();
        assert!(store.stat(&ObjectId::digest(b"absent")).unwrap().is_none());
    }

    #[test]
    fn tampered_file_is_corrupt() {
        let (_dir, store) = temp_store();
        let id = store.write(b"genuine").unwrap();
        let other = store.write(b"bystander").unwrap();
        fs::write(store.object_path(&id), b"forged").unwrap();

        assert!(matches!(
            store.read(&id).unwrap_err(),
            StoreError::Corrupt { .. }
        ));
        assert_eq!(store.read(&other).unwrap().unwrap(), b"bystander");
    }

    #[test]
    fn list_ignores_temp_and_foreign_files() {
        let (_dir, store) = temp_store();
        let id = store.write(b"listed").unwrap();
        let fan_out = store.object_path(&id).parent().unwrap().to_path_buf();
        fs::write(fan_out.join(".tmpABCDEF"), b"partial").unwrap();
        fs::write(fan_out.join("README"), b"not an object").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].size, 6);
    }

    #[test]
    fn delete_removes_file() {
        let (_dir, store) = temp_store();
        let id = store.write(b"gone").unwrap();
        assert!(store.delete(&id).unwrap());
        assert!(!store.exists(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert!(store.read(&id).unwrap().is_none());
    }

    #[test]
    fn reopen_sees_existing_objects() {
        let dir = tempfile::tempdir().unwrap();
        let id = FsObjectStore::open(dir.path()).unwrap().write(b"persisted").unwrap();
        let reopened = FsObjectStore::open(dir.path()).unwrap();
        assert_eq!(reopened.read(&id).unwrap().unwrap(), b"persisted");
    }
}
