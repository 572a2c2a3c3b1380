//! On-disk manifest store.
//!
//! Layout: `<root>/<escaped name>/<escaped tag>.json`, one JSON record per
//! manifest. Names and tags are percent-escaped so that each becomes a single
//! path component. Records are created with a no-clobber rename, which makes
//! insertion atomic across processes sharing the directory.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use hive_types::ManifestKey;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{ManifestError, Result};
use crate::names::validate_key;
use crate::traits::{check_existing, ManifestStore};
use crate::types::Manifest;

const RECORD_SUFFIX: &str = ".json";

#[derive(Serialize, Deserialize)]
struct Record {
    /// Insertion order across the store; wall-clock based so that processes
    /// sharing a directory agree on a rough order.
    sequence: u64,
    manifest: Manifest,
}

/// File-per-manifest [`ManifestStore`].
#[derive(Debug)]
pub struct FsManifestStore {
    root: PathBuf,
    last_sequence: Mutex<u64>,
}

impl FsManifestStore {
    /// Open (or create) a manifest store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            last_sequence: Mutex::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn name_dir(&self, name: &str) -> PathBuf {
        self.root.join(escape(name))
    }

    fn record_path(&self, key: &ManifestKey) -> PathBuf {
        self.name_dir(&key.name)
            .join(format!("{}{RECORD_SUFFIX}", escape(&key.tag)))
    }

    fn next_sequence(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let mut last = self
            .last_sequence
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last = now.max(*last + 1);
        *last
    }

    fn read_record(path: &Path) -> Result<Option<Record>> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| ManifestError::Serialization(format!("{}: {e}", path.display())))
    }
}

impl ManifestStore for FsManifestStore {
    fn read(&self, key: &ManifestKey) -> Result<Option<Manifest>> {
        Ok(Self::read_record(&self.record_path(key))?.map(|r| r.manifest))
    }

    fn insert(&self, manifest: &Manifest) -> Result<bool> {
        validate_key(&manifest.key)?;

        let path = self.record_path(&manifest.key);
        if let Some(existing) = Self::read_record(&path)? {
            return check_existing(&existing.manifest, manifest);
        }

        let dir = self.name_dir(&manifest.key.name);
        fs::create_dir_all(&dir)?;
        let record = Record {
            sequence: self.next_sequence(),
            manifest: manifest.clone(),
        };
        let data = serde_json::to_vec_pretty(&record)
            .map_err(|e| ManifestError::Serialization(e.to_string()))?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                debug!(key = %manifest.key, root = %manifest.root, "manifest inserted");
                Ok(true)
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                let existing = Self::read_record(&path)?
                    .ok_or_else(|| ManifestError::NotFound {
                        key: manifest.key.clone(),
                    })?;
                check_existing(&existing.manifest, manifest)
            }
            Err(e) => Err(e.error.into()),
        }
    }

    fn delete(&self, key: &ManifestKey) -> Result<bool> {
        match fs::remove_file(self.record_path(key)) {
            Ok(()) => {
                // Only succeeds once the name has no tags left.
                let _ = fs::remove_dir(self.name_dir(&key.name));
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list_tags(&self, name: &str) -> Result<Vec<String>> {
        let dir = self.name_dir(name);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut tags = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(escaped_tag) = file_name.strip_suffix(RECORD_SUFFIX) else {
                continue;
            };
            if escaped_tag.starts_with('.') {
                continue;
            }
            if let Some(record) = Self::read_record(&entry.path())? {
                tags.push((record.sequence, unescape(escaped_tag)));
            }
        }
        tags.sort();
        Ok(tags.into_iter().map(|(_, tag)| tag).collect())
    }

    fn list_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = unescape(&entry.file_name().to_string_lossy());
            if !self.list_tags(&name)?.is_empty() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Percent-escape everything except `[A-Za-z0-9._-]`; a leading `.` is also
/// escaped so records never collide with temporary files.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, byte) in value.bytes().enumerate() {
        let plain =
            byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-') || (byte == b'.' && i > 0);
        if plain {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn unescape(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_types::ObjectId;

    fn temp_store() -> (tempfile::TempDir, FsManifestStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsManifestStore::open(dir.path().join("manifests")).unwrap();
        (dir, store)
    }

    fn manifest(name: &str, tag: &str, root: &[u8]) -> Manifest {
        Manifest::new(ManifestKey::new(name, tag), ObjectId::digest(root))
    }

    #[test]
    fn escape_roundtrip() {
        for value in ["app", "group/app/.meta/history", "1.0.0", ".hidden", "ünï code", "50%"] {
            let escaped = escape(value);
            assert!(!escaped.contains('/'));
            assert!(!escaped.starts_with('.'));
            assert_eq!(unescape(&escaped), value);
        }
    }

    #[test]
    fn insert_read_and_reopen() {
        let (dir, store) = temp_store();
        let m = manifest("group/app", "1.0", b"root").with_label("k", "v");
        assert!(store.insert(&m).unwrap());
        assert_eq!(store.resolve(&m.key).unwrap(), m);

        let reopened = FsManifestStore::open(dir.path().join("manifests")).unwrap();
        assert_eq!(reopened.resolve(&m.key).unwrap(), m);
        assert_eq!(reopened.list_names().unwrap(), ["group/app"]);
    }

    #[test]
    fn conflict_and_idempotence() {
        let (_dir, store) = temp_store();
        store.insert(&manifest("app", "1", b"a")).unwrap();
        assert!(!store.insert(&manifest("app", "1", b"a")).unwrap());
        assert!(matches!(
            store.insert(&manifest("app", "1", b"b")).unwrap_err(),
            ManifestError::Conflict { .. }
        ));
    }

    #[test]
    fn tags_in_insertion_order() {
        let (_dir, store) = temp_store();
        for tag in ["3", "1", "2"] {
            store.insert(&manifest("app", tag, tag.as_bytes())).unwrap();
        }
        assert_eq!(store.list_tags("app").unwrap(), ["3", "1", "2"]);
    }

    #[test]
    fn delete_and_list() {
        let (_dir, store) = temp_store();
        let m = manifest("app", "1", b"a");
        store.insert(&m).unwrap();
        assert!(store.delete(&m.key).unwrap());
        assert!(!store.delete(&m.key).unwrap());
        assert!(store.list_tags("app").unwrap().is_empty());
        assert!(store.list_names().unwrap().is_empty());
        assert!(store.list_tags("never-existed").unwrap().is_empty());
    }
}
