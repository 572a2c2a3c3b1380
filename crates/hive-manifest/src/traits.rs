//! The [`ManifestStore`] trait defining the manifest namespace interface.

use hive_types::ManifestKey;

use crate::error::{ManifestError, Result};
use crate::types::Manifest;

/// Storage backend for the manifest namespace of one hive.
///
/// Implementations must be thread-safe (`Send + Sync`). `insert` must be
/// atomic with respect to other inserts of the same key: two racing writers
/// are resolved by conflict rejection, never by silent overwrite.
pub trait ManifestStore: Send + Sync {
    /// Read a manifest by key.
    ///
    /// Returns `Ok(None)` if the manifest does not exist.
    fn read(&self, key: &ManifestKey) -> Result<Option<Manifest>>;

    /// Insert a manifest.
    ///
    /// Returns `Ok(true)` if it was newly created and `Ok(false)` if the
    /// identical root was already bound to the key. Fails with
    /// [`ManifestError::Conflict`] if the key is bound to a different root.
    fn insert(&self, manifest: &Manifest) -> Result<bool>;

    /// Delete a manifest by key.
    ///
    /// Returns `Ok(true)` if it existed and was deleted.
    fn delete(&self, key: &ManifestKey) -> Result<bool>;

    /// Tags of `name` in insertion order (oldest first).
    fn list_tags(&self, name: &str) -> Result<Vec<String>>;

    /// All manifest names that have at least one tag, sorted.
    fn list_names(&self) -> Result<Vec<String>>;

    /// Read a manifest, failing with [`ManifestError::NotFound`] if absent.
    fn resolve(&self, key: &ManifestKey) -> Result<Manifest> {
        self.read(key)?
            .ok_or_else(|| ManifestError::NotFound { key: key.clone() })
    }

    /// Every live manifest in the store.
    fn list_all(&self) -> Result<Vec<Manifest>> {
        let mut all = Vec::new();
        for name in self.list_names()? {
            for tag in self.list_tags(&name)? {
                // Tolerate a concurrent delete between listing and reading.
                if let Some(m) = self.read(&ManifestKey::new(name.clone(), tag))? {
                    all.push(m);
                }
            }
        }
        Ok(all)
    }
}

/// Shared conflict rule for backends: compare an existing binding with the
/// manifest being inserted.
pub(crate) fn check_existing(existing: &Manifest, attempted: &Manifest) -> Result<bool> {
    if existing.root == attempted.root {
        Ok(false)
    } else {
        Err(ManifestError::Conflict {
            key: attempted.key.clone(),
            existing: existing.root,
            attempted: attempted.root,
        })
    }
}
