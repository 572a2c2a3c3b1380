//! In-memory manifest store for testing and ephemeral use.
//!
//! [`InMemoryManifestStore`] keeps all manifests in a `HashMap` protected by
//! a `RwLock`, each stamped with an insertion sequence number so tags can be
//! listed in the order they were created.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use hive_types::ManifestKey;

use crate::error::{ManifestError, Result};
use crate::names::validate_key;
use crate::traits::{check_existing, ManifestStore};
use crate::types::Manifest;

#[derive(Debug, Default)]
struct State {
    manifests: HashMap<ManifestKey, (u64, Manifest)>,
    next_seq: u64,
}

/// An in-memory implementation of [`ManifestStore`].
///
/// Data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryManifestStore {
    state: RwLock<State>,
}

impl InMemoryManifestStore {
    /// Create a new empty manifest store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live manifests.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.manifests.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> ManifestError {
    ManifestError::Serialization(format!("lock poisoned: {e}"))
}

impl ManifestStore for InMemoryManifestStore {
    fn read(&self, key: &ManifestKey) -> Result<Option<Manifest>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.manifests.get(key).map(|(_, m)| m.clone()))
    }

    fn insert(&self, manifest: &Manifest) -> Result<bool> {
        validate_key(&manifest.key)?;

        let mut state = self.state.write().map_err(poisoned)?;
        if let Some((_, existing)) = state.manifests.get(&manifest.key) {
            return check_existing(existing, manifest);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .manifests
            .insert(manifest.key.clone(), (seq, manifest.clone()));
        Ok(true)
    }

    fn delete(&self, key: &ManifestKey) -> Result<bool> {
        let mut state = self.state.write().map_err(poisoned)?;
        Ok(state.manifests.remove(key).is_some())
    }

    fn list_tags(&self, name: &str) -> Result<Vec<String>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut tags: Vec<(u64, String)> = state
            .manifests
            .iter()
            .filter(|(k, _)| k.name == name)
            .map(|(k, (seq, _))| (*seq, k.tag.clone()))
            .collect();
        tags.sort();
        Ok(tags.into_iter().map(|(_, tag)| tag).collect())
    }

    fn list_names(&self) -> Result<Vec<String>> {
        let state = self.state.read().map_err(poisoned)?;
        let names: BTreeSet<String> = state.manifests.keys().map(|k| k.name.clone()).collect();
        Ok(names.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_types::ObjectId;

    fn manifest(name: &str, tag: &str, root: &[u8]) -> Manifest {
        Manifest::new(ManifestKey::new(name, tag), ObjectId::digest(root))
    }

    #[test]
    fn insert_and_resolve() {
        let store = InMemoryManifestStore::new();
        let m = manifest("app", "1.0", b"root").with_label("k", "v");
        assert!(store.insert(&m).unwrap());
        assert_eq!(store.resolve(&m.key).unwrap(), m);
    }

    #[test]
    fn resolve_missing_is_not_found() {
        let store = InMemoryManifestStore::new();
        let err = store.resolve(&ManifestKey::new("nope", "1")).unwrap_err();
        assert!(matches!(err, ManifestError::NotFound { .. }));
        assert!(store.read(&ManifestKey::new("nope", "1")).unwrap().is_none());
    }

    #[test]
    fn reinsert_same_root_is_noop() {
        let store = InMemoryManifestStore::new();
        let m = manifest("app", "1.0", b"root");
        assert!(store.insert(&m).unwrap());
        assert!(!store.insert(&m).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reinsert_different_root_conflicts() {
        let store = InMemoryManifestStore::new();
        store.insert(&manifest("app", "1.0", b"root-a")).unwrap();
        let err = store.insert(&manifest("app", "1.0", b"root-b")).unwrap_err();
        assert!(matches!(err, ManifestError::Conflict { .. }));
        // The original binding survives.
        assert_eq!(
            store.resolve(&ManifestKey::new("app", "1.0")).unwrap().root,
            ObjectId::digest(b"root-a")
        );
    }

    #[test]
    fn tags_listed_in_insertion_order() {
        let store = InMemoryManifestStore::new();
        for tag in ["10", "9", "beta", "2"] {
            store.insert(&manifest("app", tag, tag.as_bytes())).unwrap();
        }
        store.insert(&manifest("other", "1", b"x")).unwrap();
        assert_eq!(store.list_tags("app").unwrap(), ["10", "9", "beta", "2"]);
        assert_eq!(store.list_names().unwrap(), ["app", "other"]);
    }

    #[test]
    fn delete_removes_binding_only_once() {
        let store = InMemoryManifestStore::new();
        let m = manifest("app", "1", b"r");
        store.insert(&m).unwrap();
        assert!(store.delete(&m.key).unwrap());
        assert!(!store.delete(&m.key).unwrap());
        assert!(store.list_tags("app").unwrap().is_empty());
        assert!(store.list_names().unwrap().is_empty());
    }

    #[test]
    fn invalid_key_rejected() {
        let store = InMemoryManifestStore::new();
        let err = store.insert(&manifest("", "1", b"r")).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidName { .. }));
    }

    #[test]
    fn list_all_returns_every_manifest() {
        let store = InMemoryManifestStore::new();
        store.insert(&manifest("a", "1", b"1")).unwrap();
        store.insert(&manifest("a", "2", b"2")).unwrap();
        store.insert(&manifest("b", "1", b"3")).unwrap();
        assert_eq!(store.list_all().unwrap().len(), 3);
    }

    #[test]
    fn racing_inserts_of_one_key_yield_one_winner() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryManifestStore::new());
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.insert(&manifest("app", "1", &[i])).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
    }
}
