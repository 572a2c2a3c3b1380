use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use hive_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::traits::{ObjectInfo, ObjectStore};

struct MemoryObject {
    data: Vec<u8>,
    written_at: SystemTime,
}

/// Object store held entirely in memory, for tests and embedded hives.
///
/// Reads clone the bytes and re-verify their digest.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, MemoryObject>>,
}

impl InMemoryObjectStore {
    fn read_map(&self) -> RwLockReadGuard<'_, HashMap<ObjectId, MemoryObject>> {
        self.objects.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, HashMap<ObjectId, MemoryObject>> {
        self.objects.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.read_map().is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.read_map()
            .values()
            .map(|obj| obj.data.len() as u64)
            .sum()
    }

    #[cfg(test)]
    fn tamper(&self, id: &ObjectId, data: &[u8]) {
        let mut map = self.write_map();
        if let Some(obj) = map.get_mut(id) {
            obj.data = data.to_vec();
        }
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<Vec<u8>>> {
        let map = self.read_map();
        match map.get(id) {
            None => Ok(None),
            Some(obj) => {
                let computed = ObjectId::digest(&obj.data);
                if computed != *id {
                    return Err(StoreError::Corrupt { id: *id, computed });
                }
                Ok(Some(obj.data.clone()))
            }
        }
    }

    fn write(&self, data: &[u8]) -> StoreResult<ObjectId> {
        let id = ObjectId::digest(data);
        let now = SystemTime::now();
        let mut map = self.write_map();
        map.entry(id)
            .and_modify(|obj| obj.written_at = now)
            .or_insert_with(|| MemoryObject {
                data: data.to_vec(),
                written_at: now,
            });
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        let map = self.read_map();
        Ok(map.contains_key(id))
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        let mut map = self.write_map();
        Ok(map.remove(id).is_some())
    }

    fn stat(&self, id: &ObjectId) -> StoreResult<Option<ObjectInfo>> {
        Ok(self.read_map().get(id).map(|obj| ObjectInfo {
            id: *id,
            size: obj.data.len() as u64,
            written_at: obj.written_at,
        }))
    }

    fn list(&self) -> StoreResult<Vec<ObjectInfo>> {
        let map = self.read_map();
        Ok(map
            .iter()
            .map(|(id, obj)| ObjectInfo {
                id: *id,
                size: obj.data.len() as u64,
                written_at: obj.written_at,
            })
            .collect())
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.len())
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryObjectStore")
            .field("objects", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{EntryType, TreeBuilder};

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn write_and_read_blob() {
        let store = InMemoryObjectStore::new();
        let id = store.write(b"hello world").unwrap();
        assert_eq!(id, ObjectId::digest(b"hello world"));
        assert_eq!(store.read(&id).unwrap().unwrap(), b"hello world");
    }

    #[test]
    fn write_and_read_tree() {
        let store = InMemoryObjectStore::new();
        let blob = store.write(b"hello").unwrap();
        let tree = TreeBuilder::new()
            .add("hello.txt", blob, EntryType::Blob)
            .build()
            .unwrap();
        let id = store.write(&tree.encode().unwrap()).unwrap();
        assert_eq!(id, tree.id().unwrap());

        let decoded = crate::Tree::decode(&store.read(&id).unwrap().unwrap()).unwrap();
        assert_eq!(decoded.get("hello.txt").unwrap().object_id, blob);
    }

    // -----------------------------------------------------------------------
    // Content-addressing correctness
    // -----------------------------------------------------------------------

    #[test]
    fn same_content_is_stored_once() {
        let store = InMemoryObjectStore::new();
        let id1 = store.write(b"identical content").unwrap();
        let id2 = store.write(b"identical content").unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn dedup_refreshes_written_at() {
        let store = InMemoryObjectStore::new();
        store.write(b"again").unwrap();
        let first = store.list().unwrap()[0].written_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.write(b"again").unwrap();
        let second = store.list().unwrap()[0].written_at;
        assert!(second > first);
        let id = ObjectId::digest(b"again");
        assert_eq!(store.stat(&id).unwrap().unwrap().written_at, second);
        store.delete(&id).unwrap();
        assert!(store.stat(&id).unwrap().is_none());
    }

    #[test]
    fn tampered_content_is_reported_corrupt() {
        let store = InMemoryObjectStore::new();
        let id = store.write(b"genuine").unwrap();
        let other = store.write(b"untouched").unwrap();
        store.tamper(&id, b"forged");

        let err = store.read(&id).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        // The rest of the store stays readable.
        assert_eq!(store.read(&other).unwrap().unwrap(), b"untouched");
    }

    // -----------------------------------------------------------------------
    // Exists / Delete / List
    // -----------------------------------------------------------------------

    #[test]
    fn exists_and_delete() {
        let store = InMemoryObjectStore::new();
        let id = store.write(b"to-delete").unwrap();
        assert!(store.exists(&id).unwrap());
        assert!(store.delete(&id).unwrap());
        assert!(!store.exists(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
    }

    #[test]
    fn read_missing_object_returns_none() {
        let store = InMemoryObjectStore::new();
        assert!(store.read(&ObjectId::digest(b"missing")).unwrap().is_none());
    }

    #[test]
    fn list_reports_sizes() {
        let store = InMemoryObjectStore::new();
        store.write(b"12345").unwrap();
        store.write(b"123456789").unwrap();
        let mut sizes: Vec<u64> = store.list().unwrap().iter().map(|i| i.size).collect();
        sizes.sort();
        assert_eq!(sizes, [5, 9]);
        assert_eq!(store.total_bytes(), 14);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn write_batch_returns_ids_in_order() {
        let store = InMemoryObjectStore::new();
        let ids = store
            .write_batch(&[b"a".to_vec(), b"b".to_vec(), b"a".to_vec()])
            .unwrap();
        assert_eq!(ids[0], ids[2]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn concurrent_writes_of_same_content() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryObjectStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.write(b"shared data").unwrap())
            })
            .collect();

        let ids: Vec<ObjectId> = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn debug_format() {
        let store = InMemoryObjectStore::new();
        store.write(b"x").unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryObjectStore"));
        assert!(debug.contains("objects"));
    }
}
