use std::time::SystemTime;

use hive_types::ObjectId;

use crate::error::StoreResult;

/// Listing entry for one stored object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    pub id: ObjectId,
    /// Size of the content in bytes.
    pub size: u64,
    /// Last time the content was written, including dedup hits.
    pub written_at: SystemTime,
}

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written. The same bytes always produce the
///   same id and are stored once.
/// - Reads verify the content hash and fail with
///   [`StoreError::Corrupt`](crate::StoreError::Corrupt) on mismatch.
/// - Concurrent reads are always safe (objects are immutable).
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read an object by its content-addressed ID.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    fn read(&self, id: &ObjectId) -> StoreResult<Option<Vec<u8>>>;

    /// Write content and return its id.
    ///
    /// If the object already exists its content is left untouched and only
    /// its `written_at` timestamp is refreshed.
    fn write(&self, data: &[u8]) -> StoreResult<ObjectId>;

    /// Check whether an object exists in the store.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Delete an object by ID. Returns `true` if the object existed.
    ///
    /// This is intended for garbage collection only. Deletion of
    /// referenced objects corrupts every tree that points at them.
    fn delete(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Size and write time of one object, or `None` if it is absent.
    fn stat(&self, id: &ObjectId) -> StoreResult<Option<ObjectInfo>>;

    /// List every object in the store.
    fn list(&self) -> StoreResult<Vec<ObjectInfo>>;

    /// Write multiple objects and return their ids in order.
    fn write_batch(&self, objects: &[Vec<u8>]) -> StoreResult<Vec<ObjectId>> {
        objects.iter().map(|data| self.write(data)).collect()
    }

    /// Number of stored objects.
    fn count(&self) -> StoreResult<usize> {
        Ok(self.list()?.len())
    }
}
