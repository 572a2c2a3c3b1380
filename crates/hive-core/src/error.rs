use hive_manifest::ManifestError;
use hive_store::StoreError;
use hive_types::{ManifestKey, ObjectId};
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the [`Hive`](crate::Hive) API.
///
/// Lower-level store and namespace errors are normalized so callers can
/// match on the kind (`NotFound`, `Conflict`, `Corrupt`) without caring which
/// layer produced it.
#[derive(Debug, Error)]
pub enum HiveError {
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("manifest not found: {0}")]
    ManifestNotFound(ManifestKey),

    #[error("manifest {key} already exists with different content (root {existing}, attempted {attempted})")]
    Conflict {
        key: ManifestKey,
        existing: ObjectId,
        attempted: ObjectId,
    },

    #[error("corrupt object {id}: content hashes to {computed}")]
    Corrupt { id: ObjectId, computed: ObjectId },

    #[error("not a hive: {0}")]
    InvalidHive(String),

    #[error("transaction {0} is already closed")]
    TransactionClosed(Uuid),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("manifest error: {0}")]
    Manifest(ManifestError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HiveError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound(_) | Self::ManifestNotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<StoreError> for HiveError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::ObjectNotFound(id),
            StoreError::Corrupt { id, computed } => Self::Corrupt { id, computed },
            StoreError::Io(io) => Self::Io(io),
            other => Self::Store(other),
        }
    }
}

impl From<ManifestError> for HiveError {
    fn from(e: ManifestError) -> Self {
        match e {
            ManifestError::NotFound { key } => Self::ManifestNotFound(key),
            ManifestError::Conflict {
                key,
                existing,
                attempted,
            } => Self::Conflict {
                key,
                existing,
                attempted,
            },
            ManifestError::Io(io) => Self::Io(io),
            other => Self::Manifest(other),
        }
    }
}

impl From<serde_json::Error> for HiveError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type HiveResult<T> = Result<T, HiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_normalized() {
        let id = ObjectId::digest(b"x");
        assert!(HiveError::from(StoreError::NotFound(id)).is_not_found());
        assert!(matches!(
            HiveError::from(StoreError::Corrupt { id, computed: id }),
            HiveError::Corrupt { .. }
        ));
    }

    #[test]
    fn manifest_errors_are_normalized() {
        let key = ManifestKey::new("a", "1");
        let id = ObjectId::digest(b"x");
        assert!(HiveError::from(ManifestError::NotFound { key: key.clone() }).is_not_found());
        assert!(HiveError::from(ManifestError::Conflict {
            key,
            existing: id,
            attempted: id
        })
        .is_conflict());
    }
}
