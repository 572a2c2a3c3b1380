use hive_types::ObjectId;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// Stored content does not hash to its id (data corruption).
    #[error("corrupt object {id}: content hashes to {computed}")]
    Corrupt { id: ObjectId, computed: ObjectId },

    /// A tree could not be built or decoded.
    #[error("invalid tree: {0}")]
    InvalidTree(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
