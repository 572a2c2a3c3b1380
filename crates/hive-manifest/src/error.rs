//! Error types for manifest operations.

use hive_types::{ManifestKey, ObjectId};
use thiserror::Error;

/// Errors that can occur during manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest was not found.
    #[error("manifest not found: {key}")]
    NotFound { key: ManifestKey },

    /// The key is already bound to a different root tree.
    #[error("manifest {key} already exists with root {existing} (attempted {attempted})")]
    Conflict {
        key: ManifestKey,
        existing: ObjectId,
        attempted: ObjectId,
    },

    /// The manifest name or tag is invalid.
    #[error("invalid manifest {field} {value:?}: {reason}")]
    InvalidName {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error during file-based manifest operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for manifest operations.
pub type Result<T> = std::result::Result<T, ManifestError>;
