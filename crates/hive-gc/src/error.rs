use std::time::Duration;

use hive_core::HiveError;
use hive_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GcError {
    #[error("hive not registered: {0}")]
    HiveNotFound(String),

    #[error("hive already registered: {0}")]
    DuplicateHive(String),

    #[error("node {node} unreachable: {reason}")]
    Unreachable { node: String, reason: String },

    #[error("node {node} did not answer within {timeout:?}")]
    Timeout { node: String, timeout: Duration },

    #[error("invalid schedule {expression:?}: {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("hive error: {0}")]
    Hive(#[from] HiveError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio::task::JoinError> for GcError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}

pub type GcResult<T> = Result<T, GcError>;
