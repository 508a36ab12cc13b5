//! Error types for storage operations

use thiserror::Error;

use crate::{MetricKind, SampleError};

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// No record of the requested kind exists for the id
    #[error("{kind} metric {id} not found")]
    NotFound { id: String, kind: MetricKind },

    /// The sample cannot be stored as given
    #[error("invalid metric: {0}")]
    Validation(#[from] SampleError),

    /// Database connection failed (after all retry attempts)
    #[error("failed to connect to storage backend: {0}")]
    ConnectionFailed(String),

    /// Database query failed
    #[error("storage query failed: {0}")]
    QueryFailed(String),

    /// Snapshot (de)serialization error
    #[error("snapshot serialization error: {0}")]
    Serialization(String),

    /// I/O error (snapshot file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn not_found(id: &str, kind: MetricKind) -> Self {
        StorageError::NotFound {
            id: id.to_string(),
            kind,
        }
    }

    /// A write of `kind` hit a record of the other kind under the same id
    pub fn kind_conflict(id: &str, kind: MetricKind) -> Self {
        let existing = match kind {
            MetricKind::Gauge => MetricKind::Counter,
            MetricKind::Counter => MetricKind::Gauge,
        };

        StorageError::Validation(SampleError::KindConflict {
            id: id.to_string(),
            existing,
        })
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(feature = "storage-sql")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StorageError::Io(io_err),
            sqlx::Error::RowNotFound => StorageError::QueryFailed("no rows found".to_string()),
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}
