//! Error types for local store operations.

use modelsync_model::{ModelError, RecordId};
use thiserror::Error;

/// Result type for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading or writing the local store.
///
/// Cloneable so a failure can be carried inside reconciliation events.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The underlying storage engine failed.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A batch precondition on a record's metadata did not hold.
    #[error("version conflict on {model}/{id}: expected {expected}, found {actual:?}")]
    VersionConflict {
        /// Model name.
        model: String,
        /// Record identifier.
        id: RecordId,
        /// Expected state, as written in the precondition.
        expected: String,
        /// Version found in the store, if any.
        actual: Option<u64>,
    },

    /// The store is closed.
    #[error("store is closed")]
    Closed,

    /// A stored record could not be interpreted.
    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

impl StorageError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}
