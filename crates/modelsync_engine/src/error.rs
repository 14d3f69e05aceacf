//! Error types for the sync engine.

use modelsync_model::ModelError;
use modelsync_store::StorageError;
use std::fmt;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Cloneable so a failure can be carried in `finished` events and in the
/// aggregate result at the same time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Network or transport error, including request timeouts.
    #[error("network error: {message}")]
    Network {
        /// Error message.
        message: String,
        /// Whether the request may succeed if repeated.
        retryable: bool,
    },

    /// The remote service refused access to a model.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// Local store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Unknown model name or malformed record.
    #[error("schema error: {0}")]
    Schema(#[from] ModelError),

    /// The operation was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// The reconciliation queue no longer accepts records.
    #[error("reconciliation queue is closed")]
    QueueClosed,

    /// Invalid engine state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// A sync task ended without reporting a result.
    #[error("internal error: {0}")]
    Internal(String),

    /// One or more models failed to sync.
    #[error("sync failed: {}", join_failures(.failures))]
    SyncFailed {
        /// Every per-model failure, in scheduling order.
        failures: Vec<ModelFailure>,
    },
}

/// A failure of one model's sync operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFailure {
    /// Model name.
    pub model_name: String,
    /// Error the operation finished with.
    pub error: SyncError,
}

impl fmt::Display for ModelFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.model_name, self.error)
    }
}

fn join_failures(failures: &[ModelFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SyncError {
    /// Creates a retryable network error.
    pub fn network_retryable(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable network error.
    pub fn network_fatal(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates an authorization error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Authorization(message.into())
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Returns true if this is an authorization failure.
    ///
    /// Authorization failures do not fail the aggregate sync result.
    pub fn is_authorization(&self) -> bool {
        matches!(self, SyncError::Authorization(_))
    }
}
