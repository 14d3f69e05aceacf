//! Persisted sync bookkeeping.

use crate::record::RecordId;
use serde::{Deserialize, Serialize};

/// Per-model sync checkpoint.
///
/// Absence of a checkpoint means the model was never fully synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadataRecord {
    /// Model name.
    pub model_name: String,
    /// Server start time of the last successful sync, in epoch millis.
    pub last_sync_millis: Option<i64>,
    /// Serialized filter used by the last successful sync.
    pub sync_predicate: Option<String>,
}

impl SyncMetadataRecord {
    /// Creates a checkpoint for a model.
    pub fn new(model_name: impl Into<String>, last_sync_millis: i64) -> Self {
        Self {
            model_name: model_name.into(),
            last_sync_millis: Some(last_sync_millis),
            sync_predicate: None,
        }
    }

    /// Sets the filter the checkpoint was taken with.
    #[must_use]
    pub fn with_predicate(mut self, predicate: Option<String>) -> Self {
        self.sync_predicate = predicate;
        self
    }
}

/// Per-record version and tombstone state.
///
/// Exactly one of these exists per `(model_name, record_id)`. A delete sets
/// `deleted` and keeps the row so stale re-deliveries are still recognized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationSyncMetadata {
    /// Model name.
    pub model_name: String,
    /// Record identifier.
    pub record_id: RecordId,
    /// Last reconciled version.
    pub version: u64,
    /// Whether the record is a tombstone.
    pub deleted: bool,
    /// Server time of the last change, in epoch millis.
    pub last_changed_at: i64,
}

impl MutationSyncMetadata {
    /// Returns true if an incoming delivery of `version` should replace this one.
    pub fn is_superseded_by(&self, version: u64) -> bool {
        version > self.version
    }
}
