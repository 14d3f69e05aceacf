//! Transactional write batches.

use modelsync_model::{MutationSyncMetadata, Record, RecordId};
use std::fmt;

/// Condition on a record's existing metadata that must hold for a batch to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precondition {
    /// No condition.
    #[default]
    Any,
    /// No metadata exists yet.
    Absent,
    /// Metadata exists with exactly this version.
    Version(u64),
}

impl Precondition {
    /// Checks the condition against the currently stored version.
    pub fn holds(&self, current: Option<u64>) -> bool {
        match (self, current) {
            (Precondition::Any, _) => true,
            (Precondition::Absent, None) => true,
            (Precondition::Version(expected), Some(actual)) => *expected == actual,
            _ => false,
        }
    }
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::Any => write!(f, "any"),
            Precondition::Absent => write!(f, "absent"),
            Precondition::Version(v) => write!(f, "version {v}"),
        }
    }
}

/// A single write within a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert or replace a record.
    PutRecord {
        /// Record identifier.
        id: RecordId,
        /// Record data. Its model name addresses the table.
        record: Record,
    },
    /// Remove a record if present.
    DeleteRecord {
        /// Model name.
        model_name: String,
        /// Record identifier.
        id: RecordId,
    },
    /// Insert or replace per-record sync metadata.
    PutMetadata {
        /// New metadata.
        metadata: MutationSyncMetadata,
        /// Condition on the metadata being replaced.
        precondition: Precondition,
    },
}

/// An ordered set of writes committed atomically.
///
/// Either every precondition holds and every write is applied, or nothing is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record write.
    #[must_use]
    pub fn put_record(mut self, id: RecordId, record: Record) -> Self {
        self.ops.push(WriteOp::PutRecord { id, record });
        self
    }

    /// Adds a record removal.
    #[must_use]
    pub fn delete_record(mut self, model_name: impl Into<String>, id: RecordId) -> Self {
        self.ops.push(WriteOp::DeleteRecord {
            model_name: model_name.into(),
            id,
        });
        self
    }

    /// Adds a metadata write guarded by a precondition.
    #[must_use]
    pub fn put_metadata(mut self, metadata: MutationSyncMetadata, precondition: Precondition) -> Self {
        self.ops.push(WriteOp::PutMetadata {
            metadata,
            precondition,
        });
        self
    }

    /// The writes in commit order.
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consumes the batch, returning its writes.
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// Returns true if the batch has no writes.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of writes in the batch.
    pub fn len(&self) -> usize {
        self.ops.len()
    }
}
