//! Local store trait.

use crate::batch::{Precondition, WriteBatch};
use crate::error::StorageResult;
use async_trait::async_trait;
use modelsync_model::{MutationSyncMetadata, Record, RecordId, SyncMetadataRecord};

/// Key-addressable record store holding the engine's sync metadata.
///
/// Implementations must be `Send + Sync`; the engine shares one instance
/// across every sync task. Reads see the effects of every committed batch.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Loads a record.
    async fn get(&self, model_name: &str, id: &RecordId) -> StorageResult<Option<Record>>;

    /// Loads every record of a model.
    async fn query(&self, model_name: &str) -> StorageResult<Vec<Record>>;

    /// Loads the per-record sync metadata.
    async fn mutation_metadata(
        &self,
        model_name: &str,
        id: &RecordId,
    ) -> StorageResult<Option<MutationSyncMetadata>>;

    /// Loads the per-model sync checkpoint.
    async fn sync_metadata(&self, model_name: &str) -> StorageResult<Option<SyncMetadataRecord>>;

    /// Replaces the per-model sync checkpoint.
    async fn save_sync_metadata(&self, metadata: SyncMetadataRecord) -> StorageResult<()>;

    /// Commits a batch atomically.
    ///
    /// # Errors
    ///
    /// Returns `VersionConflict` without writing anything if a precondition
    /// does not hold.
    async fn apply(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Saves a record together with its metadata.
    ///
    /// `expected_version` guards the metadata being replaced: `None` requires
    /// that the record has no metadata yet.
    async fn save(
        &self,
        id: RecordId,
        record: Record,
        metadata: MutationSyncMetadata,
        expected_version: Option<u64>,
    ) -> StorageResult<()> {
        let precondition = expected_version.map_or(Precondition::Absent, Precondition::Version);
        self.apply(
            WriteBatch::new()
                .put_record(id, record)
                .put_metadata(metadata, precondition),
        )
        .await
    }
}
