//! Store wrapper that injects write failures.

use async_trait::async_trait;
use modelsync_model::{MutationSyncMetadata, Record, RecordId, SyncMetadataRecord};
use modelsync_store::{LocalStore, StorageError, StorageResult, WriteBatch, WriteOp};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Wraps a [`LocalStore`] and fails selected writes with
/// [`StorageError::Backend`].
///
/// Reads always pass through. A failed batch writes nothing.
pub struct FlakyStore<S> {
    inner: S,
    failing: RwLock<HashSet<(String, RecordId)>>,
    fail_all_writes: AtomicBool,
    fail_checkpoints: AtomicBool,
    rejected: AtomicU64,
}

impl<S: LocalStore> FlakyStore<S> {
    /// Wraps `inner` with no failures configured.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing: RwLock::new(HashSet::new()),
            fail_all_writes: AtomicBool::new(false),
            fail_checkpoints: AtomicBool::new(false),
            rejected: AtomicU64::new(0),
        }
    }

    /// Fails every batch touching this record.
    pub fn fail_writes_for(&self, model_name: impl Into<String>, id: RecordId) {
        self.failing.write().insert((model_name.into(), id));
    }

    /// Fails every batch while set.
    pub fn set_fail_all_writes(&self, fail: bool) {
        self.fail_all_writes.store(fail, Ordering::SeqCst);
    }

    /// Fails every checkpoint write while set.
    pub fn set_fail_checkpoints(&self, fail: bool) {
        self.fail_checkpoints.store(fail, Ordering::SeqCst);
    }

    /// Number of writes rejected so far.
    pub fn rejected_writes(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn should_fail(&self, batch: &WriteBatch) -> bool {
        if self.fail_all_writes.load(Ordering::SeqCst) {
            return true;
        }
        let failing = self.failing.read();
        batch.ops().iter().any(|op| {
            let key = match op {
                WriteOp::PutRecord { id, record } => (record.model_name().to_string(), id.clone()),
                WriteOp::DeleteRecord { model_name, id } => (model_name.clone(), id.clone()),
                WriteOp::PutMetadata { metadata, .. } => {
                    (metadata.model_name.clone(), metadata.record_id.clone())
                }
            };
            failing.contains(&key)
        })
    }

    fn reject(&self, what: &str) -> StorageError {
        self.rejected.fetch_add(1, Ordering::SeqCst);
        StorageError::backend(format!("injected failure writing {what}"))
    }
}

#[async_trait]
impl<S: LocalStore> LocalStore for FlakyStore<S> {
    async fn get(&self, model_name: &str, id: &RecordId) -> StorageResult<Option<Record>> {
        self.inner.get(model_name, id).await
    }

    async fn query(&self, model_name: &str) -> StorageResult<Vec<Record>> {
        self.inner.query(model_name).await
    }

    async fn mutation_metadata(
        &self,
        model_name: &str,
        id: &RecordId,
    ) -> StorageResult<Option<MutationSyncMetadata>> {
        self.inner.mutation_metadata(model_name, id).await
    }

    async fn sync_metadata(&self, model_name: &str) -> StorageResult<Option<SyncMetadataRecord>> {
        self.inner.sync_metadata(model_name).await
    }

    async fn save_sync_metadata(&self, metadata: SyncMetadataRecord) -> StorageResult<()> {
        if self.fail_checkpoints.load(Ordering::SeqCst) {
            return Err(self.reject("sync metadata"));
        }
        self.inner.save_sync_metadata(metadata).await
    }

    async fn apply(&self, batch: WriteBatch) -> StorageResult<()> {
        if self.should_fail(&batch) {
            return Err(self.reject("batch"));
        }
        self.inner.apply(batch).await
    }
}
