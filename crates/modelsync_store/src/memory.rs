//! In-memory local store for testing.

use crate::batch::{WriteBatch, WriteOp};
use crate::error::{StorageError, StorageResult};
use crate::store::LocalStore;
use async_trait::async_trait;
use modelsync_model::{MutationSyncMetadata, Record, RecordId, SyncMetadataRecord};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

type Key = (String, RecordId);

#[derive(Debug, Default)]
struct Tables {
    records: BTreeMap<Key, Record>,
    metadata: HashMap<Key, MutationSyncMetadata>,
    checkpoints: HashMap<String, SyncMetadataRecord>,
}

/// An in-memory [`LocalStore`].
///
/// Every batch is checked and applied under a single write lock, so batches
/// are atomic and serializable with respect to each other.
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across tasks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    batches: AtomicU64,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of batches committed so far.
    ///
    /// Useful for asserting how many writes a code path performed.
    pub fn committed_batches(&self) -> u64 {
        self.batches.load(Ordering::SeqCst)
    }

    /// Number of records currently stored for a model.
    pub fn record_count(&self, model_name: &str) -> usize {
        self.tables
            .read()
            .records
            .keys()
            .filter(|(m, _)| m == model_name)
            .count()
    }

    /// Closes the store. Every later call fails with `Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, model_name: &str, id: &RecordId) -> StorageResult<Option<Record>> {
        self.check_open()?;
        let key = (model_name.to_string(), id.clone());
        Ok(self.tables.read().records.get(&key).cloned())
    }

    async fn query(&self, model_name: &str) -> StorageResult<Vec<Record>> {
        self.check_open()?;
        Ok(self
            .tables
            .read()
            .records
            .iter()
            .filter(|((m, _), _)| m == model_name)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn mutation_metadata(
        &self,
        model_name: &str,
        id: &RecordId,
    ) -> StorageResult<Option<MutationSyncMetadata>> {
        self.check_open()?;
        let key = (model_name.to_string(), id.clone());
        Ok(self.tables.read().metadata.get(&key).cloned())
    }

    async fn sync_metadata(&self, model_name: &str) -> StorageResult<Option<SyncMetadataRecord>> {
        self.check_open()?;
        Ok(self.tables.read().checkpoints.get(model_name).cloned())
    }

    async fn save_sync_metadata(&self, metadata: SyncMetadataRecord) -> StorageResult<()> {
        self.check_open()?;
        self.tables
            .write()
            .checkpoints
            .insert(metadata.model_name.clone(), metadata);
        Ok(())
    }

    async fn apply(&self, batch: WriteBatch) -> StorageResult<()> {
        self.check_open()?;
        let mut tables = self.tables.write();

        for op in batch.ops() {
            if let WriteOp::PutMetadata {
                metadata,
                precondition,
            } = op
            {
                let key = (metadata.model_name.clone(), metadata.record_id.clone());
                let current = tables.metadata.get(&key).map(|m| m.version);
                if !precondition.holds(current) {
                    return Err(StorageError::VersionConflict {
                        model: metadata.model_name.clone(),
                        id: metadata.record_id.clone(),
                        expected: precondition.to_string(),
                        actual: current,
                    });
                }
            }
        }

        for op in batch.into_ops() {
            match op {
                WriteOp::PutRecord { id, record } => {
                    tables
                        .records
                        .insert((record.model_name().to_string(), id), record);
                }
                WriteOp::DeleteRecord { model_name, id } => {
                    tables.records.remove(&(model_name, id));
                }
                WriteOp::PutMetadata { metadata, .. } => {
                    let key = (metadata.model_name.clone(), metadata.record_id.clone());
                    tables.metadata.insert(key, metadata);
                }
            }
        }

        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
