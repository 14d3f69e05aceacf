//! Pending local mutation lookup.

use crate::error::StorageResult;
use async_trait::async_trait;
use modelsync_model::RecordId;
use parking_lot::RwLock;
use std::collections::HashSet;

/// Read side of the outgoing local mutation queue.
///
/// Reconciliation asks the outbox whether a record still has a local change
/// the server has not acknowledged. Such a record must not be overwritten by
/// a remote delivery.
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Returns true if a local mutation for the record is still pending.
    async fn has_pending(&self, model_name: &str, id: &RecordId) -> StorageResult<bool>;
}

/// In-memory set of pending mutations.
#[derive(Debug, Default)]
pub struct MemoryOutbox {
    pending: RwLock<HashSet<(String, RecordId)>>,
}

impl MemoryOutbox {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a pending local mutation.
    pub fn enqueue(&self, model_name: impl Into<String>, id: RecordId) {
        self.pending.write().insert((model_name.into(), id));
    }

    /// Marks a mutation as acknowledged by the server.
    pub fn acknowledge(&self, model_name: &str, id: &RecordId) {
        self.pending
            .write()
            .remove(&(model_name.to_string(), id.clone()));
    }

    /// Number of pending mutations.
    pub fn len(&self) -> usize {
        self.pending.read().len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.read().is_empty()
    }
}

#[async_trait]
impl Outbox for MemoryOutbox {
    async fn has_pending(&self, model_name: &str, id: &RecordId) -> StorageResult<bool> {
        Ok(self
            .pending
            .read()
            .contains(&(model_name.to_string(), id.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pending_until_acknowledged() {
        let outbox = MemoryOutbox::new();
        let id = RecordId::new("p1");
        assert!(!outbox.has_pending("Post", &id).await.unwrap());

        outbox.enqueue("Post", id.clone());
        assert!(outbox.has_pending("Post", &id).await.unwrap());
        assert!(!outbox.has_pending("Comment", &id).await.unwrap());
        assert_eq!(outbox.len(), 1);

        outbox.acknowledge("Post", &id);
        assert!(!outbox.has_pending("Post", &id).await.unwrap());
        assert!(outbox.is_empty());
    }
}
