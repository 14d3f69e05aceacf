//! Event streams and the events carried on them.
//!
//! Every stream is append-only and multi-subscriber. Subscribers receive the
//! events emitted after they subscribed, in emission order. Closing a stream
//! ends every subscriber's receiver once it has drained.

use crate::error::SyncError;
use modelsync_model::{ModelError, RecordId, RemoteRecord};
use modelsync_store::StorageError;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// A multi-subscriber event stream.
pub struct EventStream<T> {
    subscribers: RwLock<Vec<UnboundedSender<T>>>,
    closed: AtomicBool,
}

impl<T: Clone> EventStream<T> {
    /// Creates an open stream with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Subscribes to the stream.
    ///
    /// Subscribing to a closed stream yields a receiver that is already at
    /// its end.
    pub fn subscribe(&self) -> UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.write();
        if !self.closed.load(Ordering::SeqCst) {
            subscribers.push(tx);
        }
        rx
    }

    /// Emits an event to every live subscriber.
    ///
    /// Subscribers whose receiver was dropped are removed.
    pub fn emit(&self, event: T) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Closes the stream. Later emits are discarded.
    pub fn close(&self) {
        let mut subscribers = self.subscribers.write();
        self.closed.store(true, Ordering::SeqCst);
        subscribers.clear();
    }

    /// Returns true if the stream was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl<T: Clone> Default for EventStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("subscribers", &self.subscribers.read().len())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Process-wide notification stream consumed by application code.
pub type EventHub = EventStream<HubEvent>;

/// Whether a model downloads everything or only changes since its checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncKind {
    /// Download every record, ignoring the checkpoint.
    Full,
    /// Download records changed since the checkpoint.
    Delta,
}

/// Events emitted by a per-model sync operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSyncEvent {
    /// The operation decided its sync kind and is about to page.
    Started {
        /// Model name.
        model_name: String,
        /// Full or delta.
        kind: SyncKind,
    },
    /// A record was handed to the reconciliation queue.
    Enqueued {
        /// Model name.
        model_name: String,
        /// The enqueued record.
        record: RemoteRecord,
    },
    /// The operation ended. `error` is `None` on success and on cancellation.
    Finished {
        /// Model name.
        model_name: String,
        /// Failure, if any.
        error: Option<SyncError>,
    },
}

impl ModelSyncEvent {
    /// Model this event belongs to.
    pub fn model_name(&self) -> &str {
        match self {
            ModelSyncEvent::Started { model_name, .. }
            | ModelSyncEvent::Enqueued { model_name, .. }
            | ModelSyncEvent::Finished { model_name, .. } => model_name,
        }
    }
}

/// Kind of change an applied record made locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationType {
    /// First time the record was seen.
    Create,
    /// A newer version of a known record.
    Update,
    /// A tombstone.
    Delete,
}

impl fmt::Display for MutationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MutationType::Create => "create",
            MutationType::Update => "update",
            MutationType::Delete => "delete",
        })
    }
}

/// Why a record was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The local version is equal or newer.
    StaleVersion,
    /// A local change to the record has not reached the server yet.
    PendingLocalMutation,
    /// Reading or writing the store failed.
    Storage(StorageError),
    /// The record could not be identified.
    InvalidRecord(ModelError),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::StaleVersion => write!(f, "stale version"),
            DropReason::PendingLocalMutation => write!(f, "pending local mutation"),
            DropReason::Storage(e) => write!(f, "storage failure: {e}"),
            DropReason::InvalidRecord(e) => write!(f, "invalid record: {e}"),
        }
    }
}

/// Outcome of reconciling one record.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconciliationEvent {
    /// The record was committed to the store.
    Applied {
        /// Record identifier.
        record_id: RecordId,
        /// The committed delivery.
        record: RemoteRecord,
        /// Kind of local change.
        mutation_type: MutationType,
    },
    /// The record was not committed. The store was not changed.
    Dropped {
        /// Model name.
        model_name: String,
        /// Record identifier, if it could be computed.
        record_id: Option<RecordId>,
        /// Why the record was dropped.
        reason: DropReason,
    },
}

impl ReconciliationEvent {
    /// Model this event belongs to.
    pub fn model_name(&self) -> &str {
        match self {
            ReconciliationEvent::Applied { record, .. } => record.model_name(),
            ReconciliationEvent::Dropped { model_name, .. } => model_name,
        }
    }
}

/// Payload of the "model synced" notification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelSyncedEvent {
    /// Model name.
    pub model_name: String,
    /// The run was a full sync.
    pub is_full_sync: bool,
    /// The run was a delta sync.
    pub is_delta_sync: bool,
    /// Records created locally.
    pub added: u64,
    /// Records updated locally.
    pub updated: u64,
    /// Records deleted locally.
    pub deleted: u64,
}

/// Notifications published to application code.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// Scheduling began for these models.
    SyncQueriesStarted {
        /// Models in scheduling order.
        models: Vec<String>,
    },
    /// Every record of one model's sync has been reconciled.
    ModelSynced(ModelSyncedEvent),
    /// Every syncable model has fired `ModelSynced`.
    SyncQueriesReady,
    /// A remote record was committed locally.
    SyncReceived {
        /// Model name.
        model_name: String,
        /// Record identifier.
        record_id: RecordId,
        /// Kind of local change.
        mutation_type: MutationType,
        /// Committed version.
        version: u64,
    },
    /// Initial sync is done and live updates are flowing.
    Ready,
}
