//! Reconciliation of remote records into the local store.
//!
//! Each `(model, identifier)` pair gets its own lane: a channel drained by a
//! dedicated task that exits once the channel is empty. Records sharing an
//! identifier are therefore merged one at a time in arrival order, while
//! records with different identifiers proceed concurrently.

use crate::error::{SyncError, SyncResult};
use crate::events::{
    DropReason, EventHub, EventStream, HubEvent, MutationType, ReconciliationEvent,
};
use modelsync_model::{ModelError, MutationSyncMetadata, RecordId, RemoteRecord, SchemaCatalog};
use modelsync_store::{LocalStore, Outbox, Precondition, WriteBatch};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::SendError, UnboundedReceiver, UnboundedSender};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

type LaneKey = (String, RecordId);

/// State of the live-update gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiveGate {
    /// Live records are held until the initial sync finishes.
    Buffering,
    /// Live records flow into the queue.
    Open,
    /// The queue shut down.
    Closed,
}

struct QueueInner {
    catalog: Arc<SchemaCatalog>,
    store: Arc<dyn LocalStore>,
    outbox: Option<Arc<dyn Outbox>>,
    events: Arc<EventStream<ReconciliationEvent>>,
    hub: Arc<EventHub>,
    lanes: Mutex<HashMap<LaneKey, UnboundedSender<RemoteRecord>>>,
    closed: AtomicBool,
    pending: AtomicUsize,
    idle: Notify,
    gate: watch::Sender<LiveGate>,
}

/// The merge point for downloaded and live remote records.
///
/// Cloning yields another handle to the same queue. Offers return
/// immediately; outcomes are published as [`ReconciliationEvent`]s.
/// Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct ReconciliationQueue {
    inner: Arc<QueueInner>,
}

/// Builder for [`ReconciliationQueue`].
pub struct ReconciliationQueueBuilder {
    catalog: Arc<SchemaCatalog>,
    store: Arc<dyn LocalStore>,
    outbox: Option<Arc<dyn Outbox>>,
    events: Option<Arc<EventStream<ReconciliationEvent>>>,
    hub: Option<Arc<EventHub>>,
}

impl ReconciliationQueueBuilder {
    /// Drops remote records that have pending local mutations in this outbox.
    pub fn outbox(mut self, outbox: Arc<dyn Outbox>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    /// Publishes reconciliation outcomes on an existing stream.
    pub fn events(mut self, events: Arc<EventStream<ReconciliationEvent>>) -> Self {
        self.events = Some(events);
        self
    }

    /// Publishes `SyncReceived` notifications on an existing hub.
    pub fn hub(mut self, hub: Arc<EventHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Builds the queue.
    pub fn build(self) -> ReconciliationQueue {
        let (gate, _) = watch::channel(LiveGate::Buffering);
        ReconciliationQueue {
            inner: Arc::new(QueueInner {
                catalog: self.catalog,
                store: self.store,
                outbox: self.outbox,
                events: self.events.unwrap_or_default(),
                hub: self.hub.unwrap_or_default(),
                lanes: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
                gate,
            }),
        }
    }
}

impl ReconciliationQueue {
    /// Creates a queue with its own event streams and no outbox.
    pub fn new(catalog: Arc<SchemaCatalog>, store: Arc<dyn LocalStore>) -> Self {
        Self::builder(catalog, store).build()
    }

    /// Starts building a queue.
    pub fn builder(
        catalog: Arc<SchemaCatalog>,
        store: Arc<dyn LocalStore>,
    ) -> ReconciliationQueueBuilder {
        ReconciliationQueueBuilder {
            catalog,
            store,
            outbox: None,
            events: None,
            hub: None,
        }
    }

    /// Subscribes to reconciliation outcomes.
    pub fn subscribe(&self) -> UnboundedReceiver<ReconciliationEvent> {
        self.inner.events.subscribe()
    }

    /// The notification hub this queue publishes to.
    pub fn hub(&self) -> &Arc<EventHub> {
        &self.inner.hub
    }

    /// Number of offered records not yet reconciled.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Returns true once [`shutdown`](Self::shutdown) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Enqueues records of one model for reconciliation.
    ///
    /// Records that cannot be identified are dropped right away with
    /// [`DropReason::InvalidRecord`].
    ///
    /// # Errors
    ///
    /// Returns `QueueClosed` after shutdown, and `Schema` for an unknown
    /// model name. Nothing is enqueued in either case.
    pub fn offer(&self, records: Vec<RemoteRecord>, model_name: &str) -> SyncResult<()> {
        if self.is_closed() {
            return Err(SyncError::QueueClosed);
        }
        let schema = self.inner.catalog.get(model_name)?;

        for remote in records {
            let id = if remote.model_name() == model_name {
                remote.record.identifier(schema)
            } else {
                Err(ModelError::invalid_document(format!(
                    "record of model {} offered as {model_name}",
                    remote.model_name()
                )))
            };

            match id {
                Ok(id) => self.dispatch((model_name.to_string(), id), remote),
                Err(e) => {
                    warn!(model = %model_name, error = %e, "dropping unidentifiable record");
                    self.inner.events.emit(ReconciliationEvent::Dropped {
                        model_name: model_name.to_string(),
                        record_id: None,
                        reason: DropReason::InvalidRecord(e),
                    });
                }
            }
        }
        Ok(())
    }

    fn dispatch(&self, key: LaneKey, remote: RemoteRecord) {
        self.inner.pending.fetch_add(1, Ordering::SeqCst);

        let mut lanes = self.inner.lanes.lock();
        let remote = match lanes.get(&key) {
            Some(tx) => match tx.send(remote) {
                Ok(()) => return,
                Err(SendError(remote)) => remote,
            },
            None => remote,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive until the lane task below drops it.
        let _ = tx.send(remote);
        lanes.insert(key.clone(), tx);
        drop(lanes);

        tokio::spawn(run_lane(Arc::clone(&self.inner), key, rx));
    }

    /// Resolves once every offered record has been reconciled.
    pub async fn drained(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stops accepting offers and waits for in-flight records.
    ///
    /// Buffered live records that were never released are discarded.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.gate.send_replace(LiveGate::Closed);
        self.drained().await;
        debug!("reconciliation queue shut down");
    }

    /// Buffers a model's live updates until [`start_live`](Self::start_live).
    pub fn attach_live(
        &self,
        model_name: impl Into<String>,
        mut updates: UnboundedReceiver<RemoteRecord>,
    ) {
        let queue = self.clone();
        let model_name = model_name.into();
        let mut gate = self.inner.gate.subscribe();

        tokio::spawn(async move {
            let released = wait_for_gate(&mut gate, |g| *g != LiveGate::Buffering).await;
            if released != Some(LiveGate::Open) {
                return;
            }
            debug!(model = %model_name, "live updates flowing");

            loop {
                tokio::select! {
                    next = updates.recv() => match next {
                        Some(remote) => {
                            if let Err(e) = queue.offer(vec![remote], &model_name) {
                                debug!(model = %model_name, error = %e, "live update rejected");
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = wait_for_gate(&mut gate, |g| *g == LiveGate::Closed) => break,
                }
            }
        });
    }

    /// Releases buffered live updates into the queue.
    pub fn start_live(&self) {
        let opened = self.inner.gate.send_if_modified(|g| {
            if *g == LiveGate::Buffering {
                *g = LiveGate::Open;
                true
            } else {
                false
            }
        });
        if opened {
            info!("releasing buffered live updates");
        }
    }
}

async fn wait_for_gate(
    gate: &mut watch::Receiver<LiveGate>,
    condition: impl FnMut(&LiveGate) -> bool,
) -> Option<LiveGate> {
    gate.wait_for(condition).await.ok().map(|g| *g)
}

async fn run_lane(inner: Arc<QueueInner>, key: LaneKey, mut rx: UnboundedReceiver<RemoteRecord>) {
    loop {
        let remote = {
            let mut lanes = inner.lanes.lock();
            match rx.try_recv() {
                Ok(remote) => remote,
                Err(_) => {
                    lanes.remove(&key);
                    return;
                }
            }
        };

        let (model_name, id) = &key;
        let event = match inner.merge(model_name, id, &remote).await {
            Ok(mutation_type) => ReconciliationEvent::Applied {
                record_id: id.clone(),
                record: remote,
                mutation_type,
            },
            Err(reason) => ReconciliationEvent::Dropped {
                model_name: model_name.clone(),
                record_id: Some(id.clone()),
                reason,
            },
        };
        inner.publish(event);

        if inner.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            inner.idle.notify_waiters();
        }
    }
}

impl QueueInner {
    /// Compare-and-overwrite by version.
    async fn merge(
        &self,
        model_name: &str,
        id: &RecordId,
        remote: &RemoteRecord,
    ) -> Result<MutationType, DropReason> {
        if let Some(outbox) = &self.outbox {
            if outbox
                .has_pending(model_name, id)
                .await
                .map_err(DropReason::Storage)?
            {
                return Err(DropReason::PendingLocalMutation);
            }
        }

        let existing = self
            .store
            .mutation_metadata(model_name, id)
            .await
            .map_err(DropReason::Storage)?;

        let precondition = match &existing {
            Some(meta) if !meta.is_superseded_by(remote.version) => {
                return Err(DropReason::StaleVersion)
            }
            Some(meta) => Precondition::Version(meta.version),
            None => Precondition::Absent,
        };

        let mutation_type = if remote.deleted {
            MutationType::Delete
        } else if existing.is_some() {
            MutationType::Update
        } else {
            MutationType::Create
        };

        let batch = if remote.deleted {
            WriteBatch::new().delete_record(model_name, id.clone())
        } else {
            WriteBatch::new().put_record(id.clone(), remote.record.clone())
        };
        let metadata = MutationSyncMetadata {
            model_name: model_name.to_string(),
            record_id: id.clone(),
            version: remote.version,
            deleted: remote.deleted,
            last_changed_at: remote.last_changed_at,
        };

        self.store
            .apply(batch.put_metadata(metadata, precondition))
            .await
            .map_err(DropReason::Storage)?;
        Ok(mutation_type)
    }

    fn publish(&self, event: ReconciliationEvent) {
        match &event {
            ReconciliationEvent::Applied {
                record_id,
                record,
                mutation_type,
            } => {
                debug!(
                    model = %record.model_name(),
                    id = %record_id,
                    version = record.version,
                    mutation = %mutation_type,
                    "record applied"
                );
                self.hub.emit(HubEvent::SyncReceived {
                    model_name: record.model_name().to_string(),
                    record_id: record_id.clone(),
                    mutation_type: *mutation_type,
                    version: record.version,
                });
            }
            ReconciliationEvent::Dropped {
                model_name,
                record_id,
                reason: reason @ DropReason::Storage(_),
            } => {
                warn!(model = %model_name, id = ?record_id, reason = %reason, "record dropped");
            }
            ReconciliationEvent::Dropped {
                model_name,
                record_id,
                reason,
            } => {
                debug!(model = %model_name, id = ?record_id, reason = %reason, "record dropped");
            }
        }
        self.events.emit(event);
    }
}
