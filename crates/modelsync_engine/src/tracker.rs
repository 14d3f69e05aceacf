//! Sync-completion accounting.
//!
//! [`CompletionState`] is a pure state machine over the two event streams;
//! [`SyncCompletionTracker`] drives it from the streams and publishes its
//! output on the notification hub.

use crate::events::{
    EventHub, HubEvent, ModelSyncEvent, ModelSyncedEvent, MutationType, ReconciliationEvent,
    SyncKind,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
struct ModelProgress {
    kind: Option<SyncKind>,
    enqueued: u64,
    reconciled: u64,
    finished: bool,
    failed: bool,
    dispatched: bool,
    added: u64,
    updated: u64,
    deleted: u64,
}

impl ModelProgress {
    fn complete(&self) -> bool {
        self.finished && !self.dispatched && self.reconciled >= self.enqueued
    }
}

/// Per-model completion counters and the global ready flag.
#[derive(Debug, Clone)]
pub struct CompletionState {
    models: BTreeMap<String, ModelProgress>,
    ready: bool,
}

impl CompletionState {
    /// Tracks the given models. Events for other models are ignored.
    pub fn new<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            models: models
                .into_iter()
                .map(|m| (m.into(), ModelProgress::default()))
                .collect(),
            ready: false,
        }
    }

    /// Applies a sync operation event, returning the notifications it causes.
    pub fn on_sync_event(&mut self, event: &ModelSyncEvent) -> Vec<HubEvent> {
        let model_name = event.model_name();
        let Some(progress) = self.models.get_mut(model_name) else {
            return Vec::new();
        };

        match event {
            ModelSyncEvent::Started { kind, .. } => {
                progress.kind = Some(*kind);
            }
            ModelSyncEvent::Enqueued { .. } => {
                if !progress.dispatched {
                    progress.enqueued += 1;
                }
            }
            ModelSyncEvent::Finished { error, .. } => {
                progress.finished = true;
                match error {
                    Some(e) if !e.is_authorization() => {
                        progress.failed = true;
                        warn!(model = %model_name, error = %e, "model finished with a fatal error");
                    }
                    _ => {}
                }
            }
        }
        self.try_dispatch(model_name)
    }

    /// Applies a reconciliation outcome, returning the notifications it causes.
    ///
    /// Outcomes arriving after a model was dispatched are live updates and
    /// are not counted.
    pub fn on_reconciliation_event(&mut self, event: &ReconciliationEvent) -> Vec<HubEvent> {
        let model_name = event.model_name();
        let Some(progress) = self.models.get_mut(model_name) else {
            return Vec::new();
        };
        if progress.dispatched {
            return Vec::new();
        }

        progress.reconciled += 1;
        if let ReconciliationEvent::Applied { mutation_type, .. } = event {
            match mutation_type {
                MutationType::Create => progress.added += 1,
                MutationType::Update => progress.updated += 1,
                MutationType::Delete => progress.deleted += 1,
            }
        }
        self.try_dispatch(model_name)
    }

    /// Emits `SyncQueriesReady` if nothing is tracked.
    pub fn start(&mut self) -> Vec<HubEvent> {
        self.check_ready().into_iter().collect()
    }

    fn try_dispatch(&mut self, model_name: &str) -> Vec<HubEvent> {
        let mut out = Vec::new();
        if let Some(progress) = self.models.get_mut(model_name) {
            if progress.complete() {
                progress.dispatched = true;
                out.push(HubEvent::ModelSynced(ModelSyncedEvent {
                    model_name: model_name.to_string(),
                    is_full_sync: progress.kind == Some(SyncKind::Full),
                    is_delta_sync: progress.kind == Some(SyncKind::Delta),
                    added: progress.added,
                    updated: progress.updated,
                    deleted: progress.deleted,
                }));
            }
        }
        out.extend(self.check_ready());
        out
    }

    fn check_ready(&mut self) -> Option<HubEvent> {
        if !self.ready && self.models.values().all(|p| p.dispatched) {
            self.ready = true;
            Some(HubEvent::SyncQueriesReady)
        } else {
            None
        }
    }

    /// Returns true once `SyncQueriesReady` was produced.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Returns true if the model produced `ModelSynced`.
    pub fn is_dispatched(&self, model_name: &str) -> bool {
        self.models.get(model_name).is_some_and(|p| p.dispatched)
    }

    /// Returns true if no finished model is still waiting on reconciliation.
    ///
    /// A model whose run failed never waits: its remaining records may have
    /// been discarded with the queue.
    pub fn is_settled(&self) -> bool {
        self.models
            .values()
            .all(|p| !p.finished || p.failed || p.dispatched)
    }
}

/// Drives a [`CompletionState`] from live event streams.
pub struct SyncCompletionTracker {
    state: CompletionState,
    hub: Arc<EventHub>,
}

impl SyncCompletionTracker {
    /// Creates a tracker for the given models.
    pub fn new<I, S>(models: I, hub: Arc<EventHub>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: CompletionState::new(models),
            hub,
        }
    }

    /// Runs the tracker on its own task.
    pub fn spawn(
        self,
        sync_events: UnboundedReceiver<ModelSyncEvent>,
        reconciliation_events: UnboundedReceiver<ReconciliationEvent>,
    ) -> JoinHandle<CompletionState> {
        tokio::spawn(self.run(sync_events, reconciliation_events))
    }

    /// Consumes both streams until every model has been dispatched.
    ///
    /// Also returns once the sync stream has closed and no finished model is
    /// still waiting, or once both streams have closed.
    pub async fn run(
        mut self,
        mut sync_events: UnboundedReceiver<ModelSyncEvent>,
        mut reconciliation_events: UnboundedReceiver<ReconciliationEvent>,
    ) -> CompletionState {
        let out = self.state.start();
        self.publish(out);

        let mut sync_open = true;
        let mut reconciliation_open = true;

        while !self.state.is_ready() {
            if !sync_open && (self.state.is_settled() || !reconciliation_open) {
                break;
            }

            tokio::select! {
                event = sync_events.recv(), if sync_open => match event {
                    Some(event) => {
                        let out = self.state.on_sync_event(&event);
                        self.publish(out);
                    }
                    None => sync_open = false,
                },
                event = reconciliation_events.recv(), if reconciliation_open => match event {
                    Some(event) => {
                        let out = self.state.on_reconciliation_event(&event);
                        self.publish(out);
                    }
                    None => reconciliation_open = false,
                },
            }
        }

        debug!(ready = self.state.is_ready(), "completion tracker stopped");
        self.state
    }

    fn publish(&self, events: Vec<HubEvent>) {
        for event in events {
            match &event {
                HubEvent::ModelSynced(synced) => info!(
                    model = %synced.model_name,
                    added = synced.added,
                    updated = synced.updated,
                    deleted = synced.deleted,
                    "model synced"
                ),
                HubEvent::SyncQueriesReady => info!("sync queries ready"),
                _ => {}
            }
            self.hub.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::events::{DropReason, EventStream};
    use modelsync_model::{Record, RecordId, RemoteRecord};

    fn started(model: &str, kind: SyncKind) -> ModelSyncEvent {
        ModelSyncEvent::Started {
            model_name: model.into(),
            kind,
        }
    }

    fn enqueued(model: &str, id: &str) -> ModelSyncEvent {
        ModelSyncEvent::Enqueued {
            model_name: model.into(),
            record: RemoteRecord::new(Record::with_id(model, id), 1, 0),
        }
    }

    fn finished(model: &str, error: Option<SyncError>) -> ModelSyncEvent {
        ModelSyncEvent::Finished {
            model_name: model.into(),
            error,
        }
    }

    fn applied(model: &str, id: &str, mutation_type: MutationType) -> ReconciliationEvent {
        ReconciliationEvent::Applied {
            record_id: RecordId::new(id),
            record: RemoteRecord::new(Record::with_id(model, id), 1, 0),
            mutation_type,
        }
    }

    fn dropped(model: &str) -> ReconciliationEvent {
        ReconciliationEvent::Dropped {
            model_name: model.into(),
            record_id: None,
            reason: DropReason::StaleVersion,
        }
    }

    #[test]
    fn zero_records_dispatch_on_finish() {
        let mut state = CompletionState::new(["Post"]);
        assert!(state.on_sync_event(&started("Post", SyncKind::Full)).is_empty());

        let out = state.on_sync_event(&finished("Post", None));
        assert_eq!(
            out,
            vec![
                HubEvent::ModelSynced(ModelSyncedEvent {
                    model_name: "Post".into(),
                    is_full_sync: true,
                    ..Default::default()
                }),
                HubEvent::SyncQueriesReady,
            ]
        );
    }

    #[test]
    fn waits_for_every_enqueued_record() {
        let mut state = CompletionState::new(["Post"]);
        state.on_sync_event(&started("Post", SyncKind::Delta));
        state.on_sync_event(&enqueued("Post", "a"));
        state.on_sync_event(&enqueued("Post", "b"));
        state.on_sync_event(&enqueued("Post", "c"));
        assert!(state.on_sync_event(&finished("Post", None)).is_empty());

        assert!(state
            .on_reconciliation_event(&applied("Post", "a", MutationType::Create))
            .is_empty());
        assert!(state
            .on_reconciliation_event(&applied("Post", "b", MutationType::Update))
            .is_empty());

        let out = state.on_reconciliation_event(&dropped("Post"));
        assert_eq!(
            out[0],
            HubEvent::ModelSynced(ModelSyncedEvent {
                model_name: "Post".into(),
                is_full_sync: false,
                is_delta_sync: true,
                added: 1,
                updated: 1,
                deleted: 0,
            })
        );
        assert_eq!(out[1], HubEvent::SyncQueriesReady);
        assert!(state.is_ready());
    }

    #[test]
    fn reconciliation_before_finish_still_dispatches() {
        let mut state = CompletionState::new(["Post"]);
        state.on_sync_event(&enqueued("Post", "a"));
        state.on_reconciliation_event(&applied("Post", "a", MutationType::Create));

        let out = state.on_sync_event(&finished("Post", None));
        assert!(matches!(out[0], HubEvent::ModelSynced(_)));
    }

    #[test]
    fn events_after_dispatch_are_not_counted() {
        let mut state = CompletionState::new(["Post", "Comment"]);
        state.on_sync_event(&finished("Post", None));
        assert!(state.is_dispatched("Post"));

        assert!(state
            .on_reconciliation_event(&applied("Post", "late", MutationType::Create))
            .is_empty());
        assert!(state.on_sync_event(&enqueued("Post", "late")).is_empty());
        assert!(!state.is_ready());

        let out = state.on_sync_event(&finished("Comment", None));
        assert_eq!(out.len(), 2);
        assert!(state.is_ready());

        // Ready fires only once.
        assert!(state.on_sync_event(&finished("Comment", None)).is_empty());
    }

    #[test]
    fn fatal_failure_still_dispatches() {
        let mut state = CompletionState::new(["Post", "Comment"]);
        state.on_sync_event(&finished("Post", None));
        let out = state.on_sync_event(&finished(
            "Comment",
            Some(SyncError::network_fatal("offline")),
        ));
        assert_eq!(
            out,
            vec![
                HubEvent::ModelSynced(ModelSyncedEvent {
                    model_name: "Comment".into(),
                    ..Default::default()
                }),
                HubEvent::SyncQueriesReady,
            ]
        );
        assert!(state.is_ready());
    }

    #[test]
    fn fatal_failure_waits_for_enqueued_records() {
        let mut state = CompletionState::new(["Post"]);
        state.on_sync_event(&enqueued("Post", "a"));
        let out = state.on_sync_event(&finished("Post", Some(SyncError::network_fatal("offline"))));
        assert!(out.is_empty());
        assert!(state.is_settled());

        let out = state.on_reconciliation_event(&applied("Post", "a", MutationType::Create));
        assert!(matches!(out[0], HubEvent::ModelSynced(_)));
        assert!(state.is_ready());
    }

    #[test]
    fn authorization_failure_still_dispatches() {
        let mut state = CompletionState::new(["Post"]);
        let out = state.on_sync_event(&finished("Post", Some(SyncError::unauthorized("denied"))));
        assert!(matches!(out[0], HubEvent::ModelSynced(_)));
        assert!(state.is_ready());
    }

    #[test]
    fn unknown_models_are_ignored() {
        let mut state = CompletionState::new(["Post"]);
        assert!(state.on_sync_event(&finished("Ghost", None)).is_empty());
        assert!(state.on_reconciliation_event(&dropped("Ghost")).is_empty());
    }

    #[test]
    fn empty_state_is_ready_on_start() {
        let mut state = CompletionState::new(Vec::<String>::new());
        assert_eq!(state.start(), vec![HubEvent::SyncQueriesReady]);
        assert!(state.start().is_empty());
    }

    #[tokio::test]
    async fn tracker_publishes_to_hub() {
        let hub = Arc::new(EventStream::new());
        let mut notifications = hub.subscribe();
        let sync_stream = EventStream::new();
        let reconciliation_stream = EventStream::new();

        let handle = SyncCompletionTracker::new(["Post"], hub.clone()).spawn(
            sync_stream.subscribe(),
            reconciliation_stream.subscribe(),
        );

        sync_stream.emit(started("Post", SyncKind::Full));
        sync_stream.emit(enqueued("Post", "a"));
        sync_stream.emit(finished("Post", None));
        reconciliation_stream.emit(applied("Post", "a", MutationType::Create));

        let state = handle.await.unwrap();
        assert!(state.is_ready());
        assert!(matches!(
            notifications.recv().await,
            Some(HubEvent::ModelSynced(ModelSyncedEvent { added: 1, .. }))
        ));
        assert_eq!(notifications.recv().await, Some(HubEvent::SyncQueriesReady));
    }

    #[tokio::test]
    async fn tracker_stops_when_failed_run_settles() {
        let hub = Arc::new(EventStream::new());
        let sync_stream = EventStream::new();
        let reconciliation_stream = EventStream::<ReconciliationEvent>::new();

        let handle = SyncCompletionTracker::new(["Post"], hub).spawn(
            sync_stream.subscribe(),
            reconciliation_stream.subscribe(),
        );

        sync_stream.emit(enqueued("Post", "a"));
        sync_stream.emit(finished("Post", Some(SyncError::network_fatal("down"))));
        sync_stream.close();

        let state = handle.await.unwrap();
        assert!(!state.is_ready());
        assert!(!state.is_dispatched("Post"));
    }
}
