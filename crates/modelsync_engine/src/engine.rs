//! Engine facade wiring every sync component together.

use crate::cancel::CancellationToken;
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::coordinator::{SyncCoordinator, SyncOutcome};
use crate::error::{SyncError, SyncResult};
use crate::events::{EventHub, EventStream, HubEvent, ReconciliationEvent};
use crate::operation::SyncContext;
use crate::reader::{LiveUpdates, RemoteReader};
use crate::reconcile::ReconciliationQueue;
use crate::tracker::{CompletionState, SyncCompletionTracker};
use modelsync_model::SchemaCatalog;
use modelsync_store::{LocalStore, Outbox};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Lifecycle state of a [`SyncEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Not started.
    Idle,
    /// Initial sync is running.
    Syncing,
    /// Initial sync finished and live updates are flowing.
    Live,
    /// Initial sync failed. The engine can be started again.
    Failed,
    /// Stopped by the application. The engine can be started again.
    Stopped,
}

impl EngineState {
    /// Returns true if the engine can start a new run.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            EngineState::Idle | EngineState::Failed | EngineState::Stopped
        )
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

struct ActiveRun {
    queue: ReconciliationQueue,
    cancel: CancellationToken,
}

/// Keeps a local store synchronized with a remote service.
///
/// ```no_run
/// # async fn demo(
/// #     catalog: modelsync_model::SchemaCatalog,
/// #     reader: std::sync::Arc<dyn modelsync_engine::RemoteReader>,
/// # ) -> modelsync_engine::SyncResult<()> {
/// use modelsync_engine::{HubEvent, SyncConfig, SyncEngine};
/// use modelsync_store::MemoryStore;
/// use std::sync::Arc;
///
/// let engine = SyncEngine::new(catalog, Arc::new(MemoryStore::new()), reader)
///     .with_config(SyncConfig::new().with_page_size(100));
/// let mut hub = engine.subscribe();
///
/// engine.start().await?;
/// while let Some(event) = hub.recv().await {
///     if event == HubEvent::Ready {
///         break;
///     }
/// }
/// engine.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct SyncEngine {
    catalog: Arc<SchemaCatalog>,
    store: Arc<dyn LocalStore>,
    reader: Arc<dyn RemoteReader>,
    outbox: Option<Arc<dyn Outbox>>,
    live: Option<Arc<dyn LiveUpdates>>,
    config: Arc<SyncConfig>,
    clock: Arc<dyn Clock>,
    hub: Arc<EventHub>,
    reconciliation: Arc<EventStream<ReconciliationEvent>>,
    state: RwLock<EngineState>,
    run: Mutex<Option<ActiveRun>>,
}

impl SyncEngine {
    /// Creates an engine with default configuration and the system clock.
    pub fn new(
        catalog: SchemaCatalog,
        store: Arc<dyn LocalStore>,
        reader: Arc<dyn RemoteReader>,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            store,
            reader,
            outbox: None,
            live: None,
            config: Arc::new(SyncConfig::default()),
            clock: Arc::new(SystemClock),
            hub: Arc::new(EventStream::new()),
            reconciliation: Arc::new(EventStream::new()),
            state: RwLock::new(EngineState::Idle),
            run: Mutex::new(None),
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Sets the outbox consulted before overwriting local records.
    pub fn with_outbox(mut self, outbox: Arc<dyn Outbox>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    /// Sets the live update source.
    pub fn with_live_updates(mut self, live: Arc<dyn LiveUpdates>) -> Self {
        self.live = Some(live);
        self
    }

    /// Sets the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    /// Subscribes to application notifications.
    pub fn subscribe(&self) -> UnboundedReceiver<HubEvent> {
        self.hub.subscribe()
    }

    /// Subscribes to every reconciliation outcome, across runs.
    pub fn subscribe_reconciliation(&self) -> UnboundedReceiver<ReconciliationEvent> {
        self.reconciliation.subscribe()
    }

    /// The schema catalog.
    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    fn transition(&self, to: EngineState) -> SyncResult<()> {
        let mut state = self.state.write();
        if to == EngineState::Syncing && !state.can_start() {
            return Err(SyncError::InvalidStateTransition {
                from: state.to_string(),
                to: to.to_string(),
            });
        }
        *state = to;
        Ok(())
    }

    /// Runs the initial sync, then releases live updates.
    ///
    /// Live updates are subscribed before the initial sync starts and are
    /// held back until it succeeds. `Ready` is published once every model
    /// has been reconciled and live updates are flowing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if the engine is already running,
    /// and the aggregate error if any model failed fatally.
    pub async fn start(&self) -> SyncResult<SyncOutcome> {
        self.transition(EngineState::Syncing)?;

        let cancel = CancellationToken::new();
        let mut queue = ReconciliationQueue::builder(self.catalog.clone(), self.store.clone())
            .events(self.reconciliation.clone())
            .hub(self.hub.clone());
        if let Some(outbox) = &self.outbox {
            queue = queue.outbox(outbox.clone());
        }
        let queue = queue.build();

        let sync_events = Arc::new(EventStream::new());
        let models: Vec<String> = self
            .catalog
            .syncable()
            .map(|s| s.name().to_string())
            .collect();
        let tracker = SyncCompletionTracker::new(models.iter().cloned(), self.hub.clone())
            .spawn(sync_events.subscribe(), queue.subscribe());

        *self.run.lock() = Some(ActiveRun {
            queue: queue.clone(),
            cancel: cancel.clone(),
        });

        if let Some(live) = &self.live {
            for model_name in &models {
                match live.subscribe(model_name).await {
                    Ok(updates) => queue.attach_live(model_name.clone(), updates),
                    Err(e) => {
                        warn!(model = %model_name, error = %e, "live update subscription failed");
                        return self.fail(&queue, &cancel, tracker, e).await;
                    }
                }
            }
        }

        let ctx = SyncContext {
            reader: self.reader.clone(),
            queue: queue.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
            clock: self.clock.clone(),
            events: sync_events,
            cancel: cancel.clone(),
        };
        let outcome = SyncCoordinator::new(self.catalog.clone(), ctx, self.hub.clone())
            .run()
            .await;

        queue.drained().await;
        if let Err(e) = tracker.await {
            warn!(error = %e, "completion tracker task failed");
        }

        match outcome {
            Ok(outcome) if !cancel.is_cancelled() => {
                queue.start_live();
                self.transition(EngineState::Live)?;
                self.hub.emit(HubEvent::Ready);
                info!(outcome = ?outcome, "sync engine ready");
                Ok(outcome)
            }
            Ok(_) => {
                info!("sync engine stopped during initial sync");
                Err(SyncError::Cancelled)
            }
            Err(e) if cancel.is_cancelled() => {
                info!(error = %e, "sync engine stopped during initial sync");
                Err(SyncError::Cancelled)
            }
            Err(e) => {
                warn!(error = %e, "initial sync failed");
                let run = self.run.lock().take();
                if let Some(run) = run {
                    run.queue.shutdown().await;
                }
                self.transition(EngineState::Failed)?;
                Err(e)
            }
        }
    }

    async fn fail(
        &self,
        queue: &ReconciliationQueue,
        cancel: &CancellationToken,
        tracker: JoinHandle<CompletionState>,
        error: SyncError,
    ) -> SyncResult<SyncOutcome> {
        cancel.cancel();
        queue.shutdown().await;
        tracker.abort();
        self.run.lock().take();
        self.transition(EngineState::Failed)?;
        Err(error)
    }

    /// Cancels outstanding operations and shuts the queue down.
    ///
    /// Records already offered are reconciled before this returns.
    pub async fn stop(&self) {
        let run = self.run.lock().take();
        if let Some(run) = run {
            run.cancel.cancel();
            run.queue.shutdown().await;
            info!("sync engine stopped");
        }
        *self.state.write() = EngineState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_state_start_rules() {
        assert!(EngineState::Idle.can_start());
        assert!(EngineState::Failed.can_start());
        assert!(EngineState::Stopped.can_start());
        assert!(!EngineState::Syncing.can_start());
        assert!(!EngineState::Live.can_start());
        assert_eq!(EngineState::Live.to_string(), "Live");
    }
}
