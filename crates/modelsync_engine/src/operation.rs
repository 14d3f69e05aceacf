//! Per-model sync operation.

use crate::cancel::CancellationToken;
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::events::{EventStream, ModelSyncEvent, SyncKind};
use crate::reader::{PageRequest, RemoteReader};
use crate::reconcile::ReconciliationQueue;
use modelsync_model::{ModelSchema, SyncMetadataRecord};
use modelsync_store::LocalStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Collaborators shared by every operation of a sync run.
#[derive(Clone)]
pub struct SyncContext {
    /// Remote page reader.
    pub reader: Arc<dyn RemoteReader>,
    /// Destination of downloaded records.
    pub queue: ReconciliationQueue,
    /// Checkpoint storage.
    pub store: Arc<dyn LocalStore>,
    /// Limits and filters.
    pub config: Arc<SyncConfig>,
    /// Source of "now" for the full-vs-delta decision.
    pub clock: Arc<dyn Clock>,
    /// Stream every operation publishes its events on.
    pub events: Arc<EventStream<ModelSyncEvent>>,
    /// Run-wide cancellation.
    pub cancel: CancellationToken,
}

/// Summary of one model's run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReport {
    /// Model name.
    pub model_name: String,
    /// Full or delta.
    pub kind: SyncKind,
    /// Records handed to reconciliation.
    pub received: u64,
    /// Pages fetched.
    pub pages: u32,
    /// Checkpoint persisted at the end, if any.
    pub checkpoint: Option<i64>,
    /// Whether the run stopped early because it was cancelled.
    pub cancelled: bool,
}

/// Decides between a full and a delta sync.
///
/// A full sync runs when there is no checkpoint, when the checkpoint is older
/// than `interval` or lies in the future, or when the filter differs from the
/// one the checkpoint was taken with. Otherwise a delta sync resumes from the
/// checkpoint, which is returned alongside.
pub fn resolve_sync_kind(
    checkpoint: Option<&SyncMetadataRecord>,
    predicate: Option<&str>,
    now_millis: i64,
    interval: Duration,
) -> (SyncKind, Option<i64>) {
    let Some(checkpoint) = checkpoint else {
        return (SyncKind::Full, None);
    };
    let Some(last_sync) = checkpoint.last_sync_millis else {
        return (SyncKind::Full, None);
    };
    if checkpoint.sync_predicate.as_deref() != predicate {
        return (SyncKind::Full, None);
    }
    if last_sync > now_millis {
        return (SyncKind::Full, None);
    }
    let interval_millis = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
    if now_millis.saturating_sub(last_sync) > interval_millis {
        return (SyncKind::Full, None);
    }
    (SyncKind::Delta, Some(last_sync))
}

/// Downloads one model and feeds every page to the reconciliation queue.
pub struct ModelSyncOperation {
    schema: ModelSchema,
    ctx: SyncContext,
}

impl ModelSyncOperation {
    /// Creates an operation for one model.
    pub fn new(schema: ModelSchema, ctx: SyncContext) -> Self {
        Self { schema, ctx }
    }

    /// Model this operation syncs.
    pub fn model_name(&self) -> &str {
        self.schema.name()
    }

    /// Runs the operation to completion.
    ///
    /// Always ends with a `Finished` event. Cancellation is not an error:
    /// the run reports `cancelled` and leaves the checkpoint untouched.
    ///
    /// The checkpoint saved on success is the `started_at` of the first page,
    /// not of the page that ended pagination. Changes made while later pages
    /// were being fetched are fetched again by the next delta sync.
    pub async fn run(self) -> SyncResult<OperationReport> {
        let result = self.execute().await;

        let error = match &result {
            Ok(_) => None,
            Err(e) => {
                warn!(model = %self.model_name(), error = %e, "model sync failed");
                Some(e.clone())
            }
        };
        self.ctx.events.emit(ModelSyncEvent::Finished {
            model_name: self.model_name().to_string(),
            error,
        });
        result
    }

    async fn execute(&self) -> SyncResult<OperationReport> {
        let name = self.model_name();
        let config = &self.ctx.config;
        let filter = config.filter_for(name).cloned();
        let predicate = filter.as_ref().map(|f| f.expression().to_string());

        let checkpoint = self.ctx.store.sync_metadata(name).await?;
        let (kind, last_sync) = resolve_sync_kind(
            checkpoint.as_ref(),
            predicate.as_deref(),
            self.ctx.clock.now_millis(),
            config.sync_interval,
        );
        info!(model = %name, kind = ?kind, last_sync = ?last_sync, "starting model sync");
        self.ctx.events.emit(ModelSyncEvent::Started {
            model_name: name.to_string(),
            kind,
        });

        let mut report = OperationReport {
            model_name: name.to_string(),
            kind,
            received: 0,
            pages: 0,
            checkpoint: None,
            cancelled: false,
        };
        let mut next_token: Option<String> = None;
        let mut started_at: Option<i64> = None;

        loop {
            if self.ctx.cancel.is_cancelled() {
                return Ok(self.cancelled(report));
            }

            let limit = config.page_limit(report.received);
            if limit == 0 {
                debug!(model = %name, received = report.received, "record limit reached");
                break;
            }

            let request = PageRequest {
                model_name: name.to_string(),
                filter: filter.clone(),
                limit,
                next_token: next_token.take(),
                last_sync,
            };
            let page = tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => return Ok(self.cancelled(report)),
                page = self.ctx.reader.query(request) => page,
            };
            // A stop that lands while the query is in flight wins over its result.
            if self.ctx.cancel.is_cancelled() {
                return Ok(self.cancelled(report));
            }
            let page = page?;

            report.pages += 1;
            started_at.get_or_insert(page.started_at);
            debug!(
                model = %name,
                page = report.pages,
                records = page.items.len(),
                has_next = page.next_token.is_some(),
                "page received"
            );

            let count = page.items.len() as u64;
            for record in &page.items {
                self.ctx.events.emit(ModelSyncEvent::Enqueued {
                    model_name: name.to_string(),
                    record: record.clone(),
                });
            }
            if let Err(e) = self.ctx.queue.offer(page.items, name) {
                if self.ctx.cancel.is_cancelled() {
                    return Ok(self.cancelled(report));
                }
                return Err(e);
            }
            report.received += count;

            next_token = page.next_token;
            if next_token.is_none() {
                break;
            }
        }

        if self.ctx.cancel.is_cancelled() {
            return Ok(self.cancelled(report));
        }

        if let Some(started_at) = started_at {
            self.ctx
                .store
                .save_sync_metadata(SyncMetadataRecord::new(name, started_at).with_predicate(predicate))
                .await?;
            report.checkpoint = Some(started_at);
            info!(
                model = %name,
                checkpoint = started_at,
                records = report.received,
                "model sync checkpoint saved"
            );
        }
        Ok(report)
    }

    fn cancelled(&self, mut report: OperationReport) -> OperationReport {
        info!(model = %self.model_name(), received = report.received, "model sync cancelled");
        report.cancelled = true;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::error::SyncError;
    use crate::reader::Page;
    use async_trait::async_trait;
    use modelsync_model::{Record, RemoteRecord, SchemaCatalog};
    use modelsync_store::MemoryStore;

    const DAY: Duration = Duration::from_secs(86_400);

    #[test]
    fn no_checkpoint_is_full() {
        assert_eq!(resolve_sync_kind(None, None, 1_000, DAY), (SyncKind::Full, None));

        let empty = SyncMetadataRecord {
            model_name: "Post".into(),
            last_sync_millis: None,
            sync_predicate: None,
        };
        assert_eq!(
            resolve_sync_kind(Some(&empty), None, 1_000, DAY),
            (SyncKind::Full, None)
        );
    }

    #[test]
    fn recent_checkpoint_is_delta() {
        let checkpoint = SyncMetadataRecord::new("Post", 1_000);
        assert_eq!(
            resolve_sync_kind(Some(&checkpoint), None, 2_000, DAY),
            (SyncKind::Delta, Some(1_000))
        );
    }

    #[test]
    fn expired_checkpoint_is_full() {
        let checkpoint = SyncMetadataRecord::new("Post", 0);
        let now = DAY.as_millis() as i64 + 1;
        assert_eq!(
            resolve_sync_kind(Some(&checkpoint), None, now, DAY),
            (SyncKind::Full, None)
        );
        assert_eq!(
            resolve_sync_kind(Some(&checkpoint), None, now - 1, DAY),
            (SyncKind::Delta, Some(0))
        );
    }

    #[test]
    fn future_checkpoint_is_full() {
        let checkpoint = SyncMetadataRecord::new("Post", 5_000);
        assert_eq!(
            resolve_sync_kind(Some(&checkpoint), None, 1_000, DAY),
            (SyncKind::Full, None)
        );
    }

    #[test]
    fn changed_filter_is_full() {
        let checkpoint =
            SyncMetadataRecord::new("Post", 1_000).with_predicate(Some("rating > 3".into()));
        assert_eq!(
            resolve_sync_kind(Some(&checkpoint), Some("rating > 4"), 2_000, DAY),
            (SyncKind::Full, None)
        );
        assert_eq!(
            resolve_sync_kind(Some(&checkpoint), None, 2_000, DAY),
            (SyncKind::Full, None)
        );
        assert_eq!(
            resolve_sync_kind(Some(&checkpoint), Some("rating > 3"), 2_000, DAY),
            (SyncKind::Delta, Some(1_000))
        );
    }

    struct OnePage;

    #[async_trait]
    impl RemoteReader for OnePage {
        async fn query(&self, request: PageRequest) -> SyncResult<Page> {
            if request.model_name != "Post" {
                return Err(SyncError::network_fatal("no such table"));
            }
            Ok(Page {
                items: vec![RemoteRecord::new(Record::with_id("Post", "p1"), 1, 0)],
                next_token: None,
                started_at: 42,
            })
        }
    }

    fn context(store: Arc<MemoryStore>) -> SyncContext {
        let catalog = Arc::new(SchemaCatalog::from_schemas([ModelSchema::new("Post")]).unwrap());
        SyncContext {
            reader: Arc::new(OnePage),
            queue: ReconciliationQueue::new(catalog, store.clone()),
            store,
            config: Arc::new(SyncConfig::default()),
            clock: Arc::new(SystemClock),
            events: Arc::new(EventStream::new()),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn run_persists_checkpoint() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone());
        let mut events = ctx.events.subscribe();

        let report = ModelSyncOperation::new(ModelSchema::new("Post"), ctx)
            .run()
            .await
            .unwrap();

        assert_eq!(report.kind, SyncKind::Full);
        assert_eq!(report.received, 1);
        assert_eq!(report.checkpoint, Some(42));
        assert_eq!(
            store.sync_metadata("Post").await.unwrap().unwrap().last_sync_millis,
            Some(42)
        );

        assert!(matches!(events.recv().await, Some(ModelSyncEvent::Started { .. })));
        assert!(matches!(events.recv().await, Some(ModelSyncEvent::Enqueued { .. })));
        assert!(matches!(
            events.recv().await,
            Some(ModelSyncEvent::Finished { error: None, .. })
        ));
    }

    #[tokio::test]
    async fn cancelled_before_start_keeps_checkpoint() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone());
        ctx.cancel.cancel();

        let report = ModelSyncOperation::new(ModelSchema::new("Post"), ctx)
            .run()
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.pages, 0);
        assert!(store.sync_metadata("Post").await.unwrap().is_none());
    }

    struct StopsDuringQuery {
        cancel: CancellationToken,
        queue: ReconciliationQueue,
    }

    #[async_trait]
    impl RemoteReader for StopsDuringQuery {
        async fn query(&self, _request: PageRequest) -> SyncResult<Page> {
            self.cancel.cancel();
            self.queue.shutdown().await;
            Ok(Page {
                items: vec![RemoteRecord::new(Record::with_id("Post", "p1"), 1, 0)],
                next_token: None,
                started_at: 42,
            })
        }
    }

    #[tokio::test]
    async fn stop_during_query_finishes_cancelled() {
        let store = Arc::new(MemoryStore::new());
        let mut ctx = context(store.clone());
        ctx.reader = Arc::new(StopsDuringQuery {
            cancel: ctx.cancel.clone(),
            queue: ctx.queue.clone(),
        });
        let mut events = ctx.events.subscribe();

        let report = ModelSyncOperation::new(ModelSchema::new("Post"), ctx)
            .run()
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.received, 0);
        assert_eq!(report.checkpoint, None);
        assert!(store.sync_metadata("Post").await.unwrap().is_none());
        assert!(matches!(events.recv().await, Some(ModelSyncEvent::Started { .. })));
        assert!(matches!(
            events.recv().await,
            Some(ModelSyncEvent::Finished { error: None, .. })
        ));
    }

    #[tokio::test]
    async fn network_failure_is_reported_in_finished() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone());
        let mut events = ctx.events.subscribe();

        let err = ModelSyncOperation::new(ModelSchema::new("Other"), ctx)
            .run()
            .await
            .unwrap_err();

        assert_eq!(err, SyncError::network_fatal("no such table"));
        assert!(matches!(events.recv().await, Some(ModelSyncEvent::Started { .. })));
        assert!(matches!(
            events.recv().await,
            Some(ModelSyncEvent::Finished { error: Some(_), .. })
        ));
        assert!(store.sync_metadata("Other").await.unwrap().is_none());
    }
}
