//! Orchestration of per-model sync operations.

use crate::error::{ModelFailure, SyncError, SyncResult};
use crate::events::{EventHub, HubEvent};
use crate::operation::{ModelSyncOperation, OperationReport, SyncContext};
use modelsync_model::SchemaCatalog;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Aggregate result of a successful sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every model synced.
    Synced,
    /// Every model synced except these, which were not authorized.
    SyncedWithAuthorizationGaps {
        /// Models that failed authorization.
        models: Vec<String>,
    },
}

/// Runs one sync operation per syncable model and aggregates the results.
///
/// Models are scheduled in dependency order. When any model declares an
/// association the operations run one after another, so a model's
/// dependencies have finished downloading before it starts. Otherwise they
/// run concurrently, optionally bounded by `max_concurrent_models`.
pub struct SyncCoordinator {
    catalog: Arc<SchemaCatalog>,
    ctx: SyncContext,
    hub: Arc<EventHub>,
}

impl SyncCoordinator {
    /// Creates a coordinator for one run.
    pub fn new(catalog: Arc<SchemaCatalog>, ctx: SyncContext, hub: Arc<EventHub>) -> Self {
        Self { catalog, ctx, hub }
    }

    /// Runs every syncable model.
    ///
    /// Closes the operation event stream when done. Authorization failures
    /// are reported in the outcome; every other failure fails the run with
    /// [`SyncError::SyncFailed`].
    pub async fn run(self) -> SyncResult<SyncOutcome> {
        let order: Vec<_> = self.catalog.sync_order().into_iter().cloned().collect();
        let models: Vec<String> = order.iter().map(|s| s.name().to_string()).collect();

        info!(models = ?models, "sync queries started");
        self.hub.emit(HubEvent::SyncQueriesStarted {
            models: models.clone(),
        });

        let mut results: HashMap<String, SyncResult<OperationReport>> = HashMap::new();
        if self.catalog.has_associations() {
            for schema in order {
                let name = schema.name().to_string();
                let result = ModelSyncOperation::new(schema, self.ctx.clone()).run().await;
                results.insert(name, result);
            }
        } else {
            let limit = self
                .ctx
                .config
                .max_concurrent_models
                .map(|n| Arc::new(Semaphore::new(n)));
            let mut tasks = JoinSet::new();

            for schema in order {
                let operation = ModelSyncOperation::new(schema, self.ctx.clone());
                let limit = limit.clone();
                tasks.spawn(async move {
                    let _permit = match limit {
                        Some(semaphore) => semaphore.acquire_owned().await.ok(),
                        None => None,
                    };
                    let name = operation.model_name().to_string();
                    (name, operation.run().await)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((name, result)) => {
                        results.insert(name, result);
                    }
                    Err(e) => warn!(error = %e, "model sync task aborted"),
                }
            }
        }
        self.ctx.events.close();

        aggregate(&models, results)
    }
}

fn aggregate(
    models: &[String],
    mut results: HashMap<String, SyncResult<OperationReport>>,
) -> SyncResult<SyncOutcome> {
    let mut failures = Vec::new();
    let mut unauthorized = Vec::new();

    for name in models {
        let result = results
            .remove(name)
            .unwrap_or_else(|| Err(SyncError::Internal("sync task ended without a result".into())));
        match result {
            Ok(_) => {}
            Err(e) if e.is_authorization() => {
                warn!(model = %name, error = %e, "model not authorized, continuing");
                unauthorized.push(name.clone());
            }
            Err(error) => failures.push(ModelFailure {
                model_name: name.clone(),
                error,
            }),
        }
    }

    if !failures.is_empty() {
        warn!(failed = failures.len(), "sync run failed");
        return Err(SyncError::SyncFailed { failures });
    }
    if unauthorized.is_empty() {
        info!("sync run complete");
        Ok(SyncOutcome::Synced)
    } else {
        Ok(SyncOutcome::SyncedWithAuthorizationGaps {
            models: unauthorized,
        })
    }
}
