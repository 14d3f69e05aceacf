//! Remote collaborator interfaces.

use crate::config::SyncFilter;
use crate::error::SyncResult;
use async_trait::async_trait;
use modelsync_model::RemoteRecord;
use tokio::sync::mpsc::UnboundedReceiver;

/// One page request of a model's download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Model to download.
    pub model_name: String,
    /// Model-specific filter, if configured.
    pub filter: Option<SyncFilter>,
    /// Maximum number of records to return.
    pub limit: u32,
    /// Cursor returned by the previous page.
    pub next_token: Option<String>,
    /// Checkpoint for a delta sync. `None` requests a full sync.
    pub last_sync: Option<i64>,
}

/// One page of a model's download.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Records on this page.
    pub items: Vec<RemoteRecord>,
    /// Cursor for the next page. `None` on the last page.
    pub next_token: Option<String>,
    /// Server time at which the query started, in epoch millis.
    pub started_at: i64,
}

/// Paged reader over the remote service.
///
/// Implementations enforce their own request timeouts and report them as
/// network errors. Authorization failures must be reported as
/// `SyncError::Authorization` so the coordinator can treat them as non-fatal.
#[async_trait]
pub trait RemoteReader: Send + Sync {
    /// Fetches one page.
    async fn query(&self, request: PageRequest) -> SyncResult<Page>;
}

/// Subscription to records the remote service pushes outside of paging.
#[async_trait]
pub trait LiveUpdates: Send + Sync {
    /// Subscribes to one model's live updates.
    ///
    /// The receiver ends when the subscription is torn down.
    async fn subscribe(&self, model_name: &str) -> SyncResult<UnboundedReceiver<RemoteRecord>>;
}
