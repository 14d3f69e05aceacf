//! Scripted remote service.

use async_trait::async_trait;
use modelsync_engine::{LiveUpdates, Page, PageRequest, RemoteReader, SyncError, SyncResult};
use modelsync_model::RemoteRecord;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// A [`RemoteReader`] and [`LiveUpdates`] source that replays queued
/// responses per model.
///
/// Each query pops the model's next scripted response. A model with nothing
/// left returns an empty final page started at `default_started_at`.
/// Every request is recorded for later inspection.
#[derive(Default)]
pub struct ScriptedReader {
    responses: Mutex<HashMap<String, VecDeque<SyncResult<Page>>>>,
    requests: Mutex<Vec<PageRequest>>,
    live: Mutex<HashMap<String, UnboundedSender<RemoteRecord>>>,
    refuse_live: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    default_started_at: i64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedReader {
    /// Creates a reader with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server time reported by unscripted empty pages.
    #[must_use]
    pub fn with_default_started_at(mut self, started_at: i64) -> Self {
        self.default_started_at = started_at;
        self
    }

    /// Delays every query, so a test can cancel it in flight.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = Some(delay);
        self
    }

    /// Queues a page for `model_name`.
    pub fn push_page(&self, model_name: &str, page: Page) {
        self.push(model_name, Ok(page));
    }

    /// Queues a failure for `model_name`.
    pub fn push_error(&self, model_name: &str, error: SyncError) {
        self.push(model_name, Err(error));
    }

    fn push(&self, model_name: &str, response: SyncResult<Page>) {
        self.responses
            .lock()
            .entry(model_name.to_string())
            .or_default()
            .push_back(response);
    }

    /// Every request received, in arrival order.
    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().clone()
    }

    /// Requests received for one model.
    pub fn requests_for(&self, model_name: &str) -> Vec<PageRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.model_name == model_name)
            .cloned()
            .collect()
    }

    /// Models in the order their first request arrived.
    pub fn model_order(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for request in self.requests.lock().iter() {
            if !seen.contains(&request.model_name) {
                seen.push(request.model_name.clone());
            }
        }
        seen
    }

    /// Highest number of queries that were in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Makes live subscriptions for `model_name` fail.
    pub fn refuse_live(&self, model_name: &str) {
        self.refuse_live.lock().insert(model_name.to_string());
    }

    /// Pushes a live update to the model's subscriber.
    ///
    /// Returns false if nobody is subscribed to the model.
    pub fn push_live(&self, record: RemoteRecord) -> bool {
        let live = self.live.lock();
        match live.get(record.model_name()) {
            Some(tx) => tx.send(record).is_ok(),
            None => false,
        }
    }

    /// Returns true if the model has a live subscriber.
    pub fn is_live(&self, model_name: &str) -> bool {
        self.live
            .lock()
            .get(model_name)
            .is_some_and(|tx| !tx.is_closed())
    }
}

#[async_trait]
impl RemoteReader for ScriptedReader {
    async fn query(&self, request: PageRequest) -> SyncResult<Page> {
        let model_name = request.model_name.clone();
        self.requests.lock().push(request);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock();
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let response = self
            .responses
            .lock()
            .get_mut(&model_name)
            .and_then(VecDeque::pop_front);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        response.unwrap_or_else(|| {
            Ok(Page {
                items: Vec::new(),
                next_token: None,
                started_at: self.default_started_at,
            })
        })
    }
}

#[async_trait]
impl LiveUpdates for ScriptedReader {
    async fn subscribe(&self, model_name: &str) -> SyncResult<UnboundedReceiver<RemoteRecord>> {
        if self.refuse_live.lock().contains(model_name) {
            return Err(SyncError::unauthorized(format!(
                "live updates for {model_name} refused"
            )));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.live.lock().insert(model_name.to_string(), tx);
        Ok(rx)
    }
}
