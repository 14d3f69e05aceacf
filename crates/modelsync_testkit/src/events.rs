//! Helpers for reading event receivers in async tests.

use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// How long the helpers wait for an event before failing the test.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives the next event.
///
/// # Panics
///
/// Panics if nothing arrives within [`EVENT_TIMEOUT`] or the stream ends.
pub async fn next_event<T>(rx: &mut UnboundedReceiver<T>) -> T {
    match tokio::time::timeout(EVENT_TIMEOUT, rx.recv()).await {
        Ok(Some(event)) => event,
        Ok(None) => panic!("event stream ended"),
        Err(_) => panic!("no event within {EVENT_TIMEOUT:?}"),
    }
}

/// Receives events up to and including the first one matching `stop`.
///
/// # Panics
///
/// Panics if no matching event arrives in time.
pub async fn collect_until<T, F>(rx: &mut UnboundedReceiver<T>, mut stop: F) -> Vec<T>
where
    F: FnMut(&T) -> bool,
{
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = stop(&event);
        events.push(event);
        if done {
            return events;
        }
    }
}

/// Takes every event already buffered, without waiting.
pub fn drain<T>(rx: &mut UnboundedReceiver<T>) -> Vec<T> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
