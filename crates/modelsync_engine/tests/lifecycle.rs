//! Integration tests for the engine lifecycle and live updates.

use modelsync_engine::{EngineState, HubEvent, MutationType, SyncEngine, SyncError};
use modelsync_model::RecordId;
use modelsync_store::{LocalStore, MemoryStore};
use modelsync_testkit::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn live_engine(reader: &Arc<ScriptedReader>, store: &Arc<MemoryStore>) -> Arc<SyncEngine> {
    Arc::new(
        SyncEngine::new(post_catalog(), store.clone(), reader.clone())
            .with_live_updates(reader.clone())
            .with_clock(Arc::new(ManualClock::new(10_000))),
    )
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn state_follows_lifecycle() {
    let reader = Arc::new(ScriptedReader::new());
    let store = Arc::new(MemoryStore::new());
    let engine = live_engine(&reader, &store);

    assert_eq!(engine.state(), EngineState::Idle);
    engine.start().await.unwrap();
    assert_eq!(engine.state(), EngineState::Live);
    engine.stop().await;
    assert_eq!(engine.state(), EngineState::Stopped);
    engine.start().await.unwrap();
    assert_eq!(engine.state(), EngineState::Live);
}

#[tokio::test]
async fn live_updates_wait_for_initial_sync() {
    let reader = Arc::new(ScriptedReader::new().with_delay(Duration::from_millis(50)));
    reader.push_page("Post", page(vec![post("a", 1)], None, 1_000));
    let store = Arc::new(MemoryStore::new());
    let engine = live_engine(&reader, &store);
    let mut hub = engine.subscribe();

    let running = tokio::spawn({
        let engine = engine.clone();
        async move { engine.start().await }
    });
    wait_until(|| reader.is_live("Post")).await;

    assert!(reader.push_live(post("a", 5)));
    assert!(reader.push_live(post("z", 1)));
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(store.get("Post", &RecordId::new("z")).await.unwrap().is_none());

    running.await.unwrap().unwrap();

    let before_ready = collect_until(&mut hub, |e| *e == HubEvent::Ready).await;
    assert!(!before_ready.iter().any(|e| matches!(
        e,
        HubEvent::SyncReceived { version: 5, .. }
    ) || matches!(
        e,
        HubEvent::SyncReceived { record_id, .. } if *record_id == RecordId::new("z")
    )));

    let mut live = vec![next_event(&mut hub).await, next_event(&mut hub).await];
    live.sort_by_key(|e| match e {
        HubEvent::SyncReceived { record_id, .. } => record_id.to_string(),
        _ => String::new(),
    });
    assert!(matches!(
        &live[0],
        HubEvent::SyncReceived {
            version: 5,
            mutation_type: MutationType::Update,
            ..
        }
    ));
    assert!(matches!(
        &live[1],
        HubEvent::SyncReceived {
            version: 1,
            mutation_type: MutationType::Create,
            ..
        }
    ));

    let meta = store
        .mutation_metadata("Post", &RecordId::new("a"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.version, 5);
}

#[tokio::test]
async fn live_updates_stop_with_engine() {
    let reader = Arc::new(ScriptedReader::new());
    let store = Arc::new(MemoryStore::new());
    let engine = live_engine(&reader, &store);

    engine.start().await.unwrap();
    reader.push_live(post("a", 1));
    wait_until(|| store.record_count("Post") == 1).await;

    engine.stop().await;
    reader.push_live(post("b", 1));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.record_count("Post"), 1);
}

#[tokio::test]
async fn second_start_while_syncing_is_rejected() {
    let reader = Arc::new(ScriptedReader::new().with_delay(Duration::from_millis(50)));
    let store = Arc::new(MemoryStore::new());
    let engine = live_engine(&reader, &store);

    let running = tokio::spawn({
        let engine = engine.clone();
        async move { engine.start().await }
    });
    wait_until(|| !reader.requests().is_empty()).await;

    assert!(matches!(
        engine.start().await,
        Err(SyncError::InvalidStateTransition { .. })
    ));
    assert!(running.await.unwrap().is_ok());
    assert_eq!(engine.state(), EngineState::Live);
}

#[tokio::test]
async fn refused_live_subscription_fails_start() {
    let reader = Arc::new(ScriptedReader::new());
    reader.refuse_live("Post");
    let store = Arc::new(MemoryStore::new());
    let engine = live_engine(&reader, &store);

    let error = engine.start().await.unwrap_err();

    assert!(error.is_authorization());
    assert_eq!(engine.state(), EngineState::Failed);
    assert!(reader.requests().is_empty());
}
