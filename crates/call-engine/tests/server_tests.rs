//! Server lifecycle

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use callflow_call_engine::prelude::*;
use common::{channel, fast_config, FakeControlPlane};

fn build_server(control: Arc<FakeControlPlane>) -> CallEngineServer {
    CallEngineServer::builder()
        .with_config(fast_config())
        .with_store(Arc::new(MemoryStore::new()))
        .with_control_plane(control)
        .build()
        .unwrap()
}

#[tokio::test]
async fn builder_requires_store_and_control_plane() {
    assert!(CallEngineServer::builder().build().is_err());
    assert!(CallEngineServer::builder()
        .with_store(Arc::new(MemoryStore::new()))
        .build()
        .is_err());
}

#[tokio::test]
async fn closed_event_stream_stops_cleanly() {
    let server = build_server(FakeControlPlane::new());
    let (tx, rx) = mpsc::channel::<ControlEvent>(8);
    drop(tx);
    assert!(server.run(rx).await.is_ok());
}

#[tokio::test]
async fn exhausted_reconnection_is_fatal() {
    let server = build_server(FakeControlPlane::new());
    let (tx, rx) = mpsc::channel::<ControlEvent>(8);

    tx.send(ControlEvent::Reconnecting { attempt: 3 }).await.unwrap();
    tx.send(ControlEvent::MaxRetriesExceeded).await.unwrap();

    match server.run(rx).await {
        Err(EngineError::ConnectionLost) => {}
        other => panic!("expected ConnectionLost, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn events_are_dispatched_to_workers() {
    let control = FakeControlPlane::new();
    control.add_channel(channel("ch-x", "1002", "1001", Some("call-9"), ChannelState::Ring));
    let server = build_server(control.clone());
    let orchestrator = server.orchestrator();

    let (tx, rx) = mpsc::channel::<ControlEvent>(8);
    let run = tokio::spawn(async move { server.run(rx).await });

    tx.send(ControlEvent::SessionStart {
        channel: channel("ch-x", "1002", "1001", Some("call-9"), ChannelState::Ring),
        app: "callflow".to_string(),
        args: vec!["mystery".to_string()],
    })
    .await
    .unwrap();

    // Give the worker a moment, then close the stream
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(tx);
    run.await.unwrap().unwrap();

    // The unroutable call was answered and hung up by the worker
    assert_eq!(control.hangups(), vec!["ch-x".to_string()]);
    assert_eq!(
        orchestrator
            .stats()
            .events_processed
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
}
