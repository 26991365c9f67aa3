//! Fan promotion through the producer's actor.
//!
//! Verifies:
//! - Sending a fan backstage updates the store, the subscriptions and the signals
//! - Sending the same fan backstage twice changes nothing the second time
//! - Sending the backstage fan on stage lets it in when the countdown ends
//! - Kicking and force-disconnecting reach the fan's backstage connection
//! - A second fan is not sent on stage while the first one's countdown runs

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use common::types::{ConnectionId, FanId, StreamId};
use sc_test_utils::{
    fan_stream, store_with_fans, test_settings, wait_for_state, MockMediaSession, SessionCall,
    SessionOp,
};
use serde_json::json;
use stage_controller::actors::{EventActor, EventActorHandle};
use stage_controller::gateway::{SessionRegistry, SubscribeOptions};
use stage_controller::roles::{FanSeat, PrivilegedRole, SessionName};
use stage_controller::signaling::Signal;
use stage_controller::store::{MemoryStore, SharedStore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Producer {
    handle: EventActorHandle,
    task: JoinHandle<()>,
    store: MemoryStore,
    stage: MockMediaSession,
    backstage: MockMediaSession,
}

impl Producer {
    async fn shutdown(self) {
        self.handle.cancel();
        self.task.await.unwrap();
    }
}

/// Producer joined with fan 42 waiting in line and publishing backstage.
async fn producer_with_fan_in_line() -> Producer {
    let store = store_with_fans(&[("42", "Ada", "fan-42")]).await;
    let stage = MockMediaSession::new(SessionName::Stage);
    let backstage = MockMediaSession::new(SessionName::Backstage);
    let registry = SessionRegistry::new(stage.as_session(), Some(backstage.as_session()));
    let (handle, task) = EventActor::spawn(
        test_settings(PrivilegedRole::Producer),
        Arc::new(store.clone()),
        registry,
        CancellationToken::new(),
    );
    handle.join().await.unwrap();
    backstage.emit_stream_created(fan_stream("42", "fan-42")).await;
    wait_for_state(&handle, |s| s.queue.len() == 1).await;

    Producer {
        handle,
        task,
        store,
        stage,
        backstage,
    }
}

fn fan_connection() -> ConnectionId {
    ConnectionId::new("conn-fan-42")
}

#[tokio::test]
async fn test_send_to_backstage_with_empty_seat() {
    let p = producer_with_fan_in_line().await;

    let report = p.handle.send_to_backstage(FanId::new("42")).await.unwrap();
    assert!(report.is_clean(), "failed steps: {:?}", report.failed_steps);

    let record = p.store.read("event/activeFans/42").await.unwrap().unwrap();
    assert_eq!(record.get("isBackstage"), Some(&json!(true)));
    assert_eq!(record.get("isOnStage"), Some(&json!(false)));
    assert_eq!(
        p.store.read("event/volume/backstageFan").await.unwrap(),
        Some(json!(100))
    );

    assert!(p.backstage.calls().contains(&SessionCall::Subscribe {
        stream_id: StreamId::new("fan-42"),
        options: SubscribeOptions::VIDEO_ONLY,
    }));
    assert!(p
        .backstage
        .signals()
        .contains(&(Signal::JoinBackstage, Some(fan_connection()))));
    assert!(p.stage.signals().contains(&(Signal::NewBackstageFan, None)));

    let state = p.handle.get_state().await.unwrap();
    assert!(!state.fan_transition);
    assert!(state.queue.iter().any(|f| f.is_backstage));

    p.shutdown().await;
}

#[tokio::test]
async fn test_send_to_backstage_is_idempotent() {
    let p = producer_with_fan_in_line().await;
    p.handle.send_to_backstage(FanId::new("42")).await.unwrap();
    let calls_after_first = p.backstage.calls().len();

    let report = p.handle.send_to_backstage(FanId::new("42")).await.unwrap();
    assert!(report.skipped);
    assert_eq!(p.backstage.calls().len(), calls_after_first);

    let record = p.store.read("event/activeFans/42").await.unwrap().unwrap();
    assert_eq!(record.get("isBackstage"), Some(&json!(true)));

    p.shutdown().await;
}

#[tokio::test]
async fn test_send_to_stage_lets_fan_in_after_countdown() {
    let p = producer_with_fan_in_line().await;
    p.handle.send_to_backstage(FanId::new("42")).await.unwrap();

    p.handle.send_to_stage().await.unwrap();

    let record = p.store.read("event/activeFans/42").await.unwrap().unwrap();
    assert_eq!(record.get("isOnStage"), Some(&json!(true)));
    assert_eq!(record.get("isBackstage"), Some(&json!(false)));
    assert_eq!(
        p.store.read("event/volume/fan").await.unwrap(),
        Some(json!(100))
    );
    assert!(p
        .backstage
        .calls()
        .contains(&SessionCall::Unsubscribe(StreamId::new("fan-42"))));

    // Zero-length countdown: joinHostNow follows the first tick
    wait_for_state(&p.handle, |_| {
        p.backstage
            .signals()
            .contains(&(Signal::JoinHostNow, Some(fan_connection())))
    })
    .await;
    let join_host = p
        .backstage
        .position(|c| c.signal() == Some(Signal::JoinHost))
        .unwrap();
    let join_now = p
        .backstage
        .position(|c| c.signal() == Some(Signal::JoinHostNow))
        .unwrap();
    assert!(join_host < join_now);

    p.shutdown().await;
}

#[tokio::test]
async fn test_send_to_stage_without_backstage_fan_is_skipped() {
    let p = producer_with_fan_in_line().await;
    let report = p.handle.send_to_stage().await.unwrap();
    assert!(report.skipped);
    assert!(p.backstage.signals().is_empty());
    p.shutdown().await;
}

#[tokio::test]
async fn test_kick_backstage_fan_clears_flag_and_signals() {
    let p = producer_with_fan_in_line().await;
    p.handle.send_to_backstage(FanId::new("42")).await.unwrap();

    p.handle.kick_fan(FanSeat::BackstageFan).await.unwrap();

    let record = p.store.read("event/activeFans/42").await.unwrap().unwrap();
    assert_eq!(record.get("isBackstage"), Some(&json!(false)));
    assert!(p
        .backstage
        .signals()
        .contains(&(Signal::DisconnectBackstage, Some(fan_connection()))));

    p.shutdown().await;
}

#[tokio::test]
async fn test_force_fan_disconnect_targets_backstage_connection() {
    let p = producer_with_fan_in_line().await;

    p.handle
        .force_fan_disconnect(FanId::new("42"))
        .await
        .unwrap();
    assert_eq!(
        p.backstage.calls_of(SessionOp::ForceDisconnect),
        vec![SessionCall::ForceDisconnect(fan_connection())]
    );

    let err = p
        .handle
        .force_fan_disconnect(FanId::new("missing"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        stage_controller::errors::ScError::FanNotFound(_)
    ));

    p.shutdown().await;
}

#[tokio::test]
async fn test_failed_signal_is_reported_not_fatal() {
    let p = producer_with_fan_in_line().await;
    p.backstage.fail(SessionOp::Signal);

    let report = p.handle.send_to_backstage(FanId::new("42")).await.unwrap();
    assert!(report.failed("signal_join_backstage"));

    // Remaining steps still ran
    let record = p.store.read("event/activeFans/42").await.unwrap().unwrap();
    assert_eq!(record.get("isBackstage"), Some(&json!(true)));

    p.shutdown().await;
}

#[tokio::test]
async fn test_send_to_stage_waits_for_running_countdown() {
    let store = store_with_fans(&[("42", "Ada", "fan-42"), ("43", "Bob", "fan-43")]).await;
    let stage = MockMediaSession::new(SessionName::Stage);
    let backstage = MockMediaSession::new(SessionName::Backstage);
    let registry = SessionRegistry::new(stage.as_session(), Some(backstage.as_session()));
    let mut settings = test_settings(PrivilegedRole::Producer);
    settings.stage_countdown_seconds = 60;
    let (handle, task) = EventActor::spawn(
        settings,
        Arc::new(store.clone()),
        registry,
        CancellationToken::new(),
    );
    handle.join().await.unwrap();
    backstage.emit_stream_created(fan_stream("42", "fan-42")).await;
    backstage.emit_stream_created(fan_stream("43", "fan-43")).await;
    wait_for_state(&handle, |s| s.queue.len() == 2).await;

    handle.send_to_backstage(FanId::new("42")).await.unwrap();
    let report = handle.send_to_stage().await.unwrap();
    assert!(!report.skipped);

    handle.send_to_backstage(FanId::new("43")).await.unwrap();
    let report = handle.send_to_stage().await.unwrap();
    assert!(report.skipped);

    let record = store.read("event/activeFans/43").await.unwrap().unwrap();
    assert_eq!(record.get("isBackstage"), Some(&json!(true)));
    assert_eq!(record.get("isOnStage"), Some(&json!(false)));
    assert!(!backstage
        .signals()
        .contains(&(Signal::JoinHost, Some(ConnectionId::new("conn-fan-43")))));

    handle.cancel();
    task.await.unwrap();
}
