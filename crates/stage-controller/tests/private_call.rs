//! Private call arbitration.
//!
//! Verifies:
//! - Connecting the role already in call ends the call without a new start
//! - Switching partners passes through `null`
//! - The call ends when its partner leaves the event
//! - A fan leaving the line mid-call releases the backstage subscription
//! - Stage tiers follow the record but ignore calls with fans off stage

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use common::types::{FanId, StreamId};
use sc_test_utils::{
    fan_stream, store_with_fans, stream_for, test_settings, wait_for_state, MockMediaSession,
    SessionCall,
};
use serde_json::{json, Value};
use stage_controller::actors::{EventActor, EventActorHandle};
use stage_controller::errors::ScError;
use stage_controller::engine::ControllerEvent;
use stage_controller::gateway::{SessionRegistry, SubscribeOptions};
use stage_controller::private_call::PrivateCall;
use stage_controller::roles::{CallTarget, PrivilegedRole, SessionName};
use stage_controller::store::{MemoryStore, SharedStore, StoreSubscription};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

async fn spawn_joined(
    role: PrivilegedRole,
    store: &MemoryStore,
) -> (EventActorHandle, JoinHandle<()>, MockMediaSession) {
    let stage = MockMediaSession::new(SessionName::Stage);
    let backstage = match role {
        PrivilegedRole::Producer => Some(MockMediaSession::new(SessionName::Backstage).as_session()),
        PrivilegedRole::Host | PrivilegedRole::Celebrity => None,
    };
    let registry = SessionRegistry::new(stage.as_session(), backstage);
    let (handle, task) = EventActor::spawn(
        test_settings(role),
        Arc::new(store.clone()),
        registry,
        CancellationToken::new(),
    );
    handle.join().await.unwrap();
    (handle, task, stage)
}

/// Every `privateCall` value written since the subscription's initial one.
fn drain_calls(subscription: &mut StoreSubscription) -> Vec<Option<PrivateCall>> {
    let mut seen = Vec::new();
    while let Ok(value) = subscription.receiver.try_recv() {
        seen.push(value.map(|v| serde_json::from_value::<PrivateCall>(v).unwrap()));
    }
    seen
}

fn call_with(target: CallTarget) -> Option<PrivateCall> {
    Some(PrivateCall::new(target, None))
}

async fn producer_with_stage_roles(
    store: &MemoryStore,
) -> (EventActorHandle, JoinHandle<()>, StoreSubscription) {
    let (handle, task, stage) = spawn_joined(PrivilegedRole::Producer, store).await;
    stage.emit_stream_created(stream_for("host", "host-1")).await;
    stage
        .emit_stream_created(stream_for("celebrity", "cel-1"))
        .await;

    let mut subscription = store.subscribe("event/privateCall").await.unwrap();
    assert_eq!(subscription.receiver.recv().await.unwrap(), None);
    (handle, task, subscription)
}

#[tokio::test]
async fn test_connect_same_target_ends_call() {
    let store = MemoryStore::new();
    let (handle, task, mut subscription) = producer_with_stage_roles(&store).await;

    let report = handle
        .connect_private_call(CallTarget::Host, None)
        .await
        .unwrap();
    assert!(report.is_clean(), "failed steps: {:?}", report.failed_steps);
    assert_eq!(
        handle.get_state().await.unwrap().private_call,
        call_with(CallTarget::Host)
    );

    handle
        .connect_private_call(CallTarget::Host, None)
        .await
        .unwrap();
    assert_eq!(handle.get_state().await.unwrap().private_call, None);
    assert_eq!(
        drain_calls(&mut subscription),
        vec![call_with(CallTarget::Host), None]
    );

    handle.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_switching_partner_passes_through_null() {
    let store = MemoryStore::new();
    let (handle, task, mut subscription) = producer_with_stage_roles(&store).await;

    handle
        .connect_private_call(CallTarget::Host, None)
        .await
        .unwrap();
    handle
        .connect_private_call(CallTarget::Celebrity, None)
        .await
        .unwrap();

    let seen = drain_calls(&mut subscription);
    assert_eq!(
        seen,
        vec![
            call_with(CallTarget::Host),
            None,
            call_with(CallTarget::Celebrity)
        ]
    );
    // No two calls back to back
    assert!(seen
        .windows(2)
        .all(|pair| !matches!(pair, [Some(_), Some(_)])));

    handle.end_private_call().await.unwrap();
    assert_eq!(store.read("event/privateCall").await.unwrap(), None);

    handle.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_call_ends_when_partner_leaves_event() {
    let store = MemoryStore::new();
    let (handle, task, _subscription) = producer_with_stage_roles(&store).await;
    store.write("event/celebrityActive", json!(true)).await.unwrap();

    handle
        .connect_private_call(CallTarget::Celebrity, None)
        .await
        .unwrap();
    store
        .write("event/celebrityActive", json!(false))
        .await
        .unwrap();

    wait_for_state(&handle, |s| s.private_call.is_none()).await;
    assert_eq!(store.read("event/privateCall").await.unwrap(), None);

    handle.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_active_fan_call_requires_fan_id() {
    let store = MemoryStore::new();
    let (handle, task, _subscription) = producer_with_stage_roles(&store).await;

    let err = handle
        .connect_private_call(CallTarget::ActiveFan, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ScError::FanNotFound(_)));
    assert_eq!(handle.get_state().await.unwrap().private_call, None);

    handle.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_host_follows_stage_calls_only() {
    let store = MemoryStore::new();
    let (handle, task, stage) = spawn_joined(PrivilegedRole::Host, &store).await;
    stage
        .emit_stream_created(stream_for("producer", "prod-1"))
        .await;

    let fan_call = PrivateCall::new(CallTarget::ActiveFan, Some(FanId::new("7")));
    store
        .write("event/privateCall", serde_json::to_value(&fan_call).unwrap())
        .await
        .unwrap();
    let host_call = PrivateCall::new(CallTarget::Host, None);
    store
        .write("event/privateCall", serde_json::to_value(&host_call).unwrap())
        .await
        .unwrap();

    let state = wait_for_state(&handle, |s| s.private_call.is_some()).await;
    assert_eq!(state.private_call, Some(host_call));

    store
        .write("event/privateCall", Value::Null)
        .await
        .unwrap();
    wait_for_state(&handle, |s| s.private_call.is_none()).await;

    handle.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_fan_leaving_line_ends_call_and_releases_stream() {
    let store = store_with_fans(&[("7", "Ada", "fan-7")]).await;
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
    backstage.emit_stream_created(fan_stream("7", "fan-7")).await;
    wait_for_state(&handle, |s| s.queue.len() == 1).await;

    let report = handle
        .connect_private_call(CallTarget::ActiveFan, Some(FanId::new("7")))
        .await
        .unwrap();
    assert!(report.is_clean(), "failed steps: {:?}", report.failed_steps);
    assert!(backstage.calls().contains(&SessionCall::Subscribe {
        stream_id: StreamId::new("fan-7"),
        options: SubscribeOptions::FULL,
    }));

    let mut events = handle.subscribe_events();
    store.remove("event/activeFans/7").await.unwrap();
    wait_for_state(&handle, |s| s.private_call.is_none()).await;

    assert!(backstage
        .calls()
        .contains(&SessionCall::Unsubscribe(StreamId::new("fan-7"))));
    assert_eq!(store.read("event/privateCall").await.unwrap(), None);

    let mut end_report = None;
    while let Ok(event) = events.try_recv() {
        if let ControllerEvent::WorkflowReport { report } = event {
            if report.workflow == "end_private_call" {
                end_report = Some(report);
            }
        }
    }
    let end_report = end_report.unwrap();
    assert!(
        end_report.is_clean(),
        "failed steps: {:?}",
        end_report.failed_steps
    );

    handle.cancel();
    task.await.unwrap();
}
