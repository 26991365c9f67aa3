//! Screen-share arbitration across the producer and stage tiers.
//!
//! Verifies:
//! - A producer share preempts the current sharer before capture starts
//! - Asking a remote role to share leaves the slot requested
//! - Missing capture support is reported and clears the owner
//! - A stage tier refuses a share while another role owns the slot
//! - A provider capture failure clears the owner and tells the producer
//! - Capture stops when the owner cannot be published

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use common::types::ConnectionId;
use sc_test_utils::{
    producer_connection, stream_for, test_settings, wait_for_state, FlakyStore, MockMediaSession,
    SessionCall, SessionOp,
};
use serde_json::json;
use stage_controller::actors::{EventActor, EventActorHandle};
use stage_controller::engine::ControllerEvent;
use stage_controller::errors::NoticeKind;
use stage_controller::gateway::{GatewayEvent, SessionRegistry};
use stage_controller::roles::{PrivilegedRole, SessionName, UserRole};
use stage_controller::screen_share::{ScreenShareAction, ScreenShareState};
use stage_controller::signaling::Signal;
use stage_controller::store::{MemoryStore, SharedStore};
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

#[tokio::test]
async fn test_producer_share_ends_current_sharer_first() {
    let store = MemoryStore::new();
    let (handle, task, stage) = spawn_joined(PrivilegedRole::Producer, &store).await;
    stage.emit_stream_created(stream_for("host", "host-1")).await;
    store.write("event/screen", json!("host")).await.unwrap();
    wait_for_state(&handle, |s| {
        s.screen == ScreenShareState::Active {
            owner: UserRole::Host,
        }
    })
    .await;

    let report = handle
        .screen_share(ScreenShareAction::Start, UserRole::Producer)
        .await
        .unwrap();
    assert!(report.is_clean(), "failed steps: {:?}", report.failed_steps);

    let end_host = stage
        .position(|c| {
            matches!(c, SessionCall::Signal { to: Some(to), .. } if to.as_str() == "conn-host-1")
                && c.signal() == Some(Signal::EndScreenShare)
        })
        .unwrap();
    let capture = stage
        .position(|c| *c == SessionCall::StartScreenShare)
        .unwrap();
    assert!(end_host < capture);

    assert_eq!(
        store.read("event/screen").await.unwrap(),
        Some(json!("producer"))
    );
    let state = handle.get_state().await.unwrap();
    assert_eq!(
        state.screen,
        ScreenShareState::Active {
            owner: UserRole::Producer
        }
    );

    handle.cancel();
    task.await.unwrap();
    // Leaving stops the capture and clears the owner
    assert!(stage.calls().contains(&SessionCall::EndScreenShare));
    assert_eq!(store.read("event/screen").await.unwrap(), None);
}

#[tokio::test]
async fn test_producer_requests_remote_share() {
    let store = MemoryStore::new();
    let (handle, task, stage) = spawn_joined(PrivilegedRole::Producer, &store).await;
    stage
        .emit_stream_created(stream_for("celebrity", "cel-1"))
        .await;

    handle
        .screen_share(ScreenShareAction::Start, UserRole::Celebrity)
        .await
        .unwrap();

    assert!(stage.signals().contains(&(
        Signal::StartScreenShare,
        Some(ConnectionId::new("conn-cel-1"))
    )));
    assert!(stage.calls_of(SessionOp::StartScreenShare).is_empty());
    let state = handle.get_state().await.unwrap();
    assert_eq!(
        state.screen,
        ScreenShareState::Requested {
            target: UserRole::Celebrity
        }
    );

    handle.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_missing_capture_support_is_reported() {
    let store = MemoryStore::new();
    let (handle, task, stage) = spawn_joined(PrivilegedRole::Producer, &store).await;
    stage.fail(SessionOp::StartScreenShare);
    let mut events = handle.subscribe_events();

    let report = handle
        .screen_share(ScreenShareAction::Start, UserRole::Producer)
        .await
        .unwrap();
    assert!(report.failed("start_local_capture"));
    assert_eq!(store.read("event/screen").await.unwrap(), None);

    let mut saw_notice = false;
    while let Ok(event) = events.try_recv() {
        if matches!(
            event,
            ControllerEvent::Notice {
                kind: NoticeKind::Dismissible,
                ..
            }
        ) {
            saw_notice = true;
        }
    }
    assert!(saw_notice);

    handle.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_host_refuses_share_while_slot_is_taken() {
    let store = MemoryStore::new();
    let (handle, task, stage) = spawn_joined(PrivilegedRole::Host, &store).await;
    stage.emit_stream_created(stream_for("producer", "prod-1")).await;
    store.write("event/screen", json!("celebrity")).await.unwrap();
    wait_for_state(&handle, |s| {
        s.screen == ScreenShareState::Active {
            owner: UserRole::Celebrity,
        }
    })
    .await;

    stage
        .emit_signal(Some(producer_connection()), &Signal::StartScreenShare)
        .await;
    wait_for_state(&handle, |_| {
        stage.signals().contains(&(
            Signal::ErrorScreenShare,
            Some(ConnectionId::new("conn-prod-1")),
        ))
    })
    .await;
    assert!(stage.calls_of(SessionOp::StartScreenShare).is_empty());
    assert_eq!(
        store.read("event/screen").await.unwrap(),
        Some(json!("celebrity"))
    );

    handle.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_host_shares_on_producer_request() {
    let store = MemoryStore::new();
    let (handle, task, stage) = spawn_joined(PrivilegedRole::Host, &store).await;

    stage
        .emit_signal(Some(producer_connection()), &Signal::StartScreenShare)
        .await;
    let state = wait_for_state(&handle, |s| {
        s.screen
            == ScreenShareState::Active {
                owner: UserRole::Host,
            }
    })
    .await;
    assert!(state.hidden_cameras.contains(&UserRole::Host));
    assert_eq!(store.read("event/screen").await.unwrap(), Some(json!("host")));
    assert_eq!(stage.calls_of(SessionOp::StartScreenShare).len(), 1);

    stage
        .emit_signal(Some(producer_connection()), &Signal::EndScreenShare)
        .await;
    wait_for_state(&handle, |s| s.screen == ScreenShareState::Idle).await;
    assert_eq!(store.read("event/screen").await.unwrap(), None);

    handle.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_provider_capture_failure_clears_owner() {
    let store = MemoryStore::new();
    let (handle, task, stage) = spawn_joined(PrivilegedRole::Celebrity, &store).await;
    stage.emit_stream_created(stream_for("producer", "prod-1")).await;

    stage
        .emit_signal(Some(producer_connection()), &Signal::StartScreenShare)
        .await;
    wait_for_state(&handle, |s| {
        s.screen
            == ScreenShareState::Active {
                owner: UserRole::Celebrity,
            }
    })
    .await;

    stage
        .emit(GatewayEvent::ScreenShareError {
            session: SessionName::Stage,
            message: "capture stopped".to_string(),
        })
        .await;
    wait_for_state(&handle, |s| s.screen == ScreenShareState::Idle).await;
    assert_eq!(store.read("event/screen").await.unwrap(), None);
    assert!(stage.signals().contains(&(
        Signal::ErrorScreenShare,
        Some(ConnectionId::new("conn-prod-1"))
    )));

    handle.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_capture_stops_when_owner_cannot_be_published() {
    let store = FlakyStore::new(MemoryStore::new());
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
    store.fail_writes_to("event/screen");

    let report = handle
        .screen_share(ScreenShareAction::Start, UserRole::Producer)
        .await
        .unwrap();
    assert!(report.failed("start_local_capture"));

    let start = stage
        .position(|c| *c == SessionCall::StartScreenShare)
        .unwrap();
    let end = stage
        .position(|c| *c == SessionCall::EndScreenShare)
        .unwrap();
    assert!(start < end);

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.screen, ScreenShareState::Idle);
    assert!(!state.hidden_cameras.contains(&UserRole::Producer));
    assert_eq!(store.inner().read("event/screen").await.unwrap(), None);

    store.heal();
    handle.cancel();
    task.await.unwrap();
    assert_eq!(stage.calls_of(SessionOp::StartScreenShare).len(), 1);
}
