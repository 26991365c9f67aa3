//! Producer remote controls over seated participants.
//!
//! Verifies:
//! - A delivered mute signal flips the participant's audio flag
//! - A signal the provider rejects leaves the flag untouched

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use sc_test_utils::{stream_for, test_settings, wait_for_state, MockMediaSession, SessionOp};
use stage_controller::actors::{EventActor, EventActorHandle};
use stage_controller::engine::EventState;
use stage_controller::gateway::SessionRegistry;
use stage_controller::participants::{ParticipantProperty, ParticipantState, ParticipantStatus};
use stage_controller::roles::{PrivilegedRole, SessionName, UserRole};
use stage_controller::signaling::{Signal, Toggle};
use stage_controller::store::MemoryStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

async fn spawn_producer_with_host() -> (EventActorHandle, JoinHandle<()>, MockMediaSession) {
    let stage = MockMediaSession::new(SessionName::Stage);
    let backstage = MockMediaSession::new(SessionName::Backstage);
    let registry = SessionRegistry::new(stage.as_session(), Some(backstage.as_session()));
    let (handle, task) = EventActor::spawn(
        test_settings(PrivilegedRole::Producer),
        Arc::new(MemoryStore::new()),
        registry,
        CancellationToken::new(),
    );
    handle.join().await.unwrap();
    stage.emit_stream_created(stream_for("host", "host-1")).await;
    wait_for_state(&handle, |s| {
        host(s).is_some_and(|p| p.status == ParticipantStatus::Connected)
    })
    .await;
    (handle, task, stage)
}

fn host(state: &EventState) -> Option<&ParticipantState> {
    state.participants.iter().find(|p| p.role == UserRole::Host)
}

#[tokio::test]
async fn test_mute_is_recorded_once_delivered() {
    let (handle, task, stage) = spawn_producer_with_host().await;

    handle
        .toggle_participant_property(UserRole::Host, ParticipantProperty::Audio)
        .await
        .unwrap();

    assert!(stage
        .signals()
        .iter()
        .any(|(s, _)| *s == Signal::MuteAudio { mute: Toggle::On }));
    let state = handle.get_state().await.unwrap();
    assert!(!host(&state).unwrap().audio);

    handle.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_rejected_signal_keeps_audio_flag() {
    let (handle, task, stage) = spawn_producer_with_host().await;
    stage.fail(SessionOp::Signal);

    let result = handle
        .toggle_participant_property(UserRole::Host, ParticipantProperty::Audio)
        .await;
    assert!(result.is_err());
    let state = handle.get_state().await.unwrap();
    assert!(host(&state).unwrap().audio);

    // The next attempt still asks to mute
    stage.recover(SessionOp::Signal);
    handle
        .toggle_participant_property(UserRole::Host, ParticipantProperty::Audio)
        .await
        .unwrap();
    assert_eq!(
        stage.signals().last().map(|(s, _)| s.clone()),
        Some(Signal::MuteAudio { mute: Toggle::On })
    );
    let state = handle.get_state().await.unwrap();
    assert!(!host(&state).unwrap().audio);

    handle.cancel();
    task.await.unwrap();
}
