//! `EventActor`: one task that owns the [`Engine`] of a joined event.
//!
//! The run loop serializes five inputs: cancellation, provider callbacks,
//! store notifications, countdown ticks and the handle mailbox. Nothing
//! inside the loop blocks; timers and the heartbeat run in their own tasks
//! and post back.

use super::messages::EventMessage;
use super::metrics::MailboxMonitor;
use crate::chat::{ChatContent, ChatMessage};
use crate::countdown::CountdownTick;
use crate::engine::{
    ControllerEvent, Engine, EngineInputs, EngineSettings, EventState,
};
use crate::errors::ScError;
use crate::gateway::{GatewayEvent, SessionRegistry, GATEWAY_EVENT_BUFFER};
use crate::participants::ParticipantProperty;
use crate::roles::{CallTarget, FanSeat, PrivilegedRole, UserRole};
use crate::screen_share::ScreenShareAction;
use crate::store::{SharedStore, StoreNotification};
use crate::workflow::WorkflowReport;
use common::types::FanId;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Default channel buffer size for the event mailbox.
const EVENT_CHANNEL_BUFFER: usize = 256;

/// Handle to an `EventActor`.
#[derive(Clone)]
pub struct EventActorHandle {
    sender: mpsc::Sender<EventMessage>,
    events: broadcast::Sender<ControllerEvent>,
    cancel_token: CancellationToken,
    role: PrivilegedRole,
}

impl EventActorHandle {
    #[must_use]
    pub fn role(&self) -> PrivilegedRole {
        self.role
    }

    /// Send a message and wait for the actor's reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EventMessage,
    ) -> Result<T, ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))
    }

    /// Take the role's presence lock, connect and publish.
    ///
    /// Fails with [`ScError::LockConflict`] if another instance holds a
    /// fresh presence record for the role.
    pub async fn join(&self) -> Result<(), ScError> {
        self.request(|respond_to| EventMessage::Join { respond_to })
            .await?
    }

    /// Stop the heartbeat, release the role and disconnect.
    pub async fn leave(&self) -> Result<(), ScError> {
        self.request(|respond_to| EventMessage::Leave { respond_to })
            .await?
    }

    pub async fn get_state(&self) -> Result<EventState, ScError> {
        self.request(|respond_to| EventMessage::GetState { respond_to })
            .await
    }

    /// Producer: move a fan from the line to the backstage seat.
    pub async fn send_to_backstage(&self, fan_id: FanId) -> Result<WorkflowReport, ScError> {
        self.request(|respond_to| EventMessage::SendToBackstage { fan_id, respond_to })
            .await?
    }

    /// Producer: move the backstage fan on stage.
    pub async fn send_to_stage(&self) -> Result<WorkflowReport, ScError> {
        self.request(|respond_to| EventMessage::SendToStage { respond_to })
            .await?
    }

    /// Producer: remove the fan holding `seat` from its feed.
    pub async fn kick_fan(&self, seat: FanSeat) -> Result<WorkflowReport, ScError> {
        self.request(|respond_to| EventMessage::KickFan { seat, respond_to })
            .await?
    }

    /// Producer: drop a fan's backstage connection.
    pub async fn force_fan_disconnect(&self, fan_id: FanId) -> Result<(), ScError> {
        self.request(|respond_to| EventMessage::ForceFanDisconnect { fan_id, respond_to })
            .await?
    }

    /// Producer: start a private call, or end it if `target` is already in call.
    pub async fn connect_private_call(
        &self,
        target: CallTarget,
        fan_id: Option<FanId>,
    ) -> Result<WorkflowReport, ScError> {
        self.request(|respond_to| EventMessage::ConnectPrivateCall {
            target,
            fan_id,
            respond_to,
        })
        .await?
    }

    pub async fn end_private_call(&self) -> Result<WorkflowReport, ScError> {
        self.request(|respond_to| EventMessage::EndPrivateCall { respond_to })
            .await?
    }

    /// Producer: start or stop a screen share on `target`.
    pub async fn screen_share(
        &self,
        action: ScreenShareAction,
        target: UserRole,
    ) -> Result<WorkflowReport, ScError> {
        self.request(|respond_to| EventMessage::ScreenShare {
            action,
            target,
            respond_to,
        })
        .await?
    }

    /// Producer: flip a participant's audio, video or volume.
    pub async fn toggle_participant_property(
        &self,
        role: UserRole,
        property: ParticipantProperty,
    ) -> Result<(), ScError> {
        self.request(|respond_to| EventMessage::ToggleParticipantProperty {
            role,
            property,
            respond_to,
        })
        .await?
    }

    pub async fn send_chat(
        &self,
        chat_id: impl Into<String>,
        content: ChatContent,
    ) -> Result<ChatMessage, ScError> {
        let chat_id = chat_id.into();
        self.request(|respond_to| EventMessage::SendChat {
            chat_id,
            content,
            respond_to,
        })
        .await?
    }

    pub async fn start_fan_chat(&self, fan_id: FanId) -> Result<(), ScError> {
        self.request(|respond_to| EventMessage::StartFanChat { fan_id, respond_to })
            .await?
    }

    pub async fn start_all_chats(&self) -> Result<(), ScError> {
        self.request(|respond_to| EventMessage::StartAllChats { respond_to })
            .await
    }

    /// Returns `false` if no chat with that id is open.
    pub async fn minimize_chat(
        &self,
        chat_id: impl Into<String>,
        minimized: bool,
    ) -> Result<bool, ScError> {
        let chat_id = chat_id.into();
        self.request(|respond_to| EventMessage::MinimizeChat {
            chat_id,
            minimized,
            respond_to,
        })
        .await
    }

    /// Returns `false` if no chat with that id is open.
    pub async fn display_chat(
        &self,
        chat_id: impl Into<String>,
        displayed: bool,
    ) -> Result<bool, ScError> {
        let chat_id = chat_id.into();
        self.request(|respond_to| EventMessage::DisplayChat {
            chat_id,
            displayed,
            respond_to,
        })
        .await
    }

    /// Producer: broadcast `prepareGoLive` and start the go-live countdown.
    pub async fn go_live(&self) -> Result<(), ScError> {
        self.request(|respond_to| EventMessage::GoLive { respond_to })
            .await?
    }

    /// Producer: broadcast `finishEvent` and close the show.
    pub async fn finish_event(&self) -> Result<(), ScError> {
        self.request(|respond_to| EventMessage::FinishEvent { respond_to })
            .await?
    }

    /// Receive UI events from now on.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Cancel the actor. It leaves the event before exiting.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Owns the engine and runs its input loop.
pub struct EventActor {
    engine: Engine,
    receiver: mpsc::Receiver<EventMessage>,
    gateway_rx: mpsc::Receiver<GatewayEvent>,
    store_rx: mpsc::UnboundedReceiver<StoreNotification>,
    countdown_rx: mpsc::UnboundedReceiver<CountdownTick>,
    cancel_token: CancellationToken,
    mailbox: MailboxMonitor,
}

impl EventActor {
    /// Spawn a new event actor.
    ///
    /// Returns a handle and the task join handle. The actor does not join the
    /// event until [`EventActorHandle::join`] is called.
    pub fn spawn(
        settings: EngineSettings,
        store: Arc<dyn SharedStore>,
        registry: SessionRegistry,
        cancel_token: CancellationToken,
    ) -> (EventActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        let (gateway_tx, gateway_rx) = mpsc::channel(GATEWAY_EVENT_BUFFER);
        let (store_tx, store_rx) = mpsc::unbounded_channel();
        let (countdown_tx, countdown_rx) = mpsc::unbounded_channel();

        let role = settings.role;
        let actor_id = settings.event_root.clone();
        let engine = Engine::new(
            settings,
            store,
            registry,
            EngineInputs {
                gateway: gateway_tx,
                store: store_tx,
                countdown: countdown_tx,
            },
            cancel_token.clone(),
        );
        let events = engine.event_sender();

        let actor = Self {
            engine,
            receiver,
            gateway_rx,
            store_rx,
            countdown_rx,
            cancel_token: cancel_token.clone(),
            mailbox: MailboxMonitor::new(actor_id),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = EventActorHandle {
            sender,
            events,
            cancel_token,
            role,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "sc.actor.event", fields(role = %self.engine.role()))]
    async fn run(mut self) {
        info!(
            target: "sc.actor.event",
            role = %self.engine.role(),
            "EventActor started"
        );

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "sc.actor.event",
                        "EventActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                Some(event) = self.gateway_rx.recv() => {
                    self.engine.handle_gateway_event(event).await;
                }

                Some(notification) = self.store_rx.recv() => {
                    self.engine.handle_store_notification(notification).await;
                }

                Some(tick) = self.countdown_rx.recv() => {
                    self.engine.handle_countdown_tick(tick).await;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message).await;
                            self.mailbox.record(self.receiver.len());
                        }
                        None => {
                            info!(
                                target: "sc.actor.event",
                                "EventActor channel closed, exiting"
                            );
                            self.graceful_shutdown().await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "sc.actor.event",
            role = %self.engine.role(),
            messages_processed = self.mailbox.messages_processed(),
            "EventActor stopped"
        );
    }

    async fn graceful_shutdown(&mut self) {
        if let Err(e) = self.engine.leave().await {
            warn!(target: "sc.actor.event", error = %e, "Leave during shutdown failed");
        }
    }

    /// Surface a failed command as a notice.
    fn report<T>(&self, result: &Result<T, ScError>) {
        if let Err(e) = result {
            self.engine.notify(e);
        }
    }

    /// Surface a workflow outcome: the report on success, a notice on failure.
    fn report_workflow(&self, result: &Result<WorkflowReport, ScError>) {
        match result {
            Ok(report) => self.engine.publish_report(report.clone()),
            Err(e) => self.engine.notify(e),
        }
    }

    async fn handle_message(&mut self, message: EventMessage) {
        match message {
            EventMessage::Join { respond_to } => {
                // Join raises its own notices
                let result = self.engine.join().await;
                let _ = respond_to.send(result);
            }

            EventMessage::Leave { respond_to } => {
                let result = self.engine.leave().await;
                let _ = respond_to.send(result);
            }

            EventMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.engine.get_state());
            }

            EventMessage::SendToBackstage { fan_id, respond_to } => {
                let result = self.engine.send_to_backstage(&fan_id).await;
                self.report_workflow(&result);
                let _ = respond_to.send(result);
            }

            EventMessage::SendToStage { respond_to } => {
                let result = self.engine.send_to_stage().await;
                self.report_workflow(&result);
                let _ = respond_to.send(result);
            }

            EventMessage::KickFan { seat, respond_to } => {
                let result = self.engine.kick_fan_from_feed(seat).await;
                self.report_workflow(&result);
                let _ = respond_to.send(result);
            }

            EventMessage::ForceFanDisconnect { fan_id, respond_to } => {
                let result = self.engine.force_fan_disconnect(&fan_id).await;
                self.report(&result);
                let _ = respond_to.send(result);
            }

            EventMessage::ConnectPrivateCall {
                target,
                fan_id,
                respond_to,
            } => {
                let result = self.engine.connect_private_call(target, fan_id).await;
                self.report_workflow(&result);
                let _ = respond_to.send(result);
            }

            EventMessage::EndPrivateCall { respond_to } => {
                let result = match self
                    .engine
                    .require_role(PrivilegedRole::Producer, "end private call")
                {
                    Ok(()) => Ok(self.engine.end_private_call().await),
                    Err(e) => Err(e),
                };
                self.report_workflow(&result);
                let _ = respond_to.send(result);
            }

            EventMessage::ScreenShare {
                action,
                target,
                respond_to,
            } => {
                let result = self.engine.screen_share(action, target).await;
                self.report_workflow(&result);
                let _ = respond_to.send(result);
            }

            EventMessage::ToggleParticipantProperty {
                role,
                property,
                respond_to,
            } => {
                let result = self
                    .engine
                    .toggle_participant_property(role, property)
                    .await;
                self.report(&result);
                let _ = respond_to.send(result);
            }

            EventMessage::SendChat {
                chat_id,
                content,
                respond_to,
            } => {
                let result = self.engine.send_chat(&chat_id, content).await;
                self.report(&result);
                let _ = respond_to.send(result);
            }

            EventMessage::StartFanChat { fan_id, respond_to } => {
                let result = self.engine.start_fan_chat(&fan_id);
                self.report(&result);
                let _ = respond_to.send(result);
            }

            EventMessage::StartAllChats { respond_to } => {
                self.engine.start_all_chats();
                let _ = respond_to.send(());
            }

            EventMessage::MinimizeChat {
                chat_id,
                minimized,
                respond_to,
            } => {
                let _ = respond_to.send(self.engine.chats.minimize(&chat_id, minimized));
            }

            EventMessage::DisplayChat {
                chat_id,
                displayed,
                respond_to,
            } => {
                let _ = respond_to.send(self.engine.chats.display(&chat_id, displayed));
            }

            EventMessage::GoLive { respond_to } => {
                let result = self.engine.go_live().await;
                self.report(&result);
                let _ = respond_to.send(result);
            }

            EventMessage::FinishEvent { respond_to } => {
                let result = self.engine.finish_event().await;
                self.report(&result);
                let _ = respond_to.send(result);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::engine::EventStatus;
    use crate::gateway::LoopbackSession;
    use crate::roles::SessionName;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn spawn_actor(
        role: PrivilegedRole,
        store: &MemoryStore,
    ) -> (EventActorHandle, JoinHandle<()>) {
        let registry = SessionRegistry::new(
            Arc::new(LoopbackSession::new(SessionName::Stage)),
            Some(Arc::new(LoopbackSession::new(SessionName::Backstage))),
        );
        EventActor::spawn(
            EngineSettings::new(role),
            Arc::new(store.clone()),
            registry,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_handle_join_and_state() {
        let store = MemoryStore::new();
        let (handle, task) = spawn_actor(PrivilegedRole::Producer, &store);

        handle.join().await.unwrap();
        let state = handle.get_state().await.unwrap();
        assert!(state.joined);
        assert_eq!(state.role, PrivilegedRole::Producer);
        assert_eq!(state.status, EventStatus::Preshow);

        handle.leave().await.unwrap();
        handle.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_leaves_event() {
        let store = MemoryStore::new();
        let (handle, task) = spawn_actor(PrivilegedRole::Celebrity, &store);
        handle.join().await.unwrap();
        assert_eq!(
            store.read("event/celebrityActive").await.unwrap(),
            Some(json!(true))
        );

        handle.cancel();
        task.await.unwrap();

        assert!(handle.is_cancelled());
        assert_eq!(store.read("event/celebrityActive").await.unwrap(), None);
        assert!(handle.get_state().await.is_err());
    }

    #[tokio::test]
    async fn test_failed_command_is_reported_as_notice() {
        let store = MemoryStore::new();
        let (handle, task) = spawn_actor(PrivilegedRole::Host, &store);
        let mut events = handle.subscribe_events();

        let err = handle.send_to_stage().await.unwrap_err();
        assert!(matches!(err, ScError::NotPermitted(_)));
        assert!(matches!(
            events.recv().await.unwrap(),
            ControllerEvent::Notice { .. }
        ));

        handle.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_chat_window_reports_false() {
        let store = MemoryStore::new();
        let (handle, task) = spawn_actor(PrivilegedRole::Producer, &store);
        assert!(!handle.minimize_chat("nobody", true).await.unwrap());
        handle.start_all_chats().await.unwrap();
        handle.cancel();
        task.await.unwrap();
    }
}
