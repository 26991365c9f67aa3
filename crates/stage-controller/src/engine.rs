//! Event engine.
//!
//! [`Engine`] owns every piece of per-event state: the session registry, the
//! presence lock, participants, the fan queue, the private call, the screen
//! share slot and the chats. It is driven from a single task (see
//! [`crate::actors::EventActor`]), so nothing in here locks. Gateway events,
//! store notifications and countdown ticks are dispatched here; UI commands
//! arrive through the actor mailbox and call the `pub(crate)` operations
//! defined across the component modules.

use crate::chat::{ChatMessage, ChatRouter, ChatSummary};
use crate::config::Config;
use crate::countdown::{CountdownKind, CountdownTick, Countdowns};
use crate::errors::{NoticeKind, ScError};
use crate::fans::{ActiveFan, FanQueue};
use crate::gateway::{
    Connection, Connectivity, GatewayEvent, PublishOptions, SessionRegistry, StreamHandle,
    SubscribeOptions,
};
use crate::participants::{ParticipantState, Participants};
use crate::presence::{now_ms, PresenceManager};
use crate::private_call::{PrivateCall, PrivateCallArbiter};
use crate::roles::{PrivilegedRole, SessionName, UserRole};
use crate::screen_share::{ScreenShareCoordinator, ScreenShareState};
use crate::signaling::{Signal, WireSignal};
use crate::store::{
    decode, EventPaths, ListenerSet, SharedStore, StoreNotification, StoreWatch,
};
use crate::workflow::WorkflowReport;
use common::types::ConnectionId;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Buffer of the UI event broadcast. Slow subscribers lag and skip.
pub const EVENT_BROADCAST_BUFFER: usize = 256;

/// Lifecycle of the show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventStatus {
    NotStarted,
    Preshow,
    Live,
    Closed,
}

/// Engine settings derived from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub role: PrivilegedRole,
    pub event_root: String,
    pub user_id: String,
    pub display_name: String,
    pub producer_host: bool,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub stage_countdown_seconds: u32,
    pub go_live_countdown_seconds: u32,
}

impl EngineSettings {
    /// Settings with the configuration defaults for `role`.
    #[must_use]
    pub fn new(role: PrivilegedRole) -> Self {
        Self {
            role,
            event_root: crate::config::DEFAULT_EVENT_ROOT.to_string(),
            user_id: format!("{}-local", role.as_str()),
            display_name: crate::config::DEFAULT_DISPLAY_NAME.to_string(),
            producer_host: false,
            heartbeat_interval: Duration::from_secs(
                crate::config::DEFAULT_HEARTBEAT_INTERVAL_SECONDS,
            ),
            heartbeat_timeout: Duration::from_secs(
                crate::config::DEFAULT_HEARTBEAT_INTERVAL_SECONDS,
            ),
            stage_countdown_seconds: countdown_seconds(
                crate::config::DEFAULT_STAGE_COUNTDOWN_SECONDS,
            ),
            go_live_countdown_seconds: countdown_seconds(
                crate::config::DEFAULT_GO_LIVE_COUNTDOWN_SECONDS,
            ),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            role: config.role,
            event_root: config.event_root.clone(),
            user_id: config.user_id.clone(),
            display_name: config.display_name.clone(),
            producer_host: config.producer_host,
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_timeout: config.heartbeat_timeout(),
            stage_countdown_seconds: countdown_seconds(config.stage_countdown_seconds),
            go_live_countdown_seconds: countdown_seconds(config.go_live_countdown_seconds),
        }
    }
}

fn countdown_seconds(seconds: u64) -> u32 {
    u32::try_from(seconds).unwrap_or(u32::MAX)
}

/// What the engine tells the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ControllerEvent {
    Notice {
        kind: NoticeKind,
        message: String,
    },
    Connectivity {
        session: SessionName,
        state: Connectivity,
    },
    StageCountdown {
        remaining: u32,
    },
    GoLiveCountdown {
        remaining: u32,
    },
    /// A fan is moving between backstage and stage; promotion controls are locked.
    FanTransition {
        active: bool,
    },
    QueueChanged {
        fans: Vec<ActiveFan>,
    },
    PrivateCallChanged {
        call: Option<PrivateCall>,
    },
    ScreenChanged {
        owner: Option<UserRole>,
        hidden: Vec<UserRole>,
    },
    ChatMessage {
        chat_id: String,
        message: ChatMessage,
    },
    WorkflowReport {
        report: WorkflowReport,
    },
    StatusChanged {
        status: EventStatus,
    },
}

/// Point-in-time view of the event for the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventState {
    pub role: PrivilegedRole,
    pub joined: bool,
    pub status: EventStatus,
    /// Seconds since the show went live.
    pub elapsed_seconds: Option<i64>,
    pub participants: Vec<ParticipantState>,
    pub queue: Vec<ActiveFan>,
    pub private_call: Option<PrivateCall>,
    pub screen: ScreenShareState,
    pub hidden_cameras: Vec<UserRole>,
    pub chats: Vec<ChatSummary>,
    pub fan_transition: bool,
}

/// Senders the engine hands to the tasks that feed it.
pub struct EngineInputs {
    pub gateway: mpsc::Sender<GatewayEvent>,
    pub store: mpsc::UnboundedSender<StoreNotification>,
    pub countdown: mpsc::UnboundedSender<CountdownTick>,
}

/// All state of one event, as seen by the local privileged role.
pub struct Engine {
    pub(crate) settings: EngineSettings,
    pub(crate) paths: EventPaths,
    pub(crate) store: Arc<dyn SharedStore>,
    pub(crate) registry: SessionRegistry,
    pub(crate) presence: PresenceManager,
    pub(crate) listeners: ListenerSet,
    pub(crate) participants: Participants,
    pub(crate) fans: FanQueue,
    pub(crate) call: PrivateCallArbiter,
    pub(crate) screen: ScreenShareCoordinator,
    pub(crate) chats: ChatRouter,
    pub(crate) countdowns: Countdowns,
    /// Backstage connection that gets `joinHostNow` when the stage countdown ends.
    pub(crate) pending_stage_join: Option<ConnectionId>,
    pub(crate) fan_transition: bool,
    pub(crate) role_active: HashMap<PrivilegedRole, bool>,
    pub(crate) status: EventStatus,
    pub(crate) show_started_at: Option<i64>,
    pub(crate) joined: bool,
    events: broadcast::Sender<ControllerEvent>,
    gateway_events: mpsc::Sender<GatewayEvent>,
    cancel_token: CancellationToken,
}

impl Engine {
    #[must_use]
    pub fn new(
        settings: EngineSettings,
        store: Arc<dyn SharedStore>,
        registry: SessionRegistry,
        inputs: EngineInputs,
        cancel_token: CancellationToken,
    ) -> Self {
        let paths = EventPaths::new(settings.event_root.clone());
        let presence = PresenceManager::new(
            Arc::clone(&store),
            paths.clone(),
            settings.heartbeat_interval,
            settings.heartbeat_timeout,
        );
        let listeners = ListenerSet::new(Arc::clone(&store), inputs.store, &cancel_token);
        let countdowns = Countdowns::new(inputs.countdown, &cancel_token);
        let (events, _) = broadcast::channel(EVENT_BROADCAST_BUFFER);
        let local = settings.role;

        Self {
            participants: Participants::new(local, settings.producer_host),
            screen: ScreenShareCoordinator::new(local.user_role()),
            settings,
            paths,
            store,
            registry,
            presence,
            listeners,
            fans: FanQueue::new(),
            call: PrivateCallArbiter::new(),
            chats: ChatRouter::new(),
            countdowns,
            pending_stage_join: None,
            fan_transition: false,
            role_active: HashMap::new(),
            status: EventStatus::NotStarted,
            show_started_at: None,
            joined: false,
            events,
            gateway_events: inputs.gateway,
            cancel_token,
        }
    }

    #[must_use]
    pub fn role(&self) -> PrivilegedRole {
        self.settings.role
    }

    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// A new receiver for UI events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Sender side of the UI events, for handles that subscribe later.
    #[must_use]
    pub fn event_sender(&self) -> broadcast::Sender<ControllerEvent> {
        self.events.clone()
    }

    #[must_use]
    pub fn get_state(&self) -> EventState {
        EventState {
            role: self.settings.role,
            joined: self.joined,
            status: self.status,
            elapsed_seconds: self
                .show_started_at
                .map(|started| now_ms().saturating_sub(started) / 1000),
            participants: self.participants.iter().cloned().collect(),
            queue: self.fans.ordered().into_iter().cloned().collect(),
            private_call: self.call.current().cloned(),
            screen: self.screen.state(),
            hidden_cameras: self.screen.hidden_cameras().iter().copied().collect(),
            chats: self.chats.summaries(),
            fan_transition: self.fan_transition,
        }
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    pub(crate) fn require_role(&self, role: PrivilegedRole, operation: &str) -> Result<(), ScError> {
        if self.settings.role == role {
            Ok(())
        } else {
            Err(ScError::NotPermitted(format!(
                "{operation} requires the {role} role, running as {}",
                self.settings.role
            )))
        }
    }

    pub(crate) fn emit(&self, event: ControllerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Surface an error according to its notice kind.
    pub(crate) fn notify(&self, error: &ScError) {
        let kind = error.notice_kind();
        warn!(target: "sc.actor.event", error = %error, kind = error.label(), "Operation failed");
        if kind != NoticeKind::Silent {
            self.emit(ControllerEvent::Notice {
                kind,
                message: error.client_message(),
            });
        }
    }

    pub(crate) fn publish_report(&self, report: WorkflowReport) {
        if report.skipped {
            return;
        }
        if !report.is_clean() {
            warn!(
                target: "sc.workflow",
                workflow = report.workflow,
                failed = report.failed_steps.len(),
                "Workflow finished with failed steps"
            );
        }
        self.emit(ControllerEvent::WorkflowReport { report });
    }

    pub(crate) fn emit_queue(&self) {
        self.emit(ControllerEvent::QueueChanged {
            fans: self.fans.ordered().into_iter().cloned().collect(),
        });
    }

    pub(crate) fn emit_call(&self) {
        self.emit(ControllerEvent::PrivateCallChanged {
            call: self.call.current().cloned(),
        });
    }

    pub(crate) fn emit_screen(&self) {
        self.emit(ControllerEvent::ScreenChanged {
            owner: self.screen.owner(),
            hidden: self.screen.hidden_cameras().iter().copied().collect(),
        });
    }

    fn set_status(&mut self, status: EventStatus) {
        if self.status != status {
            info!(target: "sc.actor.event", from = ?self.status, to = ?status, "Event status changed");
            self.status = status;
            self.emit(ControllerEvent::StatusChanged { status });
        }
    }

    fn is_producer(&self) -> bool {
        self.settings.role == PrivilegedRole::Producer
    }

    // ------------------------------------------------------------------
    // Join / leave
    // ------------------------------------------------------------------

    /// Take the role, connect the sessions, publish and start listening.
    #[instrument(skip_all, name = "sc.actor.join", fields(role = %self.settings.role))]
    pub(crate) async fn join(&mut self) -> Result<(), ScError> {
        if self.joined {
            debug!(target: "sc.actor.event", "Already joined");
            return Ok(());
        }
        let role = self.settings.role;

        let outcome = match self.presence.try_acquire(role).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.notify(&e);
                return Err(e);
            }
        };
        if !outcome.granted {
            let err = ScError::LockConflict { role };
            self.notify(&err);
            return Err(err);
        }

        if let Err(e) = self.connect_and_publish().await {
            self.notify(&e);
            self.registry.teardown().await;
            if let Err(release) = self.presence.release(role, None).await {
                warn!(target: "sc.actor.event", error = %release, "Failed to release presence after connect failure");
            }
            return Err(e);
        }

        self.presence
            .start_heartbeat(role, &self.cancel_token)
            .await;
        self.attach_listeners().await;

        self.joined = true;
        self.set_status(EventStatus::Preshow);
        info!(target: "sc.actor.event", role = %role, "Joined event");
        Ok(())
    }

    async fn connect_and_publish(&mut self) -> Result<(), ScError> {
        let local = self.settings.role.user_role();
        self.registry.connect(&self.gateway_events).await?;
        self.participants.mark_connecting(local);

        match self.settings.role {
            PrivilegedRole::Producer => {
                self.registry
                    .publish(
                        SessionName::Stage,
                        PublishOptions {
                            audio: false,
                            video: self.settings.producer_host,
                        },
                    )
                    .await?;
                if self.registry.has_session(SessionName::Backstage) {
                    self.registry
                        .publish(
                            SessionName::Backstage,
                            PublishOptions {
                                audio: false,
                                video: false,
                            },
                        )
                        .await?;
                }
            }
            PrivilegedRole::Host | PrivilegedRole::Celebrity => {
                self.registry
                    .publish(
                        SessionName::Stage,
                        PublishOptions {
                            audio: true,
                            video: true,
                        },
                    )
                    .await?;
            }
        }
        self.participants.mark_connected(local, None);
        Ok(())
    }

    async fn attach_listeners(&mut self) {
        let watches = match self.settings.role {
            PrivilegedRole::Producer => vec![
                (StoreWatch::ActiveFans, self.paths.active_fans()),
                (StoreWatch::Volume, self.paths.volume_root()),
                (StoreWatch::Screen, self.paths.screen()),
                (
                    StoreWatch::RoleActive(PrivilegedRole::Host),
                    self.paths.role_active(PrivilegedRole::Host),
                ),
                (
                    StoreWatch::RoleActive(PrivilegedRole::Celebrity),
                    self.paths.role_active(PrivilegedRole::Celebrity),
                ),
                (StoreWatch::UniversalChat, self.paths.universal_chat()),
            ],
            PrivilegedRole::Host | PrivilegedRole::Celebrity => vec![
                (StoreWatch::PrivateCall, self.paths.private_call()),
                (StoreWatch::Volume, self.paths.volume_root()),
                (StoreWatch::Screen, self.paths.screen()),
                (StoreWatch::UniversalChat, self.paths.universal_chat()),
            ],
        };
        for (watch, path) in watches {
            if let Err(e) = self.listeners.attach(watch.clone(), path).await {
                warn!(target: "sc.actor.event", watch = ?watch, error = %e, "Failed to attach store listener");
            }
        }
    }

    /// Give the role up and disconnect.
    ///
    /// Teardown order: heartbeat, presence, listeners, sessions.
    #[instrument(skip_all, name = "sc.actor.leave", fields(role = %self.settings.role))]
    pub(crate) async fn leave(&mut self) -> Result<(), ScError> {
        if !self.joined {
            return Ok(());
        }
        let role = self.settings.role;

        if self.screen.is_capturing() {
            let report = self.end_local_screen_share().await;
            self.publish_report(report);
        }

        self.presence.stop_heartbeat().await;
        let released = self.presence.release(role, self.screen.owner()).await;
        if let Err(e) = &released {
            warn!(target: "sc.actor.event", error = %e, "Failed to release presence");
        }
        self.listeners.detach_all();
        self.countdowns.cancel_all();
        self.registry.teardown().await;

        for participant in UserRole::ALL {
            self.participants.mark_disconnected(participant);
        }
        self.joined = false;
        info!(target: "sc.actor.event", role = %role, "Left event");
        released
    }

    // ------------------------------------------------------------------
    // Show lifecycle
    // ------------------------------------------------------------------

    /// Producer: start the go-live countdown on every tier.
    #[instrument(skip_all, name = "sc.actor.go_live")]
    pub(crate) async fn go_live(&mut self) -> Result<(), ScError> {
        self.require_role(PrivilegedRole::Producer, "go live")?;
        if matches!(self.status, EventStatus::Live | EventStatus::Closed) {
            debug!(target: "sc.actor.event", status = ?self.status, "Event already past preshow");
            return Ok(());
        }
        self.registry
            .signal(SessionName::Stage, &Signal::PrepareGoLive, None)
            .await?;
        self.countdowns
            .start(CountdownKind::GoLive, self.settings.go_live_countdown_seconds);
        Ok(())
    }

    async fn complete_go_live(&mut self) {
        self.set_status(EventStatus::Live);
        if !self.settings.producer_host {
            if let Err(e) = self.registry.unpublish(SessionName::Stage).await {
                warn!(target: "sc.actor.event", error = %e, "Failed to unpublish producer from stage");
            }
        }
        self.show_started_at = Some(now_ms());
        if let Err(e) = self
            .registry
            .signal(SessionName::Stage, &Signal::GoLive, None)
            .await
        {
            self.notify(&e);
        }
    }

    /// Producer: close the show.
    #[instrument(skip_all, name = "sc.actor.finish_event")]
    pub(crate) async fn finish_event(&mut self) -> Result<(), ScError> {
        self.require_role(PrivilegedRole::Producer, "finish event")?;
        self.countdowns.cancel(CountdownKind::GoLive);
        self.registry
            .signal(SessionName::Stage, &Signal::FinishEvent, None)
            .await?;
        self.set_status(EventStatus::Closed);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Countdowns
    // ------------------------------------------------------------------

    pub(crate) async fn handle_countdown_tick(&mut self, tick: CountdownTick) {
        match tick.kind {
            CountdownKind::Stage => {
                self.emit(ControllerEvent::StageCountdown {
                    remaining: tick.remaining,
                });
                if tick.remaining == 0 {
                    self.complete_stage_join().await;
                }
            }
            CountdownKind::GoLive => {
                self.emit(ControllerEvent::GoLiveCountdown {
                    remaining: tick.remaining,
                });
                if tick.remaining == 0 && self.is_producer() {
                    self.complete_go_live().await;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Store notifications
    // ------------------------------------------------------------------

    pub(crate) async fn handle_store_notification(&mut self, notification: StoreNotification) {
        let StoreNotification { watch, value } = notification;
        match watch {
            StoreWatch::ActiveFans => self.on_active_fans(value).await,
            StoreWatch::Volume => self.on_volume_snapshot(value).await,
            StoreWatch::Screen => self.on_screen_owner(value),
            StoreWatch::PrivateCall => self.observe_private_call(value).await,
            StoreWatch::RoleActive(role) => self.on_role_active(role, value).await,
            StoreWatch::UniversalChat => self.on_universal_chat(value),
            StoreWatch::FanChat(fan_id) => self.on_fan_chat(&fan_id, value),
        }
    }

    async fn on_volume_snapshot(&mut self, value: Option<Value>) {
        match decode::<BTreeMap<UserRole, u8>>(&self.paths.volume_root(), value) {
            Ok(volumes) => self.apply_volumes(&volumes.unwrap_or_default()).await,
            Err(e) => warn!(target: "sc.actor.event", error = %e, "Ignoring malformed volume map"),
        }
    }

    // ------------------------------------------------------------------
    // Gateway events
    // ------------------------------------------------------------------

    pub(crate) async fn handle_gateway_event(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::StreamCreated { session, stream } => {
                self.on_stream_created(session, stream).await;
            }
            GatewayEvent::StreamDestroyed { session, stream } => {
                self.on_stream_destroyed(session, &stream).await;
            }
            GatewayEvent::Signal {
                session,
                from,
                signal,
            } => self.on_signal(session, from.as_ref(), &signal).await,
            GatewayEvent::Connectivity { session, state } => {
                info!(target: "sc.actor.event", session = %session, state = ?state, "Session connectivity changed");
                self.emit(ControllerEvent::Connectivity { session, state });
                if session == SessionName::Stage && state == Connectivity::Disconnected {
                    self.notify(&ScError::Connection(
                        "stage session disconnected".to_string(),
                    ));
                }
            }
            GatewayEvent::ScreenShareError { message, .. } => {
                self.on_screen_share_error(&message).await;
            }
        }
    }

    async fn on_stream_created(&mut self, session: SessionName, stream: StreamHandle) {
        self.registry.track_stream_created(session, stream.clone());
        let local = self.settings.role.user_role();

        if stream.is_screen() {
            let Some(role) = stream.role().filter(|r| *r != local) else {
                return;
            };
            if session != SessionName::Stage {
                return;
            }
            if let Err(e) = self
                .registry
                .subscribe(session, &stream.stream_id, SubscribeOptions::FULL)
                .await
            {
                warn!(target: "sc.actor.event", role = %role, error = %e, "Failed to subscribe to screen");
            }
            if self.is_producer() {
                self.on_screen_stream_created(role, stream.stream_id.clone())
                    .await;
            }
            return;
        }

        let Some((role, policy)) = self.participants.on_stream_created(session, &stream) else {
            return;
        };
        if let Some(options) = policy.options() {
            if let Err(e) = self
                .registry
                .subscribe(session, &stream.stream_id, options)
                .await
            {
                warn!(target: "sc.actor.event", role = %role, error = %e, "Failed to subscribe to participant");
            }
        }
        if self.is_producer() {
            self.pause_video_during_share(role).await;
        }
    }

    async fn on_stream_destroyed(&mut self, session: SessionName, stream: &StreamHandle) {
        self.registry
            .track_stream_destroyed(session, &stream.stream_id);

        if stream.is_screen() {
            if self.is_producer() {
                self.on_screen_stream_destroyed(&stream.stream_id).await;
            }
            return;
        }

        if session == SessionName::Backstage {
            let is_seated = self
                .participants
                .get(UserRole::BackstageFan)
                .and_then(|s| s.stream.as_ref())
                .is_some_and(|r| r.stream_id == stream.stream_id);
            if is_seated {
                info!(target: "sc.actor.event", stream_id = %stream.stream_id, "Backstage fan left");
                self.participant_left(UserRole::BackstageFan).await;
            }
            return;
        }

        if let Some(role) = self.participants.on_stream_destroyed(session, stream) {
            self.participant_left(role).await;
        }
    }

    async fn participant_left(&mut self, role: UserRole) {
        self.participants.mark_disconnected(role);
        self.chats.remove(role.as_str());
        if self.is_producer() {
            if self.call.involves_role(role) {
                let report = self.end_private_call().await;
                self.publish_report(report);
            }
        } else if role == UserRole::Producer {
            self.drop_observed_call().await;
        }
    }

    async fn on_signal(
        &mut self,
        session: SessionName,
        from: Option<&Connection>,
        wire: &WireSignal,
    ) {
        let signal = match wire.decode() {
            Ok(signal) => signal,
            Err(e) => {
                warn!(target: "sc.actor.event", session = %session, kind = %wire.kind, error = %e, "Dropping signal");
                return;
            }
        };
        let sender = from.and_then(Connection::role);

        // Stage tiers take orders from the producer only
        if !self.is_producer() && sender != Some(UserRole::Producer) {
            debug!(
                target: "sc.actor.event",
                signal = signal.kind(),
                sender = ?sender,
                "Ignoring signal not sent by the producer"
            );
            return;
        }

        debug!(target: "sc.actor.event", session = %session, signal = signal.kind(), "Signal received");
        if self.is_producer() {
            self.on_producer_signal(signal, sender);
        } else {
            self.on_stage_signal(signal).await;
        }
    }

    fn on_producer_signal(&mut self, signal: Signal, sender: Option<UserRole>) {
        match signal {
            Signal::ChatMessage(payload) => self.on_chat_signal(payload),
            Signal::ErrorScreenShareExtension => {
                if let Some(role) = sender {
                    self.screen.release(role);
                }
                self.notify(&ScError::Capability(format!(
                    "screen share extension missing for {}",
                    sender.map_or("participant", |r| r.as_str())
                )));
                self.emit_screen();
            }
            Signal::ErrorScreenShare => {
                if let Some(role) = sender {
                    self.screen.release(role);
                }
                warn!(target: "sc.screen_share", sender = ?sender, "Remote screen share failed");
                self.emit(ControllerEvent::Notice {
                    kind: NoticeKind::Dismissible,
                    message: format!(
                        "Screen sharing failed for the {}",
                        sender.map_or("participant", |r| r.as_str())
                    ),
                });
                self.emit_screen();
            }
            other => {
                debug!(target: "sc.actor.event", signal = other.kind(), "Signal not handled by producer");
            }
        }
    }

    async fn on_stage_signal(&mut self, signal: Signal) {
        match signal {
            Signal::VideoOnOff { .. } | Signal::MuteAudio { .. } | Signal::ChangeVolume { .. } => {
                if let Err(e) = self.apply_remote_control(&signal).await {
                    self.notify(&e);
                }
            }
            Signal::StartScreenShare => {
                if let Err(e) = self.start_local_screen_share().await {
                    if matches!(e, ScError::ScreenShareOccupied(_)) {
                        self.notify(&e);
                        if let Err(signal_err) = self
                            .registry
                            .signal_role(UserRole::Producer, &Signal::ErrorScreenShare)
                            .await
                        {
                            debug!(target: "sc.screen_share", error = %signal_err, "Could not report occupied slot");
                        }
                    } else if !matches!(e, ScError::Capability(_)) {
                        self.notify(&e);
                    }
                }
            }
            Signal::EndScreenShare => {
                let report = self.end_local_screen_share().await;
                self.publish_report(report);
            }
            Signal::PrepareGoLive => {
                self.countdowns
                    .start(CountdownKind::GoLive, self.settings.go_live_countdown_seconds);
            }
            Signal::GoLive => {
                self.countdowns.cancel(CountdownKind::GoLive);
                self.show_started_at = Some(now_ms());
                self.set_status(EventStatus::Live);
            }
            Signal::FinishEvent => {
                self.countdowns.cancel(CountdownKind::GoLive);
                self.set_status(EventStatus::Closed);
                if let Err(e) = self.registry.unpublish(SessionName::Stage).await {
                    warn!(target: "sc.actor.event", error = %e, "Failed to unpublish after event finished");
                }
            }
            Signal::ChatMessage(payload) => self.on_chat_signal(payload),
            other => {
                debug!(target: "sc.actor.event", signal = other.kind(), "Signal not handled on stage");
            }
        }
    }
}
