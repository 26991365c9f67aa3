//! Screen Share Coordinator.
//!
//! One screen may be shared at a time. The owner is published at `screen`
//! in the store; the producer drives who shares by signaling
//! `startScreenShare` / `endScreenShare`, and mirrors the share on its own
//! console by pausing participant video while a screen stream is live.
//!
//! ```text
//! Idle ──(producer asks a remote role)──▶ Requested { target }
//!  │                                           │
//!  └──(local capture / store owner set)──▶ Active { owner } ──(owner cleared)──▶ Idle
//! ```

use crate::engine::Engine;
use crate::errors::ScError;
use crate::observability::metrics;
use crate::participants::ParticipantState;
use crate::roles::{PrivilegedRole, SessionName, UserRole};
use crate::signaling::{Signal, Toggle};
use crate::store::{decode, DisconnectAction};
use crate::workflow::{Workflow, WorkflowReport};
use common::types::StreamId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ScreenShareState {
    Idle,
    /// The producer asked a remote role to share and is waiting for its stream.
    Requested { target: UserRole },
    Active { owner: UserRole },
}

/// Producer request on the screen-share slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScreenShareAction {
    Start,
    End,
}

/// Local view of the screen-share slot and of camera visibility.
#[derive(Debug, Clone)]
pub struct ScreenShareCoordinator {
    local: UserRole,
    state: ScreenShareState,
    /// Local desktop capture is running.
    capturing: bool,
    /// Stage screen stream the producer is mirroring.
    screen_stream: Option<(UserRole, StreamId)>,
    /// Per-role video flags taken when the screen stream appeared.
    video_snapshot: Option<BTreeMap<UserRole, bool>>,
    hidden: BTreeSet<UserRole>,
}

impl ScreenShareCoordinator {
    #[must_use]
    pub fn new(local: UserRole) -> Self {
        Self {
            local,
            state: ScreenShareState::Idle,
            capturing: false,
            screen_stream: None,
            video_snapshot: None,
            hidden: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> ScreenShareState {
        self.state
    }

    #[must_use]
    pub fn owner(&self) -> Option<UserRole> {
        match self.state {
            ScreenShareState::Active { owner } => Some(owner),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    #[must_use]
    pub fn hidden_cameras(&self) -> &BTreeSet<UserRole> {
        &self.hidden
    }

    #[must_use]
    pub fn is_camera_visible(&self, role: UserRole) -> bool {
        !self.hidden.contains(&role)
    }

    /// Fails if another role owns the slot.
    pub fn ensure_available(&self, role: UserRole) -> Result<(), ScError> {
        match self.state {
            ScreenShareState::Active { owner } if owner != role => {
                Err(ScError::ScreenShareOccupied(owner))
            }
            _ => Ok(()),
        }
    }

    /// Take the slot for `role` after local capture started.
    pub fn claim(&mut self, role: UserRole) -> Result<(), ScError> {
        self.ensure_available(role)?;
        self.state = ScreenShareState::Active { owner: role };
        if role == self.local {
            self.capturing = true;
        }
        self.hidden.insert(role);
        Ok(())
    }

    /// Give up the slot if `role` holds it. Returns whether anything changed.
    pub fn release(&mut self, role: UserRole) -> bool {
        if role == self.local {
            self.capturing = false;
        }
        if self.state != (ScreenShareState::Active { owner: role }) {
            return false;
        }
        self.state = ScreenShareState::Idle;
        self.hidden.remove(&role);
        true
    }

    /// The producer asked `target` to share.
    pub fn request(&mut self, target: UserRole) {
        self.state = ScreenShareState::Requested { target };
    }

    /// Forget an owner we just told to stop, ahead of its store echo.
    pub fn preempt(&mut self, role: UserRole) {
        if self.state == (ScreenShareState::Active { owner: role }) {
            self.state = ScreenShareState::Idle;
        }
    }

    /// Follow the owner published in the store.
    ///
    /// Viewers hide every camera but the sharer's while a share is up. The
    /// producer's cameras are driven by the screen stream instead.
    pub fn observe_owner(&mut self, owner: Option<UserRole>, is_producer: bool) {
        match owner {
            Some(owner) => self.state = ScreenShareState::Active { owner },
            None => {
                if matches!(self.state, ScreenShareState::Active { .. }) {
                    self.state = ScreenShareState::Idle;
                }
            }
        }
        if is_producer {
            return;
        }
        self.hidden = match owner {
            Some(owner) => UserRole::ALL
                .into_iter()
                .filter(|role| *role != owner)
                .collect(),
            None => BTreeSet::new(),
        };
        if self.capturing {
            self.hidden.insert(self.local);
        }
    }

    #[must_use]
    pub fn screen_stream_active(&self) -> bool {
        self.screen_stream.is_some()
    }

    /// Producer: a stage screen stream appeared. Its sharer's camera is hidden.
    pub fn screen_stream_created(&mut self, role: UserRole, stream_id: StreamId) {
        self.hidden.insert(role);
        self.screen_stream = Some((role, stream_id));
    }

    /// Producer: the mirrored screen stream is gone. Returns its sharer.
    pub fn screen_stream_destroyed(&mut self, stream_id: &StreamId) -> Option<UserRole> {
        match &self.screen_stream {
            Some((role, id)) if id == stream_id => {
                let role = *role;
                self.screen_stream = None;
                self.hidden.remove(&role);
                Some(role)
            }
            _ => None,
        }
    }

    /// Remember participant video flags and list the roles whose video goes off.
    ///
    /// The backstage fan is never in the shot, so it keeps its video. A
    /// snapshot already taken is kept.
    pub fn snapshot_video<'a>(
        &mut self,
        states: impl Iterator<Item = &'a ParticipantState>,
    ) -> Vec<UserRole> {
        if self.video_snapshot.is_some() {
            return Vec::new();
        }
        let connected: Vec<&ParticipantState> = states
            .filter(|s| s.role != UserRole::Producer && s.is_connected())
            .collect();
        self.video_snapshot = Some(connected.iter().map(|s| (s.role, s.video)).collect());
        connected
            .into_iter()
            .map(|s| s.role)
            .filter(|role| *role != UserRole::BackstageFan)
            .collect()
    }

    /// Roles whose video was on before the share.
    pub fn restore_video(&mut self) -> Vec<UserRole> {
        self.video_snapshot
            .take()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(role, video)| video.then_some(role))
            .collect()
    }
}

impl Engine {
    /// Producer: start or stop a share on `target`.
    #[instrument(skip_all, name = "sc.screen_share.request", fields(action = ?action, target = %target))]
    pub(crate) async fn screen_share(
        &mut self,
        action: ScreenShareAction,
        target: UserRole,
    ) -> Result<WorkflowReport, ScError> {
        self.require_role(PrivilegedRole::Producer, "screen share")?;
        let local = self.settings.role.user_role();
        let mut wf = Workflow::new(match action {
            ScreenShareAction::Start => "screen_share_start",
            ScreenShareAction::End => "screen_share_end",
        });

        match action {
            ScreenShareAction::Start => {
                // Stop every current sharer first
                let mut sharers: BTreeSet<UserRole> = self
                    .participants
                    .iter()
                    .filter(|s| s.screen)
                    .map(|s| s.role)
                    .collect();
                sharers.extend(self.screen.owner());
                for sharer in sharers.into_iter().filter(|role| *role != target) {
                    if sharer == local {
                        wf.absorb(self.end_local_screen_share().await);
                    } else {
                        let result = self.registry.signal_role(sharer, &Signal::EndScreenShare).await;
                        wf.step("end_current_share", result);
                        self.screen.preempt(sharer);
                    }
                }

                if target == local {
                    let result = self.start_local_screen_share().await;
                    wf.step("start_local_capture", result);
                } else {
                    let result = self.registry.signal_role(target, &Signal::StartScreenShare).await;
                    if wf.step("signal_start", result).is_some() {
                        self.screen.request(target);
                        metrics::record_screen_share_transition("requested");
                    }
                }
            }
            ScreenShareAction::End => {
                if target == local {
                    wf.absorb(self.end_local_screen_share().await);
                } else {
                    let result = self.registry.signal_role(target, &Signal::EndScreenShare).await;
                    wf.step("signal_end", result);
                }
            }
        }

        self.emit_screen();
        Ok(wf.finish())
    }

    /// Start desktop capture for the local role and publish ownership.
    pub(crate) async fn start_local_screen_share(&mut self) -> Result<(), ScError> {
        let local = self.settings.role.user_role();
        self.screen.ensure_available(local)?;

        if let Err(e) = self.registry.start_screen_share(SessionName::Stage).await {
            if matches!(e, ScError::Capability(_)) {
                self.screen_share_capability_missing(local, &e).await;
            }
            return Err(e);
        }

        self.screen.claim(local)?;
        let path = self.paths.screen();
        if let Err(e) = self
            .store
            .write(&path, Value::String(local.as_str().to_string()))
            .await
        {
            // Nobody else could see or preempt an unpublished share
            warn!(target: "sc.screen_share", error = %e, "Failed to publish screen owner, stopping capture");
            let report = self.end_local_screen_share().await;
            self.publish_report(report);
            return Err(e);
        }
        if let Err(e) = self.store.on_disconnect(&path, DisconnectAction::Remove).await {
            warn!(target: "sc.screen_share", error = %e, "Failed to register screen on-disconnect hook");
        }
        self.participants.set_screen(local, true);
        metrics::record_screen_share_transition("start");
        info!(target: "sc.screen_share", role = %local, "Local screen share started");
        self.emit_screen();
        Ok(())
    }

    async fn screen_share_capability_missing(&mut self, local: UserRole, error: &ScError) {
        warn!(target: "sc.screen_share", error = %error, "Screen capture unavailable");
        if local != UserRole::Producer {
            if let Err(e) = self
                .registry
                .signal_role(UserRole::Producer, &Signal::ErrorScreenShareExtension)
                .await
            {
                debug!(target: "sc.screen_share", error = %e, "Could not tell producer about missing extension");
            }
        }
        self.notify(error);
        if let Err(e) = self.store.remove(&self.paths.screen()).await {
            warn!(target: "sc.screen_share", error = %e, "Failed to clear screen owner");
        }
        metrics::record_screen_share_transition("capability_error");
    }

    /// Stop local capture and give up the slot.
    pub(crate) async fn end_local_screen_share(&mut self) -> WorkflowReport {
        let local = self.settings.role.user_role();
        if !self.screen.is_capturing() {
            return WorkflowReport::skipped("end_local_screen_share");
        }
        let mut wf = Workflow::new("end_local_screen_share");

        let result = self.registry.end_screen_share(SessionName::Stage).await;
        wf.step("stop_capture", result);

        let path = self.paths.screen();
        let result = self.store.cancel_on_disconnect(&path).await;
        wf.step("cancel_disconnect_hook", result);
        let result = self.store.remove(&path).await;
        wf.step("clear_owner", result);

        self.screen.release(local);
        self.participants.set_screen(local, false);
        metrics::record_screen_share_transition("end");
        info!(target: "sc.screen_share", role = %local, "Local screen share ended");
        self.emit_screen();
        wf.finish()
    }

    /// The store's `screen` value changed.
    pub(crate) fn on_screen_owner(&mut self, value: Option<Value>) {
        let owner = match decode::<UserRole>(&self.paths.screen(), value) {
            Ok(owner) => owner,
            Err(e) => {
                warn!(target: "sc.screen_share", error = %e, "Ignoring malformed screen owner");
                return;
            }
        };
        let is_producer = self.settings.role.user_role() == UserRole::Producer;
        self.screen.observe_owner(owner, is_producer);
        for role in UserRole::ALL {
            self.participants.set_screen(role, owner == Some(role));
        }
        debug!(target: "sc.screen_share", owner = ?owner, "Screen owner changed");
        self.emit_screen();
    }

    /// Producer: a stage screen stream appeared.
    pub(crate) async fn on_screen_stream_created(&mut self, role: UserRole, stream_id: StreamId) {
        self.screen.screen_stream_created(role, stream_id);
        self.participants.set_screen(role, true);

        let mut wf = Workflow::new("mirror_screen_share");
        let turn_off = self.screen.snapshot_video(self.participants.iter());
        for participant in turn_off {
            let result = self.set_participant_video(participant, false).await;
            wf.step("pause_video", result);
        }
        let report = wf.finish();
        self.publish_report(report);
        self.emit_screen();
    }

    /// Producer: the mirrored screen stream is gone.
    pub(crate) async fn on_screen_stream_destroyed(&mut self, stream_id: &StreamId) {
        let Some(role) = self.screen.screen_stream_destroyed(stream_id) else {
            return;
        };
        self.participants.set_screen(role, false);

        let mut wf = Workflow::new("restore_after_screen_share");
        for participant in self.screen.restore_video() {
            let result = self.set_participant_video(participant, true).await;
            wf.step("resume_video", result);
        }
        let report = wf.finish();
        self.publish_report(report);
        self.emit_screen();
    }

    /// Producer: a participant joined while a screen is on stage.
    pub(crate) async fn pause_video_during_share(&mut self, role: UserRole) {
        if !self.screen.screen_stream_active() || role == UserRole::BackstageFan {
            return;
        }
        if let Err(e) = self.set_participant_video(role, false).await {
            debug!(target: "sc.screen_share", role = %role, error = %e, "Could not pause joining participant");
        }
    }

    async fn set_participant_video(&mut self, role: UserRole, on: bool) -> Result<(), ScError> {
        self.registry
            .signal_role(role, &Signal::VideoOnOff { video: Toggle::from_bool(on) })
            .await?;
        self.participants.set_video(role, on);
        Ok(())
    }

    /// The provider aborted local capture.
    pub(crate) async fn on_screen_share_error(&mut self, message: &str) {
        warn!(target: "sc.screen_share", message, "Screen capture aborted by provider");
        let local = self.settings.role.user_role();
        if let Err(e) = self.store.remove(&self.paths.screen()).await {
            warn!(target: "sc.screen_share", error = %e, "Failed to clear screen owner");
        }
        if local != UserRole::Producer {
            if let Err(e) = self
                .registry
                .signal_role(UserRole::Producer, &Signal::ErrorScreenShare)
                .await
            {
                debug!(target: "sc.screen_share", error = %e, "Could not tell producer about capture error");
            }
        }
        self.screen.release(local);
        self.participants.set_screen(local, false);
        metrics::record_screen_share_transition("error");
        self.emit_screen();
    }
}
