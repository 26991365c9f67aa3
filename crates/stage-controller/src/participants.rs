//! Participant State Machine.
//!
//! One [`ParticipantState`] per role, driven by camera-stream lifecycle:
//!
//! ```text
//! disconnected ──(streamCreated)──▶ connected ──(streamDestroyed / kick)──▶ disconnected
//!       │                                ▲
//!       └──(local publish)──▶ connecting ┘
//! ```
//!
//! A role with no stream is disconnected, never absent.

use crate::engine::Engine;
use crate::errors::ScError;
use crate::gateway::{StreamHandle, StreamRef, SubscribeOptions};
use crate::roles::{FanSeat, PrivilegedRole, SessionName, UserRole};
use crate::signaling::{Signal, Toggle};
use common::types::FanId;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// Volume given to a role with no stored value.
pub const DEFAULT_VOLUME: u8 = 100;

/// Volume a toggled-down role drops to.
pub const LOWERED_VOLUME: u8 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ParticipantStatus {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantState {
    pub role: UserRole,
    pub status: ParticipantStatus,
    pub audio: bool,
    pub video: bool,
    pub volume: u8,
    /// Sharing a screen.
    pub screen: bool,
    pub stream: Option<StreamRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_id: Option<FanId>,
}

impl ParticipantState {
    fn new(role: UserRole) -> Self {
        Self {
            role,
            status: ParticipantStatus::Disconnected,
            audio: true,
            video: true,
            volume: DEFAULT_VOLUME,
            screen: false,
            stream: None,
            fan_id: None,
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status == ParticipantStatus::Connected
    }
}

/// How the local client should subscribe to a newly created stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribePolicy {
    Full,
    VideoOnly,
    /// Empty, muted subscription that only keeps the slot.
    Placeholder,
    /// Do not subscribe.
    None,
}

impl SubscribePolicy {
    #[must_use]
    pub const fn options(&self) -> Option<SubscribeOptions> {
        match self {
            SubscribePolicy::Full => Some(SubscribeOptions::FULL),
            SubscribePolicy::VideoOnly => Some(SubscribeOptions::VIDEO_ONLY),
            SubscribePolicy::Placeholder => Some(SubscribeOptions::PLACEHOLDER),
            SubscribePolicy::None => None,
        }
    }
}

/// A producer-side control the UI can flip for one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParticipantProperty {
    Audio,
    Video,
    Volume,
}

/// What flipping a property requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyChange {
    /// Tell the participant to change its own publisher.
    Signal(Signal),
    /// Write a new shared volume for the role.
    Volume(u8),
}

/// Participant states as seen by the local role.
#[derive(Debug, Clone)]
pub struct Participants {
    local: PrivilegedRole,
    producer_host: bool,
    states: BTreeMap<UserRole, ParticipantState>,
}

impl Participants {
    #[must_use]
    pub fn new(local: PrivilegedRole, producer_host: bool) -> Self {
        Self {
            local,
            producer_host,
            states: UserRole::ALL
                .into_iter()
                .map(|role| (role, ParticipantState::new(role)))
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, role: UserRole) -> Option<&ParticipantState> {
        self.states.get(&role)
    }

    fn state_mut(&mut self, role: UserRole) -> &mut ParticipantState {
        self.states
            .entry(role)
            .or_insert_with(|| ParticipantState::new(role))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParticipantState> {
        self.states.values()
    }

    #[must_use]
    pub fn is_connected(&self, role: UserRole) -> bool {
        self.get(role).is_some_and(ParticipantState::is_connected)
    }

    /// Apply a created camera stream and decide how to subscribe to it.
    ///
    /// Returns `None` for streams that carry no seated role or that are not
    /// camera streams on stage.
    pub fn on_stream_created(
        &mut self,
        session: SessionName,
        stream: &StreamHandle,
    ) -> Option<(UserRole, SubscribePolicy)> {
        if stream.is_screen() || session != SessionName::Stage {
            return None;
        }
        let role = stream.role()?;
        let fan_id = stream.connection.metadata().fan_id;

        let state = self.state_mut(role);
        state.status = ParticipantStatus::Connected;
        state.stream = Some(StreamRef {
            session,
            stream_id: stream.stream_id.clone(),
        });
        state.fan_id = fan_id;
        debug!(target: "sc.participants", role = %role, stream_id = %stream.stream_id, "Participant connected");

        Some((role, self.policy_for(role)))
    }

    fn policy_for(&self, role: UserRole) -> SubscribePolicy {
        if role == self.local.user_role() {
            return SubscribePolicy::None;
        }
        match role {
            UserRole::BackstageFan => SubscribePolicy::None,
            UserRole::Producer if self.producer_host => SubscribePolicy::Full,
            UserRole::Producer => SubscribePolicy::Placeholder,
            UserRole::Host | UserRole::Celebrity | UserRole::Fan => SubscribePolicy::Full,
        }
    }

    /// Apply a destroyed camera stream. Returns the role that left.
    pub fn on_stream_destroyed(
        &mut self,
        session: SessionName,
        stream: &StreamHandle,
    ) -> Option<UserRole> {
        if stream.is_screen() || session != SessionName::Stage {
            return None;
        }
        let role = stream.role()?;
        let state = self.state_mut(role);
        // A stale destroy for a stream already replaced is ignored
        if let Some(current) = &state.stream {
            if current.stream_id != stream.stream_id {
                return None;
            }
        }
        self.mark_disconnected(role);
        Some(role)
    }

    pub fn mark_connecting(&mut self, role: UserRole) {
        self.state_mut(role).status = ParticipantStatus::Connecting;
    }

    pub fn mark_connected(&mut self, role: UserRole, stream: Option<StreamRef>) {
        let state = self.state_mut(role);
        state.status = ParticipantStatus::Connected;
        if stream.is_some() {
            state.stream = stream;
        }
    }

    pub fn mark_disconnected(&mut self, role: UserRole) {
        let state = self.state_mut(role);
        state.status = ParticipantStatus::Disconnected;
        state.stream = None;
        state.screen = false;
        state.fan_id = None;
        debug!(target: "sc.participants", role = %role, "Participant disconnected");
    }

    /// Record which fan currently holds a fan seat.
    pub fn set_fan_id(&mut self, seat: FanSeat, fan_id: FanId) {
        self.state_mut(seat.user_role()).fan_id = Some(fan_id);
    }

    pub fn set_video(&mut self, role: UserRole, video: bool) {
        self.state_mut(role).video = video;
    }

    pub fn set_audio(&mut self, role: UserRole, audio: bool) {
        self.state_mut(role).audio = audio;
    }

    pub fn set_screen(&mut self, role: UserRole, screen: bool) {
        self.state_mut(role).screen = screen;
    }

    /// Apply the shared volume map. Returns the roles whose volume changed.
    pub fn apply_volume_snapshot(&mut self, volumes: &BTreeMap<UserRole, u8>) -> Vec<(UserRole, u8)> {
        let mut changed = Vec::new();
        for (&role, &volume) in volumes {
            let volume = volume.min(100);
            let state = self.state_mut(role);
            if state.volume != volume {
                state.volume = volume;
                changed.push((role, volume));
            }
        }
        changed
    }

    /// Work out the change that flips a property of a connected participant.
    ///
    /// Local state is left alone; the caller commits it with [`Self::commit`]
    /// once the change has been delivered.
    pub fn toggle_property(
        &self,
        role: UserRole,
        property: ParticipantProperty,
    ) -> Result<PropertyChange, ScError> {
        let state = self
            .get(role)
            .filter(|state| state.is_connected())
            .ok_or(ScError::ParticipantNotFound(role))?;
        Ok(match property {
            ParticipantProperty::Audio => PropertyChange::Signal(Signal::MuteAudio {
                mute: Toggle::from_bool(state.audio),
            }),
            ParticipantProperty::Video => PropertyChange::Signal(Signal::VideoOnOff {
                video: Toggle::from_bool(!state.video),
            }),
            ParticipantProperty::Volume => PropertyChange::Volume(if state.volume == DEFAULT_VOLUME {
                LOWERED_VOLUME
            } else {
                DEFAULT_VOLUME
            }),
        })
    }

    /// Record a delivered audio or video signal in local state.
    pub fn commit(&mut self, role: UserRole, signal: &Signal) {
        match signal {
            Signal::MuteAudio { mute } => self.set_audio(role, !mute.is_on()),
            Signal::VideoOnOff { video } => self.set_video(role, video.is_on()),
            _ => {}
        }
    }
}

impl Engine {
    /// Producer control: flip a participant's audio, video or volume.
    #[instrument(skip_all, name = "sc.participants.toggle", fields(role = %role, property = ?property))]
    pub(crate) async fn toggle_participant_property(
        &mut self,
        role: UserRole,
        property: ParticipantProperty,
    ) -> Result<(), ScError> {
        self.require_role(PrivilegedRole::Producer, "toggle participant property")?;

        match self.participants.toggle_property(role, property)? {
            PropertyChange::Signal(signal) => {
                self.registry.signal_role(role, &signal).await?;
                self.participants.commit(role, &signal);
                Ok(())
            }
            PropertyChange::Volume(volume) => {
                self.store
                    .write(&self.paths.volume(role), json!(volume))
                    .await
            }
        }
    }

    /// Host/celebrity side of the producer's remote controls.
    pub(crate) async fn apply_remote_control(&mut self, signal: &Signal) -> Result<(), ScError> {
        let local = self.settings.role.user_role();
        match signal {
            Signal::VideoOnOff { video } => {
                self.registry
                    .set_publish_video(SessionName::Stage, video.is_on())
                    .await?;
                self.participants.set_video(local, video.is_on());
                info!(target: "sc.participants", video = video.is_on(), "Producer toggled local video");
            }
            Signal::MuteAudio { mute } => {
                self.registry
                    .set_publish_audio(SessionName::Stage, !mute.is_on())
                    .await?;
                self.participants.set_audio(local, !mute.is_on());
                info!(target: "sc.participants", muted = mute.is_on(), "Producer toggled local audio");
            }
            Signal::ChangeVolume { user_type, volume } => {
                let mut update = BTreeMap::new();
                update.insert(*user_type, *volume);
                self.apply_volumes(&update).await;
            }
            _ => {}
        }
        Ok(())
    }

    /// Apply a volume map to state and to the matching subscribers.
    pub(crate) async fn apply_volumes(&mut self, volumes: &BTreeMap<UserRole, u8>) {
        for (role, volume) in self.participants.apply_volume_snapshot(volumes) {
            let Some(stream) = self.participants.get(role).and_then(|s| s.stream.clone()) else {
                continue;
            };
            if self.registry.subscription(stream.session, &stream.stream_id).is_none() {
                continue;
            }
            if let Err(e) = self
                .registry
                .set_subscriber_volume(stream.session, &stream.stream_id, volume)
                .await
            {
                warn!(target: "sc.participants", role = %role, volume, error = %e, "Failed to apply volume");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::gateway::{Connection, VideoType};
    use common::types::StreamId;

    fn stream(id: &str, role: &str, video_type: VideoType) -> StreamHandle {
        StreamHandle {
            stream_id: StreamId::new(id),
            connection: Connection::new(format!("conn-{id}"), format!(r#"{{"userType":"{role}"}}"#)),
            video_type,
        }
    }

    #[test]
    fn test_roles_start_disconnected() {
        let participants = Participants::new(PrivilegedRole::Producer, false);
        for role in UserRole::ALL {
            let state = participants.get(role).unwrap();
            assert_eq!(state.status, ParticipantStatus::Disconnected);
            assert_eq!(state.volume, DEFAULT_VOLUME);
        }
    }

    #[test]
    fn test_camera_stream_connects_role() {
        let mut participants = Participants::new(PrivilegedRole::Producer, false);
        let created = participants.on_stream_created(
            SessionName::Stage,
            &stream("h1", "host", VideoType::Camera),
        );
        assert_eq!(created, Some((UserRole::Host, SubscribePolicy::Full)));
        let host = participants.get(UserRole::Host).unwrap();
        assert!(host.is_connected());
        assert_eq!(host.stream.as_ref().unwrap().stream_id, StreamId::new("h1"));
    }

    #[test]
    fn test_screen_and_backstage_streams_do_not_touch_state() {
        let mut participants = Participants::new(PrivilegedRole::Producer, false);
        assert_eq!(
            participants.on_stream_created(
                SessionName::Stage,
                &stream("s1", "celebrity", VideoType::Screen),
            ),
            None
        );
        assert_eq!(
            participants.on_stream_created(
                SessionName::Backstage,
                &stream("b1", "backstageFan", VideoType::Camera),
            ),
            None
        );
        assert!(!participants.is_connected(UserRole::Celebrity));
        assert!(!participants.is_connected(UserRole::BackstageFan));
    }

    #[test]
    fn test_producer_stream_policy_depends_on_producer_host() {
        let producer_stream = stream("p1", "producer", VideoType::Camera);

        let mut host_view = Participants::new(PrivilegedRole::Host, false);
        assert_eq!(
            host_view.on_stream_created(SessionName::Stage, &producer_stream),
            Some((UserRole::Producer, SubscribePolicy::Placeholder))
        );

        let mut host_view = Participants::new(PrivilegedRole::Host, true);
        assert_eq!(
            host_view.on_stream_created(SessionName::Stage, &producer_stream),
            Some((UserRole::Producer, SubscribePolicy::Full))
        );
    }

    #[test]
    fn test_destroy_resets_to_disconnected() {
        let mut participants = Participants::new(PrivilegedRole::Producer, false);
        let fan = stream("f1", "fan", VideoType::Camera);
        participants.on_stream_created(SessionName::Stage, &fan);

        assert_eq!(
            participants.on_stream_destroyed(SessionName::Stage, &fan),
            Some(UserRole::Fan)
        );
        let state = participants.get(UserRole::Fan).unwrap();
        assert_eq!(state.status, ParticipantStatus::Disconnected);
        assert_eq!(state.stream, None);
    }

    #[test]
    fn test_stale_destroy_is_ignored() {
        let mut participants = Participants::new(PrivilegedRole::Producer, false);
        let old = stream("f1", "fan", VideoType::Camera);
        let new = stream("f2", "fan", VideoType::Camera);
        participants.on_stream_created(SessionName::Stage, &old);
        participants.on_stream_created(SessionName::Stage, &new);

        assert_eq!(participants.on_stream_destroyed(SessionName::Stage, &old), None);
        assert!(participants.is_connected(UserRole::Fan));
    }

    #[test]
    fn test_volume_snapshot_reports_changes_only() {
        let mut participants = Participants::new(PrivilegedRole::Host, false);
        let volumes = BTreeMap::from([(UserRole::Fan, 25), (UserRole::Celebrity, 100)]);
        assert_eq!(
            participants.apply_volume_snapshot(&volumes),
            vec![(UserRole::Fan, 25)]
        );
        assert!(participants.apply_volume_snapshot(&volumes).is_empty());
    }

    #[test]
    fn test_toggle_properties() {
        let mut participants = Participants::new(PrivilegedRole::Producer, false);
        participants.on_stream_created(SessionName::Stage, &stream("c1", "celebrity", VideoType::Camera));

        let mute = participants
            .toggle_property(UserRole::Celebrity, ParticipantProperty::Audio)
            .unwrap();
        assert_eq!(
            mute,
            PropertyChange::Signal(Signal::MuteAudio { mute: Toggle::On })
        );
        assert_eq!(
            participants
                .toggle_property(UserRole::Celebrity, ParticipantProperty::Video)
                .unwrap(),
            PropertyChange::Signal(Signal::VideoOnOff { video: Toggle::Off })
        );
        assert_eq!(
            participants
                .toggle_property(UserRole::Celebrity, ParticipantProperty::Volume)
                .unwrap(),
            PropertyChange::Volume(LOWERED_VOLUME)
        );

        participants.apply_volume_snapshot(&BTreeMap::from([(UserRole::Celebrity, 25)]));
        assert_eq!(
            participants
                .toggle_property(UserRole::Celebrity, ParticipantProperty::Volume)
                .unwrap(),
            PropertyChange::Volume(DEFAULT_VOLUME)
        );
    }

    #[test]
    fn test_toggle_changes_state_only_on_commit() {
        let mut participants = Participants::new(PrivilegedRole::Producer, false);
        participants.on_stream_created(SessionName::Stage, &stream("c1", "host", VideoType::Camera));

        let first = participants
            .toggle_property(UserRole::Host, ParticipantProperty::Audio)
            .unwrap();
        let again = participants
            .toggle_property(UserRole::Host, ParticipantProperty::Audio)
            .unwrap();
        assert_eq!(first, again);
        assert!(participants.get(UserRole::Host).unwrap().audio);

        let PropertyChange::Signal(signal) = first else {
            panic!("expected a signal");
        };
        participants.commit(UserRole::Host, &signal);
        assert!(!participants.get(UserRole::Host).unwrap().audio);
        assert_eq!(
            participants
                .toggle_property(UserRole::Host, ParticipantProperty::Audio)
                .unwrap(),
            PropertyChange::Signal(Signal::MuteAudio { mute: Toggle::Off })
        );

        participants.commit(UserRole::Host, &Signal::VideoOnOff { video: Toggle::Off });
        assert!(!participants.get(UserRole::Host).unwrap().video);
    }

    #[test]
    fn test_toggle_on_disconnected_role_fails() {
        let participants = Participants::new(PrivilegedRole::Producer, false);
        let err = participants
            .toggle_property(UserRole::Fan, ParticipantProperty::Audio)
            .unwrap_err();
        assert!(matches!(err, ScError::ParticipantNotFound(UserRole::Fan)));
    }
}
