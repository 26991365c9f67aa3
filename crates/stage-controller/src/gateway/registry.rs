//! Session registry.
//!
//! One registry exists per event lifetime: `new(sessions) → connect → teardown`.
//! It owns the session handles, the streams each session has reported and the
//! subscriptions the local client holds, and it is the only path through which
//! the coordination components reach the media provider.

use super::{
    GatewayEvent, MediaSession, PublishOptions, StreamHandle, SubscribeOptions,
};
use crate::errors::ScError;
use crate::observability::metrics;
use crate::roles::{SessionName, UserRole};
use crate::signaling::Signal;
use common::types::{ConnectionId, StreamId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Per-session bookkeeping.
struct SessionEntry {
    session: Arc<dyn MediaSession>,
    connected: bool,
    streams: BTreeMap<StreamId, StreamHandle>,
    subscriptions: HashMap<StreamId, SubscribeOptions>,
}

impl SessionEntry {
    fn new(session: Arc<dyn MediaSession>) -> Self {
        Self {
            session,
            connected: false,
            streams: BTreeMap::new(),
            subscriptions: HashMap::new(),
        }
    }
}

/// Explicit registry of the event's media sessions.
pub struct SessionRegistry {
    entries: HashMap<SessionName, SessionEntry>,
}

impl SessionRegistry {
    /// Register the stage session and, for tiers that use it, the backstage session.
    #[must_use]
    pub fn new(stage: Arc<dyn MediaSession>, backstage: Option<Arc<dyn MediaSession>>) -> Self {
        let mut entries = HashMap::new();
        entries.insert(SessionName::Stage, SessionEntry::new(stage));
        if let Some(backstage) = backstage {
            entries.insert(SessionName::Backstage, SessionEntry::new(backstage));
        }
        Self { entries }
    }

    /// Connect every registered session. Stops at the first failure.
    pub async fn connect(&mut self, events: &mpsc::Sender<GatewayEvent>) -> Result<(), ScError> {
        for (name, entry) in &mut self.entries {
            if entry.connected {
                continue;
            }
            entry.session.connect(events.clone()).await?;
            entry.connected = true;
            info!(target: "sc.gateway", session = %name, "Session connected");
        }
        Ok(())
    }

    /// Disconnect every session and forget all streams and subscriptions.
    pub async fn teardown(&mut self) {
        for (name, entry) in &mut self.entries {
            if !entry.connected {
                continue;
            }
            if let Err(e) = entry.session.disconnect().await {
                warn!(target: "sc.gateway", session = %name, error = %e, "Session disconnect failed");
            }
            entry.connected = false;
            entry.streams.clear();
            entry.subscriptions.clear();
            info!(target: "sc.gateway", session = %name, "Session disconnected");
        }
    }

    #[must_use]
    pub fn has_session(&self, name: SessionName) -> bool {
        self.entries.contains_key(&name)
    }

    #[must_use]
    pub fn is_connected(&self, name: SessionName) -> bool {
        self.entries.get(&name).is_some_and(|e| e.connected)
    }

    fn entry(&self, name: SessionName) -> Result<&SessionEntry, ScError> {
        self.entries
            .get(&name)
            .ok_or_else(|| ScError::Connection(format!("no {name} session registered")))
    }

    fn entry_mut(&mut self, name: SessionName) -> Result<&mut SessionEntry, ScError> {
        self.entries
            .get_mut(&name)
            .ok_or_else(|| ScError::Connection(format!("no {name} session registered")))
    }

    // ------------------------------------------------------------------
    // Stream tracking
    // ------------------------------------------------------------------

    pub fn track_stream_created(&mut self, session: SessionName, stream: StreamHandle) {
        if let Some(entry) = self.entries.get_mut(&session) {
            debug!(
                target: "sc.gateway",
                session = %session,
                stream_id = %stream.stream_id,
                video_type = ?stream.video_type,
                "Stream created"
            );
            entry.streams.insert(stream.stream_id.clone(), stream);
        }
    }

    /// Forget a stream and any subscription to it.
    pub fn track_stream_destroyed(
        &mut self,
        session: SessionName,
        stream_id: &StreamId,
    ) -> Option<StreamHandle> {
        let entry = self.entries.get_mut(&session)?;
        entry.subscriptions.remove(stream_id);
        let removed = entry.streams.remove(stream_id);
        if removed.is_some() {
            debug!(target: "sc.gateway", session = %session, stream_id = %stream_id, "Stream destroyed");
        }
        removed
    }

    #[must_use]
    pub fn stream(&self, session: SessionName, stream_id: &StreamId) -> Option<&StreamHandle> {
        self.entries.get(&session)?.streams.get(stream_id)
    }

    /// Camera stream published by a role on a session.
    #[must_use]
    pub fn camera_stream_for_role(
        &self,
        session: SessionName,
        role: UserRole,
    ) -> Option<&StreamHandle> {
        self.entries
            .get(&session)?
            .streams
            .values()
            .find(|s| !s.is_screen() && s.role() == Some(role))
    }

    /// Connection of a role on a session, taken from its camera stream.
    #[must_use]
    pub fn connection_for_role(
        &self,
        session: SessionName,
        role: UserRole,
    ) -> Option<ConnectionId> {
        self.camera_stream_for_role(session, role)
            .map(|s| s.connection.connection_id.clone())
    }

    /// Streams currently known on a session.
    pub fn streams(&self, session: SessionName) -> impl Iterator<Item = &StreamHandle> {
        self.entries
            .get(&session)
            .into_iter()
            .flat_map(|e| e.streams.values())
    }

    #[must_use]
    pub fn subscription(
        &self,
        session: SessionName,
        stream_id: &StreamId,
    ) -> Option<SubscribeOptions> {
        self.entries
            .get(&session)?
            .subscriptions
            .get(stream_id)
            .copied()
    }

    // ------------------------------------------------------------------
    // Publishing
    // ------------------------------------------------------------------

    pub async fn publish(
        &self,
        session: SessionName,
        options: PublishOptions,
    ) -> Result<(), ScError> {
        self.entry(session)?.session.publish(options).await
    }

    pub async fn unpublish(&self, session: SessionName) -> Result<(), ScError> {
        self.entry(session)?.session.unpublish().await
    }

    pub async fn set_publish_audio(&self, session: SessionName, enabled: bool) -> Result<(), ScError> {
        self.entry(session)?.session.set_publish_audio(enabled).await
    }

    pub async fn set_publish_video(&self, session: SessionName, enabled: bool) -> Result<(), ScError> {
        self.entry(session)?.session.set_publish_video(enabled).await
    }

    // ------------------------------------------------------------------
    // Subscribing
    // ------------------------------------------------------------------

    pub async fn subscribe(
        &mut self,
        session: SessionName,
        stream_id: &StreamId,
        options: SubscribeOptions,
    ) -> Result<(), ScError> {
        let entry = self.entry_mut(session)?;
        let stream = entry
            .streams
            .get(stream_id)
            .cloned()
            .ok_or_else(|| ScError::StreamNotFound(stream_id.to_string()))?;
        entry.session.subscribe(&stream, options).await?;
        entry.subscriptions.insert(stream_id.clone(), options);
        Ok(())
    }

    pub async fn unsubscribe(
        &mut self,
        session: SessionName,
        stream_id: &StreamId,
    ) -> Result<(), ScError> {
        let entry = self.entry_mut(session)?;
        if entry.subscriptions.remove(stream_id).is_none() {
            return Ok(());
        }
        entry.session.unsubscribe(stream_id).await
    }

    /// Toggle audio on one subscription. Subscribes audio-only if not yet subscribed.
    pub async fn set_subscriber_audio(
        &mut self,
        session: SessionName,
        stream_id: &StreamId,
        enabled: bool,
    ) -> Result<(), ScError> {
        let current = self.subscription(session, stream_id);
        match current {
            Some(options) => {
                let entry = self.entry_mut(session)?;
                entry.session.set_subscriber_audio(stream_id, enabled).await?;
                entry.subscriptions.insert(
                    stream_id.clone(),
                    SubscribeOptions {
                        audio: enabled,
                        ..options
                    },
                );
                Ok(())
            }
            None if enabled => {
                self.subscribe(session, stream_id, SubscribeOptions::AUDIO_ONLY)
                    .await
            }
            None => Ok(()),
        }
    }

    /// Toggle audio on every subscription of a session, skipping the ids in `except`.
    ///
    /// Keeps going past individual failures and returns the first one.
    pub async fn set_all_subscribers_audio(
        &mut self,
        session: SessionName,
        enabled: bool,
        except: &[StreamId],
    ) -> Result<(), ScError> {
        let stream_ids: Vec<StreamId> = self
            .entry(session)?
            .subscriptions
            .keys()
            .filter(|id| !except.contains(id))
            .cloned()
            .collect();

        let mut first_error = None;
        for stream_id in stream_ids {
            if let Err(e) = self.set_subscriber_audio(session, &stream_id, enabled).await {
                warn!(
                    target: "sc.gateway",
                    session = %session,
                    stream_id = %stream_id,
                    error = %e,
                    "Failed to toggle subscriber audio"
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub async fn set_subscriber_volume(
        &self,
        session: SessionName,
        stream_id: &StreamId,
        volume: u8,
    ) -> Result<(), ScError> {
        let entry = self.entry(session)?;
        if !entry.subscriptions.contains_key(stream_id) {
            return Err(ScError::StreamNotFound(stream_id.to_string()));
        }
        entry.session.set_subscriber_volume(stream_id, volume).await
    }

    // ------------------------------------------------------------------
    // Signaling
    // ------------------------------------------------------------------

    /// Send a signal to one connection, or broadcast on the session.
    pub async fn signal(
        &self,
        session: SessionName,
        signal: &Signal,
        to: Option<&ConnectionId>,
    ) -> Result<(), ScError> {
        let wire = signal.to_wire()?;
        let result = self.entry(session)?.session.signal(&wire, to).await;
        match &result {
            Ok(()) => {
                metrics::record_signal_sent(signal.kind(), "success");
                debug!(
                    target: "sc.gateway",
                    session = %session,
                    signal = signal.kind(),
                    to = ?to.map(ConnectionId::as_str),
                    "Signal sent"
                );
            }
            Err(e) => {
                metrics::record_signal_sent(signal.kind(), "error");
                warn!(
                    target: "sc.gateway",
                    session = %session,
                    signal = signal.kind(),
                    error = %e,
                    "Signal send failed"
                );
            }
        }
        result
    }

    /// Signal the connection of a role. Fails if the role has no live stream.
    pub async fn signal_role(
        &self,
        role: UserRole,
        signal: &Signal,
    ) -> Result<(), ScError> {
        let session = role.session();
        let to = self
            .connection_for_role(session, role)
            .ok_or(ScError::ParticipantNotFound(role))?;
        self.signal(session, signal, Some(&to)).await
    }

    pub async fn force_disconnect(
        &self,
        session: SessionName,
        connection_id: &ConnectionId,
    ) -> Result<(), ScError> {
        self.entry(session)?
            .session
            .force_disconnect(connection_id)
            .await
    }

    // ------------------------------------------------------------------
    // Screen capture
    // ------------------------------------------------------------------

    pub async fn start_screen_share(&self, session: SessionName) -> Result<(), ScError> {
        self.entry(session)?.session.start_screen_share().await
    }

    pub async fn end_screen_share(&self, session: SessionName) -> Result<(), ScError> {
        self.entry(session)?.session.end_screen_share().await
    }
}
