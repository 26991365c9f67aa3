//! In-process media session with no media.
//!
//! Accepts every call and logs it. Signals are not delivered anywhere. Used by
//! the binary when no media provider is configured, and by registry tests.

use super::{GatewayEvent, MediaSession, PublishOptions, StreamHandle, SubscribeOptions};
use crate::errors::ScError;
use crate::roles::SessionName;
use crate::signaling::WireSignal;
use common::types::{ConnectionId, StreamId};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// A media session that goes nowhere.
pub struct LoopbackSession {
    name: SessionName,
    events: Mutex<Option<mpsc::Sender<GatewayEvent>>>,
}

impl LoopbackSession {
    #[must_use]
    pub fn new(name: SessionName) -> Self {
        Self {
            name,
            events: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl MediaSession for LoopbackSession {
    fn name(&self) -> SessionName {
        self.name
    }

    async fn connect(&self, events: mpsc::Sender<GatewayEvent>) -> Result<(), ScError> {
        *self.events.lock().await = Some(events);
        debug!(target: "sc.gateway.loopback", session = %self.name, "connect");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ScError> {
        self.events.lock().await.take();
        debug!(target: "sc.gateway.loopback", session = %self.name, "disconnect");
        Ok(())
    }

    async fn publish(&self, options: PublishOptions) -> Result<(), ScError> {
        debug!(
            target: "sc.gateway.loopback",
            session = %self.name,
            audio = options.audio,
            video = options.video,
            "publish"
        );
        Ok(())
    }

    async fn unpublish(&self) -> Result<(), ScError> {
        debug!(target: "sc.gateway.loopback", session = %self.name, "unpublish");
        Ok(())
    }

    async fn set_publish_audio(&self, enabled: bool) -> Result<(), ScError> {
        debug!(target: "sc.gateway.loopback", session = %self.name, enabled, "set_publish_audio");
        Ok(())
    }

    async fn set_publish_video(&self, enabled: bool) -> Result<(), ScError> {
        debug!(target: "sc.gateway.loopback", session = %self.name, enabled, "set_publish_video");
        Ok(())
    }

    async fn subscribe(
        &self,
        stream: &StreamHandle,
        options: SubscribeOptions,
    ) -> Result<(), ScError> {
        debug!(
            target: "sc.gateway.loopback",
            session = %self.name,
            stream_id = %stream.stream_id,
            audio = options.audio,
            video = options.video,
            "subscribe"
        );
        Ok(())
    }

    async fn unsubscribe(&self, stream_id: &StreamId) -> Result<(), ScError> {
        debug!(target: "sc.gateway.loopback", session = %self.name, stream_id = %stream_id, "unsubscribe");
        Ok(())
    }

    async fn set_subscriber_audio(
        &self,
        stream_id: &StreamId,
        enabled: bool,
    ) -> Result<(), ScError> {
        debug!(target: "sc.gateway.loopback", session = %self.name, stream_id = %stream_id, enabled, "set_subscriber_audio");
        Ok(())
    }

    async fn set_subscriber_volume(&self, stream_id: &StreamId, volume: u8) -> Result<(), ScError> {
        debug!(target: "sc.gateway.loopback", session = %self.name, stream_id = %stream_id, volume, "set_subscriber_volume");
        Ok(())
    }

    async fn signal(
        &self,
        signal: &WireSignal,
        to: Option<&ConnectionId>,
    ) -> Result<(), ScError> {
        debug!(
            target: "sc.gateway.loopback",
            session = %self.name,
            kind = %signal.kind,
            to = ?to.map(ConnectionId::as_str),
            "signal"
        );
        Ok(())
    }

    async fn force_disconnect(&self, connection_id: &ConnectionId) -> Result<(), ScError> {
        debug!(target: "sc.gateway.loopback", session = %self.name, connection_id = %connection_id, "force_disconnect");
        Ok(())
    }

    async fn start_screen_share(&self) -> Result<(), ScError> {
        Err(ScError::Capability(
            "loopback session has no screen capture".to_string(),
        ))
    }

    async fn end_screen_share(&self) -> Result<(), ScError> {
        Ok(())
    }
}
