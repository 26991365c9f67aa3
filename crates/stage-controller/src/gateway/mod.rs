//! Session Gateway.
//!
//! Wraps the two independent media sessions ("stage" and "backstage") behind
//! the [`MediaSession`] trait and tracks their streams in a
//! [`SessionRegistry`]. Provider callbacks are delivered upward as
//! [`GatewayEvent`] values on the channel handed to [`MediaSession::connect`].

mod loopback;
mod registry;

pub use loopback::LoopbackSession;
pub use registry::SessionRegistry;

use crate::errors::ScError;
use crate::roles::{SessionName, UserRole};
use crate::signaling::WireSignal;
use common::types::{ConnectionId, FanId, StreamId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Buffer for provider events flowing into the event actor.
pub const GATEWAY_EVENT_BUFFER: usize = 256;

/// Metadata attached to a connection when its client joined a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionData {
    #[serde(default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub fan_id: Option<FanId>,
}

/// A client connection to one media session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub connection_id: ConnectionId,
    /// Raw metadata string, usually JSON (`{"userType":"host"}`).
    pub data: String,
}

impl Connection {
    #[must_use]
    pub fn new(connection_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            connection_id: ConnectionId::new(connection_id),
            data: data.into(),
        }
    }

    /// Parsed metadata. Unparseable metadata is treated as empty.
    #[must_use]
    pub fn metadata(&self) -> ConnectionData {
        serde_json::from_str(&self.data).unwrap_or_default()
    }

    /// Role recovered from the connection metadata.
    #[must_use]
    pub fn role(&self) -> Option<UserRole> {
        self.metadata()
            .user_type
            .as_deref()
            .and_then(UserRole::parse)
    }
}

/// Kind of video a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VideoType {
    Camera,
    Screen,
}

/// A published stream, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandle {
    pub stream_id: StreamId,
    pub connection: Connection,
    pub video_type: VideoType,
}

impl StreamHandle {
    #[must_use]
    pub fn role(&self) -> Option<UserRole> {
        self.connection.role()
    }

    #[must_use]
    pub fn is_screen(&self) -> bool {
        self.video_type == VideoType::Screen
    }
}

/// Weak reference to a stream held by participant state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRef {
    pub session: SessionName,
    pub stream_id: StreamId,
}

/// What the local publisher sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    pub audio: bool,
    pub video: bool,
}

/// What a subscription receives. Both off is a placeholder subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubscribeOptions {
    pub audio: bool,
    pub video: bool,
}

impl SubscribeOptions {
    pub const FULL: Self = Self {
        audio: true,
        video: true,
    };
    pub const VIDEO_ONLY: Self = Self {
        audio: false,
        video: true,
    };
    pub const AUDIO_ONLY: Self = Self {
        audio: true,
        video: false,
    };
    pub const PLACEHOLDER: Self = Self {
        audio: false,
        video: false,
    };
}

/// Connectivity of one session as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Connectivity {
    Reconnecting,
    Reconnected,
    Disconnected,
}

/// Provider callbacks, tagged with the session that raised them.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    StreamCreated {
        session: SessionName,
        stream: StreamHandle,
    },
    StreamDestroyed {
        session: SessionName,
        stream: StreamHandle,
    },
    /// A raw signal. Decoding happens in the engine so bad payloads are logged once.
    Signal {
        session: SessionName,
        from: Option<Connection>,
        signal: WireSignal,
    },
    Connectivity {
        session: SessionName,
        state: Connectivity,
    },
    /// The provider aborted a running screen capture.
    ScreenShareError {
        session: SessionName,
        message: String,
    },
}

/// One media session as exposed by the provider.
///
/// Implementations must be cheap to share; the registry holds them as
/// `Arc<dyn MediaSession>`.
#[async_trait::async_trait]
pub trait MediaSession: Send + Sync {
    fn name(&self) -> SessionName;

    /// Join the session. Provider callbacks are sent on `events` until disconnect.
    async fn connect(&self, events: mpsc::Sender<GatewayEvent>) -> Result<(), ScError>;

    async fn disconnect(&self) -> Result<(), ScError>;

    async fn publish(&self, options: PublishOptions) -> Result<(), ScError>;

    async fn unpublish(&self) -> Result<(), ScError>;

    /// Enable or disable audio on the local publisher.
    async fn set_publish_audio(&self, enabled: bool) -> Result<(), ScError>;

    /// Enable or disable video on the local publisher.
    async fn set_publish_video(&self, enabled: bool) -> Result<(), ScError>;

    async fn subscribe(
        &self,
        stream: &StreamHandle,
        options: SubscribeOptions,
    ) -> Result<(), ScError>;

    async fn unsubscribe(&self, stream_id: &StreamId) -> Result<(), ScError>;

    async fn set_subscriber_audio(&self, stream_id: &StreamId, enabled: bool)
        -> Result<(), ScError>;

    async fn set_subscriber_volume(&self, stream_id: &StreamId, volume: u8)
        -> Result<(), ScError>;

    /// Send a signal to one connection, or broadcast when `to` is `None`.
    async fn signal(&self, signal: &WireSignal, to: Option<&ConnectionId>)
        -> Result<(), ScError>;

    async fn force_disconnect(&self, connection_id: &ConnectionId) -> Result<(), ScError>;

    /// Start desktop capture. Fails with [`ScError::Capability`] if capture is unavailable.
    async fn start_screen_share(&self) -> Result<(), ScError>;

    async fn end_screen_share(&self) -> Result<(), ScError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_role_from_metadata() {
        let conn = Connection::new("c-1", r#"{"userType":"celebrity"}"#);
        assert_eq!(conn.role(), Some(UserRole::Celebrity));

        let fan = Connection::new("c-2", r#"{"userType":"backstageFan","fanId":"42"}"#);
        assert_eq!(fan.role(), Some(UserRole::BackstageFan));
        assert_eq!(fan.metadata().fan_id, Some(FanId::new("42")));
    }

    #[test]
    fn test_connection_with_garbage_metadata_has_no_role() {
        let conn = Connection::new("c-3", "userType=host");
        assert_eq!(conn.role(), None);
        assert_eq!(conn.metadata(), ConnectionData::default());
    }

    #[test]
    fn test_active_fan_connection_is_not_a_seated_role() {
        let conn = Connection::new("c-4", r#"{"userType":"activeFan","fanId":"7"}"#);
        assert_eq!(conn.role(), None);
    }
}
