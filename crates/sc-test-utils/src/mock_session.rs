//! Recording media session.
//!
//! `MockMediaSession` implements [`MediaSession`] by appending every call to
//! a shared log. Chosen operations can be made to fail, and provider
//! callbacks can be injected once the engine has connected.
//!
//! # Example
//!
//! ```rust,ignore
//! use sc_test_utils::{MockMediaSession, SessionOp};
//!
//! let stage = MockMediaSession::new(SessionName::Stage).failing(SessionOp::StartScreenShare);
//! let registry = SessionRegistry::new(stage.as_session(), None);
//! // ... drive the engine ...
//! assert!(stage.calls().contains(&SessionCall::StartScreenShare));
//! ```

use common::types::{ConnectionId, StreamId};
use stage_controller::errors::ScError;
use stage_controller::gateway::{
    Connection, GatewayEvent, MediaSession, PublishOptions, StreamHandle, SubscribeOptions,
};
use stage_controller::roles::SessionName;
use stage_controller::signaling::{Signal, WireSignal};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Operation names, used to select failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionOp {
    Connect,
    Disconnect,
    Publish,
    Unpublish,
    SetPublishAudio,
    SetPublishVideo,
    Subscribe,
    Unsubscribe,
    SetSubscriberAudio,
    SetSubscriberVolume,
    Signal,
    ForceDisconnect,
    StartScreenShare,
    EndScreenShare,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Connect,
    Disconnect,
    Publish(PublishOptions),
    Unpublish,
    SetPublishAudio(bool),
    SetPublishVideo(bool),
    Subscribe {
        stream_id: StreamId,
        options: SubscribeOptions,
    },
    Unsubscribe(StreamId),
    SetSubscriberAudio {
        stream_id: StreamId,
        enabled: bool,
    },
    SetSubscriberVolume {
        stream_id: StreamId,
        volume: u8,
    },
    Signal {
        signal: WireSignal,
        to: Option<ConnectionId>,
    },
    ForceDisconnect(ConnectionId),
    StartScreenShare,
    EndScreenShare,
}

impl SessionCall {
    #[must_use]
    pub fn op(&self) -> SessionOp {
        match self {
            SessionCall::Connect => SessionOp::Connect,
            SessionCall::Disconnect => SessionOp::Disconnect,
            SessionCall::Publish(_) => SessionOp::Publish,
            SessionCall::Unpublish => SessionOp::Unpublish,
            SessionCall::SetPublishAudio(_) => SessionOp::SetPublishAudio,
            SessionCall::SetPublishVideo(_) => SessionOp::SetPublishVideo,
            SessionCall::Subscribe { .. } => SessionOp::Subscribe,
            SessionCall::Unsubscribe(_) => SessionOp::Unsubscribe,
            SessionCall::SetSubscriberAudio { .. } => SessionOp::SetSubscriberAudio,
            SessionCall::SetSubscriberVolume { .. } => SessionOp::SetSubscriberVolume,
            SessionCall::Signal { .. } => SessionOp::Signal,
            SessionCall::ForceDisconnect(_) => SessionOp::ForceDisconnect,
            SessionCall::StartScreenShare => SessionOp::StartScreenShare,
            SessionCall::EndScreenShare => SessionOp::EndScreenShare,
        }
    }

    /// The decoded signal, if this call sent one.
    #[must_use]
    pub fn signal(&self) -> Option<Signal> {
        match self {
            SessionCall::Signal { signal, .. } => signal.decode().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<SessionCall>,
    failing: HashSet<SessionOp>,
    events: Option<mpsc::Sender<GatewayEvent>>,
}

/// Cloneable recording session. Clones share one log.
#[derive(Debug, Clone)]
pub struct MockMediaSession {
    name: SessionName,
    inner: Arc<Mutex<Inner>>,
}

impl MockMediaSession {
    #[must_use]
    pub fn new(name: SessionName) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Make every future `op` call fail.
    #[must_use]
    pub fn failing(self, op: SessionOp) -> Self {
        self.fail(op);
        self
    }

    pub fn fail(&self, op: SessionOp) {
        self.inner.lock().unwrap().failing.insert(op);
    }

    pub fn recover(&self, op: SessionOp) {
        self.inner.lock().unwrap().failing.remove(&op);
    }

    /// A clone typed for [`stage_controller::gateway::SessionRegistry::new`].
    #[must_use]
    pub fn as_session(&self) -> Arc<dyn MediaSession> {
        Arc::new(self.clone())
    }

    #[must_use]
    pub fn calls(&self) -> Vec<SessionCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    #[must_use]
    pub fn calls_of(&self, op: SessionOp) -> Vec<SessionCall> {
        self.calls().into_iter().filter(|c| c.op() == op).collect()
    }

    /// Signals sent, decoded, with their recipient.
    #[must_use]
    pub fn signals(&self) -> Vec<(Signal, Option<ConnectionId>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SessionCall::Signal { signal, to } => signal.decode().ok().map(|s| (s, to)),
                _ => None,
            })
            .collect()
    }

    /// Position of the first call matching `predicate`.
    #[must_use]
    pub fn position(&self, predicate: impl Fn(&SessionCall) -> bool) -> Option<usize> {
        self.calls().iter().position(predicate)
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().events.is_some()
    }

    /// Deliver a provider callback to the engine.
    ///
    /// # Panics
    ///
    /// Panics if the session has not been connected.
    pub async fn emit(&self, event: GatewayEvent) {
        let sender = self
            .inner
            .lock()
            .unwrap()
            .events
            .clone()
            .expect("session not connected");
        sender.send(event).await.expect("engine gateway channel closed");
    }

    pub async fn emit_stream_created(&self, stream: StreamHandle) {
        self.emit(GatewayEvent::StreamCreated {
            session: self.name,
            stream,
        })
        .await;
    }

    pub async fn emit_stream_destroyed(&self, stream: StreamHandle) {
        self.emit(GatewayEvent::StreamDestroyed {
            session: self.name,
            stream,
        })
        .await;
    }

    pub async fn emit_signal(&self, from: Option<Connection>, signal: &Signal) {
        let signal = signal.to_wire().expect("signal encodes");
        self.emit(GatewayEvent::Signal {
            session: self.name,
            from,
            signal,
        })
        .await;
    }

    fn record(&self, call: SessionCall) -> Result<(), ScError> {
        let op = call.op();
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call);
        if !inner.failing.contains(&op) {
            return Ok(());
        }
        let message = format!("{} {:?} failed", self.name, op);
        Err(match op {
            SessionOp::Signal => ScError::Signal(message),
            SessionOp::StartScreenShare => ScError::Capability(message),
            _ => ScError::Connection(message),
        })
    }
}

#[async_trait::async_trait]
impl MediaSession for MockMediaSession {
    fn name(&self) -> SessionName {
        self.name
    }

    async fn connect(&self, events: mpsc::Sender<GatewayEvent>) -> Result<(), ScError> {
        self.record(SessionCall::Connect)?;
        self.inner.lock().unwrap().events = Some(events);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ScError> {
        self.inner.lock().unwrap().events = None;
        self.record(SessionCall::Disconnect)
    }

    async fn publish(&self, options: PublishOptions) -> Result<(), ScError> {
        self.record(SessionCall::Publish(options))
    }

    async fn unpublish(&self) -> Result<(), ScError> {
        self.record(SessionCall::Unpublish)
    }

    async fn set_publish_audio(&self, enabled: bool) -> Result<(), ScError> {
        self.record(SessionCall::SetPublishAudio(enabled))
    }

    async fn set_publish_video(&self, enabled: bool) -> Result<(), ScError> {
        self.record(SessionCall::SetPublishVideo(enabled))
    }

    async fn subscribe(
        &self,
        stream: &StreamHandle,
        options: SubscribeOptions,
    ) -> Result<(), ScError> {
        self.record(SessionCall::Subscribe {
            stream_id: stream.stream_id.clone(),
            options,
        })
    }

    async fn unsubscribe(&self, stream_id: &StreamId) -> Result<(), ScError> {
        self.record(SessionCall::Unsubscribe(stream_id.clone()))
    }

    async fn set_subscriber_audio(
        &self,
        stream_id: &StreamId,
        enabled: bool,
    ) -> Result<(), ScError> {
        self.record(SessionCall::SetSubscriberAudio {
            stream_id: stream_id.clone(),
            enabled,
        })
    }

    async fn set_subscriber_volume(&self, stream_id: &StreamId, volume: u8) -> Result<(), ScError> {
        self.record(SessionCall::SetSubscriberVolume {
            stream_id: stream_id.clone(),
            volume,
        })
    }

    async fn signal(
        &self,
        signal: &WireSignal,
        to: Option<&ConnectionId>,
    ) -> Result<(), ScError> {
        self.record(SessionCall::Signal {
            signal: signal.clone(),
            to: to.cloned(),
        })
    }

    async fn force_disconnect(&self, connection_id: &ConnectionId) -> Result<(), ScError> {
        self.record(SessionCall::ForceDisconnect(connection_id.clone()))
    }

    async fn start_screen_share(&self) -> Result<(), ScError> {
        self.record(SessionCall::StartScreenShare)
    }

    async fn end_screen_share(&self) -> Result<(), ScError> {
        self.record(SessionCall::EndScreenShare)
    }
}
