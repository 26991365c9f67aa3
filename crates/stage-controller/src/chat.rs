//! Chat Router.
//!
//! Independent chat channels keyed by chat id: a role name for seated
//! participants, `producer` on the host/celebrity side, a fan id for fans in
//! line, and [`UNIVERSAL_CHAT_ID`] for the event-wide room. Direct messages
//! travel as `chatMessage` signals; fan chats and the universal room are also
//! mirrored in the store, so the same message can arrive twice and is
//! deduplicated by `(from_id, timestamp)`.

use crate::engine::{ControllerEvent, Engine};
use crate::errors::ScError;
use crate::observability::metrics;
use crate::presence::now_ms;
use crate::roles::{SessionName, UserRole};
use crate::signaling::{ChatPayload, Signal};
use crate::store::{fields, UNIVERSAL_CHAT_ID};
use common::types::{ConnectionId, FanId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

/// Sender/recipient kinds that identify a fan rather than a seat.
const FAN_TYPES: [&str; 3] = ["fan", "backstageFan", "activeFan"];

/// Chat id the host and celebrity use for their channel with the producer.
pub const PRODUCER_CHAT_ID: &str = "producer";

/// Name used when the sender has none.
pub const ANONYMOUS: &str = "Anonymous";

#[must_use]
pub fn is_fan_type(kind: &str) -> bool {
    FAN_TYPES.contains(&kind)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChatContent {
    Text {
        text: String,
    },
    File {
        url: String,
        mime_type: String,
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub from_id: String,
    pub from_type: String,
    pub from_name: Option<String>,
    pub timestamp: i64,
    pub content: ChatContent,
    pub is_me: bool,
}

impl ChatMessage {
    /// Two copies of one message share this.
    #[must_use]
    pub fn identity(&self) -> (&str, i64) {
        (&self.from_id, self.timestamp)
    }

    /// Build from a wire payload. A file message without a url is rejected.
    pub fn from_payload(payload: ChatPayload, is_me: bool) -> Result<Self, ScError> {
        let content = if payload.is_file {
            ChatContent::File {
                url: payload
                    .url
                    .ok_or_else(|| ScError::InvalidSignal("chat file without url".to_string()))?,
                mime_type: payload.mime_type.unwrap_or_default(),
                name: payload.name.unwrap_or_default(),
            }
        } else {
            ChatContent::Text {
                text: payload.text.unwrap_or_default(),
            }
        };
        Ok(Self {
            from_id: payload.from_id,
            from_type: payload.from_type,
            from_name: payload.from_name,
            timestamp: payload.timestamp,
            content,
            is_me,
        })
    }

    #[must_use]
    pub fn to_payload(&self) -> ChatPayload {
        let mut payload = ChatPayload {
            from_id: self.from_id.clone(),
            from_type: self.from_type.clone(),
            from_name: self.from_name.clone(),
            timestamp: self.timestamp,
            text: None,
            is_file: false,
            url: None,
            mime_type: None,
            name: None,
        };
        match &self.content {
            ChatContent::Text { text } => payload.text = Some(text.clone()),
            ChatContent::File {
                url,
                mime_type,
                name,
            } => {
                payload.is_file = true;
                payload.url = Some(url.clone());
                payload.mime_type = Some(mime_type.clone());
                payload.name = Some(name.clone());
            }
        }
        payload
    }
}

/// A universal-chat entry as stored under `universalChat/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UniversalRecord {
    #[serde(default)]
    text: Option<String>,
    from_id: String,
    #[serde(default)]
    from_name: Option<String>,
    timestamp: i64,
    #[serde(default)]
    is_file: bool,
    #[serde(default)]
    url: Option<String>,
    #[serde(rename = "type", default)]
    mime_type: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl UniversalRecord {
    fn into_payload(self) -> ChatPayload {
        ChatPayload {
            from_id: self.from_id,
            from_type: String::new(),
            from_name: self.from_name,
            timestamp: self.timestamp,
            text: self.text,
            is_file: self.is_file,
            url: self.url,
            mime_type: self.mime_type,
            name: self.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatChannel {
    pub chat_id: String,
    /// Recipient kind: a role name or `activeFan`.
    pub to_type: String,
    pub session: SessionName,
    pub fan_id: Option<FanId>,
    pub messages: Vec<ChatMessage>,
    pub displayed: bool,
    pub minimized: bool,
    pub in_private_call: bool,
}

impl ChatChannel {
    fn new(chat_id: String, to_type: String, fan_id: Option<FanId>) -> Self {
        let session = session_for(&to_type);
        Self {
            chat_id,
            to_type,
            session,
            fan_id,
            messages: Vec::new(),
            displayed: false,
            minimized: false,
            in_private_call: false,
        }
    }

    fn contains(&self, message: &ChatMessage) -> bool {
        self.messages
            .iter()
            .any(|m| m.identity() == message.identity())
    }

    /// Append unless a copy is already present.
    fn append(&mut self, message: ChatMessage) -> bool {
        if self.contains(&message) {
            return false;
        }
        self.messages.push(message);
        true
    }
}

/// Session a recipient kind is reached on.
fn session_for(to_type: &str) -> SessionName {
    match to_type {
        "backstageFan" | "activeFan" => SessionName::Backstage,
        _ => SessionName::Stage,
    }
}

/// Compact per-channel view for state snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub chat_id: String,
    pub to_type: String,
    pub message_count: usize,
    pub displayed: bool,
    pub minimized: bool,
    pub in_private_call: bool,
}

impl From<&ChatChannel> for ChatSummary {
    fn from(channel: &ChatChannel) -> Self {
        Self {
            chat_id: channel.chat_id.clone(),
            to_type: channel.to_type.clone(),
            message_count: channel.messages.len(),
            displayed: channel.displayed,
            minimized: channel.minimized,
            in_private_call: channel.in_private_call,
        }
    }
}

/// Every chat channel of the local client.
#[derive(Debug, Clone)]
pub struct ChatRouter {
    channels: BTreeMap<String, ChatChannel>,
    universal: ChatChannel,
}

impl Default for ChatRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatRouter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: BTreeMap::new(),
            universal: ChatChannel::new(UNIVERSAL_CHAT_ID.to_string(), UNIVERSAL_CHAT_ID.to_string(), None),
        }
    }

    #[must_use]
    pub fn get(&self, chat_id: &str) -> Option<&ChatChannel> {
        if chat_id == UNIVERSAL_CHAT_ID {
            return Some(&self.universal);
        }
        self.channels.get(chat_id)
    }

    pub fn channels(&self) -> impl Iterator<Item = &ChatChannel> {
        self.channels.values()
    }

    #[must_use]
    pub fn universal(&self) -> &ChatChannel {
        &self.universal
    }

    #[must_use]
    pub fn summaries(&self) -> Vec<ChatSummary> {
        std::iter::once(&self.universal)
            .chain(self.channels.values())
            .map(ChatSummary::from)
            .collect()
    }

    fn channel_mut(&mut self, chat_id: &str) -> Option<&mut ChatChannel> {
        if chat_id == UNIVERSAL_CHAT_ID {
            return Some(&mut self.universal);
        }
        self.channels.get_mut(chat_id)
    }

    /// Open a channel if it does not exist yet. Returns whether it was created.
    pub fn open(&mut self, chat_id: &str, to_type: &str, fan_id: Option<FanId>) -> bool {
        if self.get(chat_id).is_some() {
            return false;
        }
        self.channels.insert(
            chat_id.to_string(),
            ChatChannel::new(chat_id.to_string(), to_type.to_string(), fan_id),
        );
        true
    }

    pub fn remove(&mut self, chat_id: &str) -> Option<ChatChannel> {
        let removed = self.channels.remove(chat_id);
        if removed.is_some() {
            debug!(target: "sc.chat", chat_id, "Chat removed");
        }
        removed
    }

    pub fn minimize(&mut self, chat_id: &str, minimized: bool) -> bool {
        self.channel_mut(chat_id)
            .map(|c| c.minimized = minimized)
            .is_some()
    }

    pub fn display(&mut self, chat_id: &str, displayed: bool) -> bool {
        self.channel_mut(chat_id)
            .map(|c| c.displayed = displayed)
            .is_some()
    }

    /// Point a channel at a new recipient kind, e.g. after a fan changed seats.
    pub fn retarget(&mut self, chat_id: &str, to_type: &str) {
        if let Some(channel) = self.channels.get_mut(chat_id) {
            if channel.to_type != to_type {
                debug!(target: "sc.chat", chat_id, from = %channel.to_type, to = to_type, "Chat retargeted");
                channel.to_type = to_type.to_string();
                channel.session = session_for(to_type);
            }
        }
    }

    pub fn set_in_private_call(&mut self, chat_id: &str, in_call: bool) {
        if let Some(channel) = self.channels.get_mut(chat_id) {
            channel.in_private_call = in_call;
        }
    }

    /// Record a message we sent. The channel is shown.
    pub fn record_sent(&mut self, chat_id: &str, message: ChatMessage) -> bool {
        let Some(channel) = self.channel_mut(chat_id) else {
            return false;
        };
        channel.displayed = true;
        channel.append(message)
    }

    /// Route an incoming `chatMessage`. Returns the chat id and whether it was new.
    pub fn receive(&mut self, payload: ChatPayload) -> Result<(String, bool), ScError> {
        let chat_id = if is_fan_type(&payload.from_type) {
            payload.from_id.clone()
        } else {
            payload.from_type.clone()
        };
        let fan_id = is_fan_type(&payload.from_type).then(|| FanId::new(payload.from_id.clone()));
        let to_type = payload.from_type.clone();
        let message = ChatMessage::from_payload(payload, false)?;

        self.open(&chat_id, &to_type, fan_id);
        let Some(channel) = self.channel_mut(&chat_id) else {
            return Err(ScError::Internal(format!("chat {chat_id} vanished")));
        };
        channel.displayed = true;
        channel.minimized = false;
        let appended = channel.append(message);
        Ok((chat_id, appended))
    }

    /// Merge a universal-chat snapshot. Returns the messages that were new.
    pub fn on_universal_snapshot(&mut self, snapshot: Option<&Value>, local_id: &str) -> Vec<ChatMessage> {
        let added = merge_records::<UniversalRecord>(snapshot, |record| {
            let payload = record.into_payload();
            let is_me = payload.from_id == local_id;
            ChatMessage::from_payload(payload, is_me)
        })
        .into_iter()
        .filter(|m| self.universal.append(m.clone()))
        .collect::<Vec<_>>();
        if !added.is_empty() {
            self.universal.displayed = true;
        }
        added
    }

    /// Merge a fan chat snapshot from `chats/{fanId}/messages`.
    ///
    /// The first load opens the channel hidden; later messages show it.
    pub fn on_fan_snapshot(
        &mut self,
        fan_id: &FanId,
        to_type: &str,
        snapshot: Option<&Value>,
        local_id: &str,
    ) -> Vec<ChatMessage> {
        let created = self.open(fan_id.as_str(), to_type, Some(fan_id.clone()));
        let messages = merge_records::<ChatPayload>(snapshot, |payload| {
            let is_me = payload.from_id == local_id;
            ChatMessage::from_payload(payload, is_me)
        });
        let Some(channel) = self.channels.get_mut(fan_id.as_str()) else {
            return Vec::new();
        };
        let added: Vec<ChatMessage> = messages
            .into_iter()
            .filter(|m| channel.append(m.clone()))
            .collect();
        if !created && !added.is_empty() {
            channel.displayed = true;
        }
        added
    }
}

/// Decode an ordered message list (object of push keys or an array).
fn merge_records<T: serde::de::DeserializeOwned>(
    snapshot: Option<&Value>,
    convert: impl Fn(T) -> Result<ChatMessage, ScError>,
) -> Vec<ChatMessage> {
    let items: Vec<&Value> = match snapshot {
        Some(Value::Object(map)) => map.values().collect(),
        Some(Value::Array(list)) => list.iter().collect(),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|raw| {
            serde_json::from_value::<T>(raw.clone())
                .map_err(ScError::from)
                .and_then(&convert)
                .map_err(|e| warn!(target: "sc.chat", error = %e, "Skipping malformed chat message"))
                .ok()
        })
        .collect()
}

impl Engine {
    /// Sender id in the universal room; anonymous clients share one id.
    fn universal_sender_id(&self) -> &str {
        if self.settings.user_id.is_empty() {
            ANONYMOUS
        } else {
            &self.settings.user_id
        }
    }

    fn local_message(&self, content: ChatContent) -> ChatMessage {
        ChatMessage {
            from_id: self.settings.user_id.clone(),
            from_type: self.settings.role.as_str().to_string(),
            from_name: Some(self.settings.display_name.clone()),
            timestamp: now_ms(),
            content,
            is_me: true,
        }
    }

    /// Open the channel for `chat_id` from what we know about the recipient.
    fn ensure_chat(&mut self, chat_id: &str) -> Result<(), ScError> {
        if self.chats.get(chat_id).is_some() {
            return Ok(());
        }
        if chat_id == PRODUCER_CHAT_ID {
            self.chats.open(chat_id, UserRole::Producer.as_str(), None);
            return Ok(());
        }
        if let Some(role) = UserRole::parse(chat_id) {
            self.chats.open(chat_id, role.as_str(), None);
            return Ok(());
        }
        let fan_id = FanId::new(chat_id);
        let fan = self
            .fans
            .get(&fan_id)
            .ok_or_else(|| ScError::FanNotFound(chat_id.to_string()))?;
        let to_type = fan.chat_type();
        self.chats.open(chat_id, to_type, Some(fan_id));
        Ok(())
    }

    /// Session and connection a channel delivers to.
    fn chat_destination(&self, channel: &ChatChannel) -> Result<(SessionName, ConnectionId), ScError> {
        if let Some(fan_id) = &channel.fan_id {
            if channel.to_type == UserRole::Fan.as_str() {
                if let Some(conn) = self.registry.connection_for_role(SessionName::Stage, UserRole::Fan) {
                    return Ok((SessionName::Stage, conn));
                }
            }
            let stream_id = self
                .fans
                .get(fan_id)
                .and_then(|f| f.stream_id.clone())
                .ok_or_else(|| ScError::FanNotFound(fan_id.to_string()))?;
            let stream = self
                .registry
                .stream(SessionName::Backstage, &stream_id)
                .ok_or_else(|| ScError::StreamNotFound(stream_id.to_string()))?;
            return Ok((SessionName::Backstage, stream.connection.connection_id.clone()));
        }
        let role = UserRole::parse(&channel.to_type)
            .ok_or_else(|| ScError::Internal(format!("chat {} has no recipient", channel.chat_id)))?;
        let session = role.session();
        let conn = self
            .registry
            .connection_for_role(session, role)
            .ok_or(ScError::ParticipantNotFound(role))?;
        Ok((session, conn))
    }

    /// Send a direct message. Delivery failures are logged; the message is kept.
    #[instrument(skip_all, name = "sc.chat.send", fields(chat_id = %chat_id))]
    pub(crate) async fn send_chat(
        &mut self,
        chat_id: &str,
        content: ChatContent,
    ) -> Result<ChatMessage, ScError> {
        if chat_id == UNIVERSAL_CHAT_ID {
            return self.send_universal_chat(content).await;
        }
        self.ensure_chat(chat_id)?;
        let message = self.local_message(content);

        let destination = self
            .chats
            .get(chat_id)
            .ok_or_else(|| ScError::Internal(format!("chat {chat_id} vanished")))
            .and_then(|channel| self.chat_destination(channel));
        let delivery = match destination {
            Ok((session, to)) => {
                self.registry
                    .signal(session, &Signal::ChatMessage(message.to_payload()), Some(&to))
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = delivery {
            warn!(target: "sc.chat", chat_id, error = %e, "Chat message not delivered");
        }

        self.chats.record_sent(chat_id, message.clone());
        metrics::record_chat_message("sent");
        self.emit(ControllerEvent::ChatMessage {
            chat_id: chat_id.to_string(),
            message: message.clone(),
        });
        Ok(message)
    }

    /// Post to the universal room. The store echo is deduplicated.
    pub(crate) async fn send_universal_chat(
        &mut self,
        content: ChatContent,
    ) -> Result<ChatMessage, ScError> {
        let mut message = self.local_message(content);
        // The echo must carry the same identity as the local copy
        message.from_id = self.universal_sender_id().to_string();
        let mut record = fields([
            ("fromId", json!(message.from_id)),
            ("fromName", json!(message.from_name.as_deref().unwrap_or(ANONYMOUS))),
            ("timestamp", json!(message.timestamp)),
        ]);
        match &message.content {
            ChatContent::Text { text } => {
                record.insert("text".to_string(), json!(text));
            }
            ChatContent::File {
                url,
                mime_type,
                name,
            } => {
                record.extend(fields([
                    ("isFile", json!(true)),
                    ("url", json!(url)),
                    ("type", json!(mime_type)),
                    ("name", json!(name)),
                ]));
            }
        }
        if let Err(e) = self.store.push(&self.paths.universal_chat(), Value::Object(record)).await {
            warn!(target: "sc.chat", error = %e, "Universal chat message not stored");
        }
        self.chats.record_sent(UNIVERSAL_CHAT_ID, message.clone());
        metrics::record_chat_message("sent");
        self.emit(ControllerEvent::ChatMessage {
            chat_id: UNIVERSAL_CHAT_ID.to_string(),
            message: message.clone(),
        });
        Ok(message)
    }

    /// Producer: open (or surface) the chat with a fan in line.
    pub(crate) fn start_fan_chat(&mut self, fan_id: &FanId) -> Result<(), ScError> {
        self.ensure_chat(fan_id.as_str())?;
        self.chats.display(fan_id.as_str(), true);
        self.chats.minimize(fan_id.as_str(), false);
        Ok(())
    }

    /// Open hidden channels for every connected participant and fan in line.
    pub(crate) fn start_all_chats(&mut self) {
        let local = self.settings.role.user_role();
        let roles: Vec<UserRole> = self
            .participants
            .iter()
            .filter(|s| s.is_connected() && s.role != local && s.role != UserRole::Producer)
            .map(|s| s.role)
            .collect();
        for role in roles {
            self.chats.open(role.as_str(), role.as_str(), None);
        }
        if local != UserRole::Producer {
            self.chats
                .open(PRODUCER_CHAT_ID, UserRole::Producer.as_str(), None);
        }
        let fans: Vec<(FanId, &'static str)> = self
            .fans
            .in_line()
            .into_iter()
            .map(|f| (f.fan_id.clone(), f.chat_type()))
            .collect();
        for (fan_id, to_type) in fans {
            self.chats.open(fan_id.as_str(), to_type, Some(fan_id.clone()));
        }
    }

    /// A `chatMessage` signal arrived.
    pub(crate) fn on_chat_signal(&mut self, payload: ChatPayload) {
        match self.chats.receive(payload) {
            Ok((chat_id, true)) => {
                metrics::record_chat_message("received");
                if let Some(message) = self.chats.get(&chat_id).and_then(|c| c.messages.last()).cloned() {
                    self.emit(ControllerEvent::ChatMessage { chat_id, message });
                }
            }
            Ok((chat_id, false)) => {
                debug!(target: "sc.chat", chat_id = %chat_id, "Duplicate chat message dropped");
            }
            Err(e) => warn!(target: "sc.chat", error = %e, "Rejected chat message"),
        }
    }

    pub(crate) fn on_universal_chat(&mut self, value: Option<Value>) {
        let local_id = self.universal_sender_id().to_string();
        let added = self.chats.on_universal_snapshot(value.as_ref(), &local_id);
        for message in added.into_iter().filter(|m| !m.is_me) {
            metrics::record_chat_message("received");
            self.emit(ControllerEvent::ChatMessage {
                chat_id: UNIVERSAL_CHAT_ID.to_string(),
                message,
            });
        }
    }

    pub(crate) fn on_fan_chat(&mut self, fan_id: &FanId, value: Option<Value>) {
        let to_type = self.fans.get(fan_id).map_or("activeFan", |f| f.chat_type());
        let added = self
            .chats
            .on_fan_snapshot(fan_id, to_type, value.as_ref(), &self.settings.user_id);
        for message in added.into_iter().filter(|m| !m.is_me) {
            metrics::record_chat_message("received");
            self.emit(ControllerEvent::ChatMessage {
                chat_id: fan_id.to_string(),
                message,
            });
        }
    }
}
