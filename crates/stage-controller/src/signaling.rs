//! Signal protocol carried over the media sessions' signaling channel.
//!
//! On the wire a signal is a `(type, data)` pair where `data` is an optional
//! JSON object. Providers may namespace the type with the session name
//! (`signal:stage:chatMessage`); only the last `:` segment names the signal.
//! Payloads are decoded once into [`Signal`] at this boundary.

use crate::errors::ScError;
use crate::roles::UserRole;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// On/off flag used by `videoOnOff` and `muteAudio`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    #[must_use]
    pub const fn from_bool(enabled: bool) -> Self {
        if enabled {
            Toggle::On
        } else {
            Toggle::Off
        }
    }

    #[must_use]
    pub const fn is_on(&self) -> bool {
        matches!(self, Toggle::On)
    }
}

/// Payload of a `chatMessage` signal.
///
/// Text and file messages share one flat record; `is_file` selects the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub from_id: String,
    /// Sender kind: a role name or `activeFan`.
    pub from_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    /// Epoch milliseconds; with `from_id` this identifies the message.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Every signal exchanged between the event tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Signal {
    PrepareGoLive,
    GoLive,
    FinishEvent,
    VideoOnOff {
        video: Toggle,
    },
    MuteAudio {
        mute: Toggle,
    },
    ChangeVolume {
        #[serde(rename = "userType")]
        user_type: UserRole,
        volume: u8,
    },
    StartScreenShare,
    EndScreenShare,
    ErrorScreenShareExtension,
    ErrorScreenShare,
    ChatMessage(ChatPayload),
    Disconnect,
    DisconnectBackstage,
    JoinBackstage,
    JoinHost,
    JoinHostNow,
    NewBackstageFan,
}

/// A signal as handed to / received from a media session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireSignal {
    pub kind: String,
    pub data: Option<String>,
}

/// Strip any session namespace from a raw signal type.
#[must_use]
pub fn signal_kind(raw: &str) -> &str {
    raw.rsplit(':').next().unwrap_or(raw)
}

impl Signal {
    /// Wire name of this signal.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Signal::PrepareGoLive => "prepareGoLive",
            Signal::GoLive => "goLive",
            Signal::FinishEvent => "finishEvent",
            Signal::VideoOnOff { .. } => "videoOnOff",
            Signal::MuteAudio { .. } => "muteAudio",
            Signal::ChangeVolume { .. } => "changeVolume",
            Signal::StartScreenShare => "startScreenShare",
            Signal::EndScreenShare => "endScreenShare",
            Signal::ErrorScreenShareExtension => "errorScreenShareExtension",
            Signal::ErrorScreenShare => "errorScreenShare",
            Signal::ChatMessage(_) => "chatMessage",
            Signal::Disconnect => "disconnect",
            Signal::DisconnectBackstage => "disconnectBackstage",
            Signal::JoinBackstage => "joinBackstage",
            Signal::JoinHost => "joinHost",
            Signal::JoinHostNow => "joinHostNow",
            Signal::NewBackstageFan => "newBackstageFan",
        }
    }

    /// Encode for a media session.
    pub fn to_wire(&self) -> Result<WireSignal, ScError> {
        let value = serde_json::to_value(self)
            .map_err(|e| ScError::Internal(format!("signal encode failed: {e}")))?;
        let data = match value.get("data") {
            Some(data) => Some(
                serde_json::to_string(data)
                    .map_err(|e| ScError::Internal(format!("signal encode failed: {e}")))?,
            ),
            None => None,
        };
        Ok(WireSignal {
            kind: self.kind().to_string(),
            data,
        })
    }

    /// Decode a received `(type, data)` pair.
    pub fn from_wire(raw_kind: &str, data: Option<&str>) -> Result<Self, ScError> {
        let kind = signal_kind(raw_kind);
        let mut envelope = Map::new();
        envelope.insert("type".to_string(), Value::String(kind.to_string()));

        if let Some(raw) = data.map(str::trim).filter(|raw| !raw.is_empty()) {
            let payload: Value = serde_json::from_str(raw)
                .map_err(|e| ScError::InvalidSignal(format!("{kind}: {e}")))?;
            let is_empty = match &payload {
                Value::Null => true,
                Value::Object(map) => map.is_empty(),
                _ => false,
            };
            // Unit signals are often sent with an empty `{}` body.
            if !is_empty {
                envelope.insert("data".to_string(), payload);
            }
        }

        serde_json::from_value(Value::Object(envelope))
            .map_err(|e| ScError::InvalidSignal(format!("{kind}: {e}")))
    }
}

impl WireSignal {
    /// Decode into a typed [`Signal`].
    pub fn decode(&self) -> Result<Signal, ScError> {
        Signal::from_wire(&self.kind, self.data.as_deref())
    }
}
