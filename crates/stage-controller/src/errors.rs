//! Stage Controller error types.
//!
//! Errors map onto how the UI should surface them ([`NoticeKind`]). Internal
//! details are logged but never shown; the UI only sees [`ScError::client_message`].

use crate::roles::{PrivilegedRole, UserRole};
use serde::Serialize;
use thiserror::Error;

/// How an error is surfaced to the person operating the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeKind {
    /// Modal notice; the user must act before continuing.
    Blocking,
    /// Toast-style notice that can be closed.
    Dismissible,
    /// Logged only. Reconciliation on the next heartbeat or snapshot corrects state.
    Silent,
}

/// Stage Controller error type.
#[derive(Debug, Error)]
pub enum ScError {
    /// Media session connect/publish failed (including camera permission denied).
    #[error("Connection error: {0}")]
    Connection(String),

    /// A client capability is missing, e.g. the screen-capture extension.
    #[error("Capability unavailable: {0}")]
    Capability(String),

    /// Another instance of a privileged role holds a fresh presence record.
    #[error("Role {role} is already active elsewhere")]
    LockConflict { role: PrivilegedRole },

    /// A single shared-store operation failed.
    #[error("Store error: {0}")]
    Store(String),

    /// A single signal send failed.
    #[error("Signal error: {0}")]
    Signal(String),

    /// A signal arrived with an unknown type or malformed payload.
    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    /// Fan record is not (or no longer) present in the queue.
    #[error("Fan not found: {0}")]
    FanNotFound(String),

    /// Stream is not tracked by the session registry.
    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    /// No live stream is known for the role.
    #[error("Participant not connected: {0}")]
    ParticipantNotFound(UserRole),

    /// The screen-share slot is owned by another role.
    #[error("Screen share already owned by {0}")]
    ScreenShareOccupied(UserRole),

    /// The local role may not perform the operation.
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScError {
    /// Returns how this error should be surfaced.
    #[must_use]
    pub fn notice_kind(&self) -> NoticeKind {
        match self {
            ScError::Connection(_) | ScError::LockConflict { .. } | ScError::Config(_) => {
                NoticeKind::Blocking
            }
            ScError::Capability(_) | ScError::ScreenShareOccupied(_) | ScError::NotPermitted(_) => {
                NoticeKind::Dismissible
            }
            ScError::Store(_)
            | ScError::Signal(_)
            | ScError::InvalidSignal(_)
            | ScError::FanNotFound(_)
            | ScError::StreamNotFound(_)
            | ScError::ParticipantNotFound(_)
            | ScError::Internal(_) => NoticeKind::Silent,
        }
    }

    /// Returns a UI-safe message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            ScError::Connection(_) => {
                "Unable to connect to the session. Check your camera and microphone permissions"
                    .to_string()
            }
            ScError::Capability(_) => {
                "Screen sharing requires the browser extension to be installed".to_string()
            }
            ScError::LockConflict { role } => {
                format!("There is already a {role} using this url")
            }
            ScError::ScreenShareOccupied(owner) => {
                format!("The screen is currently being shared by the {owner}")
            }
            ScError::NotPermitted(_) => "This action is not available for your role".to_string(),
            ScError::Config(_) => "The event is misconfigured".to_string(),
            ScError::Store(_)
            | ScError::Signal(_)
            | ScError::InvalidSignal(_)
            | ScError::FanNotFound(_)
            | ScError::StreamNotFound(_)
            | ScError::ParticipantNotFound(_)
            | ScError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// Short stable label for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            ScError::Connection(_) => "connection",
            ScError::Capability(_) => "capability",
            ScError::LockConflict { .. } => "lock_conflict",
            ScError::Store(_) => "store",
            ScError::Signal(_) => "signal",
            ScError::InvalidSignal(_) => "invalid_signal",
            ScError::FanNotFound(_) => "fan_not_found",
            ScError::StreamNotFound(_) => "stream_not_found",
            ScError::ParticipantNotFound(_) => "participant_not_found",
            ScError::ScreenShareOccupied(_) => "screen_share_occupied",
            ScError::NotPermitted(_) => "not_permitted",
            ScError::Config(_) => "config",
            ScError::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for ScError {
    fn from(err: serde_json::Error) -> Self {
        ScError::InvalidSignal(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_kinds_follow_taxonomy() {
        assert_eq!(
            ScError::Connection("publish failed".to_string()).notice_kind(),
            NoticeKind::Blocking
        );
        assert_eq!(
            ScError::LockConflict {
                role: PrivilegedRole::Producer
            }
            .notice_kind(),
            NoticeKind::Blocking
        );
        assert_eq!(
            ScError::Capability("extension".to_string()).notice_kind(),
            NoticeKind::Dismissible
        );
        assert_eq!(
            ScError::Store("timeout".to_string()).notice_kind(),
            NoticeKind::Silent
        );
        assert_eq!(
            ScError::Signal("send failed".to_string()).notice_kind(),
            NoticeKind::Silent
        );
    }

    #[test]
    fn test_client_message_hides_internal_details() {
        let err = ScError::Store("permission denied at /event/hostActive".to_string());
        let msg = err.client_message();
        assert!(!msg.contains("hostActive"));
        assert_eq!(msg, "An internal error occurred");
    }

    #[test]
    fn test_lock_conflict_message_names_role() {
        let err = ScError::LockConflict {
            role: PrivilegedRole::Celebrity,
        };
        assert_eq!(
            err.client_message(),
            "There is already a celebrity using this url"
        );
        assert_eq!(err.to_string(), "Role celebrity is already active elsewhere");
    }

    #[test]
    fn test_json_errors_become_invalid_signal() {
        let err: ScError = serde_json::from_str::<u8>("nope").unwrap_err().into();
        assert!(matches!(err, ScError::InvalidSignal(_)));
    }
}
