//! Message types for the event actor.
//!
//! UI commands travel over `tokio::sync::mpsc`; each carries a
//! `tokio::sync::oneshot` sender for the reply.

use crate::chat::{ChatContent, ChatMessage};
use crate::engine::EventState;
use crate::errors::ScError;
use crate::participants::ParticipantProperty;
use crate::roles::{CallTarget, FanSeat, UserRole};
use crate::screen_share::ScreenShareAction;
use crate::workflow::WorkflowReport;
use common::types::FanId;
use tokio::sync::oneshot;

/// Messages sent to `EventActor`.
#[derive(Debug)]
pub enum EventMessage {
    /// Take the role's presence lock, connect and publish.
    Join {
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    /// Release the role and disconnect.
    Leave {
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    GetState {
        respond_to: oneshot::Sender<EventState>,
    },

    SendToBackstage {
        fan_id: FanId,
        respond_to: oneshot::Sender<Result<WorkflowReport, ScError>>,
    },

    SendToStage {
        respond_to: oneshot::Sender<Result<WorkflowReport, ScError>>,
    },

    KickFan {
        seat: FanSeat,
        respond_to: oneshot::Sender<Result<WorkflowReport, ScError>>,
    },

    ForceFanDisconnect {
        fan_id: FanId,
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    /// Start, end or switch a private call (end if the same target is already in call).
    ConnectPrivateCall {
        target: CallTarget,
        fan_id: Option<FanId>,
        respond_to: oneshot::Sender<Result<WorkflowReport, ScError>>,
    },

    EndPrivateCall {
        respond_to: oneshot::Sender<Result<WorkflowReport, ScError>>,
    },

    ScreenShare {
        action: ScreenShareAction,
        target: UserRole,
        respond_to: oneshot::Sender<Result<WorkflowReport, ScError>>,
    },

    ToggleParticipantProperty {
        role: UserRole,
        property: ParticipantProperty,
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    SendChat {
        chat_id: String,
        content: ChatContent,
        respond_to: oneshot::Sender<Result<ChatMessage, ScError>>,
    },

    StartFanChat {
        fan_id: FanId,
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    StartAllChats {
        respond_to: oneshot::Sender<()>,
    },

    /// Minimize or restore a chat window. Replies `false` for an unknown chat.
    MinimizeChat {
        chat_id: String,
        minimized: bool,
        respond_to: oneshot::Sender<bool>,
    },

    /// Show or hide a chat window. Replies `false` for an unknown chat.
    DisplayChat {
        chat_id: String,
        displayed: bool,
        respond_to: oneshot::Sender<bool>,
    },

    GoLive {
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },

    FinishEvent {
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },
}
