//! Store layout for one event.

use crate::roles::{PrivilegedRole, UserRole};
use common::types::FanId;

/// Universal chat channel id.
pub const UNIVERSAL_CHAT_ID: &str = "universal";

/// Paths of an event's records, rooted at the configured event path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPaths {
    root: String,
}

impl EventPaths {
    #[must_use]
    pub fn new(root: impl Into<String>) -> Self {
        let root: String = root.into();
        Self {
            root: root.trim_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    fn child(&self, relative: &str) -> String {
        format!("{}/{relative}", self.root)
    }

    /// Key of the active flag, relative to the root (`hostActive`).
    #[must_use]
    pub fn active_key(role: PrivilegedRole) -> String {
        format!("{}Active", role.as_str())
    }

    /// Key of the heartbeat timestamp, relative to the root (`hostHeartBeat`).
    #[must_use]
    pub fn heartbeat_key(role: PrivilegedRole) -> String {
        format!("{}HeartBeat", role.as_str())
    }

    #[must_use]
    pub fn role_active(&self, role: PrivilegedRole) -> String {
        self.child(&Self::active_key(role))
    }

    #[must_use]
    pub fn role_heartbeat(&self, role: PrivilegedRole) -> String {
        self.child(&Self::heartbeat_key(role))
    }

    #[must_use]
    pub fn private_call(&self) -> String {
        self.child("privateCall")
    }

    #[must_use]
    pub fn screen(&self) -> String {
        self.child("screen")
    }

    #[must_use]
    pub fn volume_root(&self) -> String {
        self.child("volume")
    }

    #[must_use]
    pub fn volume(&self, role: UserRole) -> String {
        self.child(&format!("volume/{}", role.as_str()))
    }

    #[must_use]
    pub fn active_fans(&self) -> String {
        self.child("activeFans")
    }

    #[must_use]
    pub fn active_fan(&self, fan_id: &FanId) -> String {
        self.child(&format!("activeFans/{fan_id}"))
    }

    #[must_use]
    pub fn chat_messages(&self, chat_id: &str) -> String {
        self.child(&format!("chats/{chat_id}/messages"))
    }

    #[must_use]
    pub fn universal_chat(&self) -> String {
        self.child("universalChat/messages")
    }
}
