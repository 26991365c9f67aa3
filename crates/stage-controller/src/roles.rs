//! Role and session vocabulary.
//!
//! Every role name here doubles as a store key fragment (`hostActive`,
//! `volume/backstageFan`) and a signal payload value, so the serde names are
//! part of the wire format.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the two media sessions an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionName {
    /// On-air session: producer, host, celebrity and the on-stage fan.
    Stage,
    /// Waiting-fan pool plus the backstage fan.
    Backstage,
}

impl SessionName {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionName::Stage => "stage",
            SessionName::Backstage => "backstage",
        }
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any role that can appear in an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserRole {
    Producer,
    Host,
    Celebrity,
    /// The fan currently on stage.
    Fan,
    /// The fan currently backstage, next in line for the stage.
    BackstageFan,
}

impl UserRole {
    pub const ALL: [UserRole; 5] = [
        UserRole::Producer,
        UserRole::Host,
        UserRole::Celebrity,
        UserRole::Fan,
        UserRole::BackstageFan,
    ];

    /// Store/wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            UserRole::Producer => "producer",
            UserRole::Host => "host",
            UserRole::Celebrity => "celebrity",
            UserRole::Fan => "fan",
            UserRole::BackstageFan => "backstageFan",
        }
    }

    /// Parse a wire name. `activeFan` is not a participant role and yields `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "producer" => Some(UserRole::Producer),
            "host" => Some(UserRole::Host),
            "celebrity" => Some(UserRole::Celebrity),
            "fan" => Some(UserRole::Fan),
            "backstageFan" => Some(UserRole::BackstageFan),
            _ => None,
        }
    }

    /// Roles that are seen by the audience.
    #[must_use]
    pub const fn is_on_stage(&self) -> bool {
        matches!(self, UserRole::Fan | UserRole::Host | UserRole::Celebrity)
    }

    /// Session on which the other tiers reach this role's stream and connection.
    #[must_use]
    pub const fn session(&self) -> SessionName {
        match self {
            UserRole::BackstageFan => SessionName::Backstage,
            _ => SessionName::Stage,
        }
    }

    #[must_use]
    pub const fn is_fan(&self) -> bool {
        matches!(self, UserRole::Fan | UserRole::BackstageFan)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Roles limited to a single live instance, guarded by a presence record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrivilegedRole {
    Producer,
    Host,
    Celebrity,
}

impl PrivilegedRole {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            PrivilegedRole::Producer => "producer",
            PrivilegedRole::Host => "host",
            PrivilegedRole::Celebrity => "celebrity",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "producer" => Some(PrivilegedRole::Producer),
            "host" => Some(PrivilegedRole::Host),
            "celebrity" => Some(PrivilegedRole::Celebrity),
            _ => None,
        }
    }

    #[must_use]
    pub const fn user_role(&self) -> UserRole {
        match self {
            PrivilegedRole::Producer => UserRole::Producer,
            PrivilegedRole::Host => UserRole::Host,
            PrivilegedRole::Celebrity => UserRole::Celebrity,
        }
    }
}

impl fmt::Display for PrivilegedRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who the producer is in a private call with.
///
/// `ActiveFan` is a fan still in the waiting pool (reached over backstage
/// with a full audio/video subscription); every other variant is a seated role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallTarget {
    Host,
    Celebrity,
    Fan,
    BackstageFan,
    ActiveFan,
}

impl CallTarget {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CallTarget::Host => "host",
            CallTarget::Celebrity => "celebrity",
            CallTarget::Fan => "fan",
            CallTarget::BackstageFan => "backstageFan",
            CallTarget::ActiveFan => "activeFan",
        }
    }

    /// The seated role, if any. `ActiveFan` has none.
    #[must_use]
    pub const fn user_role(&self) -> Option<UserRole> {
        match self {
            CallTarget::Host => Some(UserRole::Host),
            CallTarget::Celebrity => Some(UserRole::Celebrity),
            CallTarget::Fan => Some(UserRole::Fan),
            CallTarget::BackstageFan => Some(UserRole::BackstageFan),
            CallTarget::ActiveFan => None,
        }
    }

    /// Session the producer publishes call audio on.
    #[must_use]
    pub const fn session(&self) -> SessionName {
        match self {
            CallTarget::Host | CallTarget::Celebrity | CallTarget::Fan => SessionName::Stage,
            CallTarget::BackstageFan | CallTarget::ActiveFan => SessionName::Backstage,
        }
    }

    /// Call target for a seated role. The producer cannot be called.
    #[must_use]
    pub const fn for_role(role: UserRole) -> Option<Self> {
        match role {
            UserRole::Host => Some(CallTarget::Host),
            UserRole::Celebrity => Some(CallTarget::Celebrity),
            UserRole::Fan => Some(CallTarget::Fan),
            UserRole::BackstageFan => Some(CallTarget::BackstageFan),
            UserRole::Producer => None,
        }
    }

    #[must_use]
    pub const fn is_fan(&self) -> bool {
        matches!(
            self,
            CallTarget::Fan | CallTarget::BackstageFan | CallTarget::ActiveFan
        )
    }
}

impl fmt::Display for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two fan seats a fan can be kicked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FanSeat {
    /// On stage.
    Fan,
    /// Backstage.
    BackstageFan,
}

impl FanSeat {
    #[must_use]
    pub const fn user_role(&self) -> UserRole {
        match self {
            FanSeat::Fan => UserRole::Fan,
            FanSeat::BackstageFan => UserRole::BackstageFan,
        }
    }
}
