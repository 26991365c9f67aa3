//! Identifier newtypes.
//!
//! Identifiers are minted by external collaborators (the shared store mints
//! fan ids, the media provider mints stream and connection ids), so they are
//! opaque strings rather than UUIDs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a fan, as keyed under `activeFans/` in the shared store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FanId(pub String);

impl FanId {
    /// Wrap a raw fan id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a published media stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub String);

impl StreamId {
    /// Wrap a raw stream id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a connection to a media session. Signals are addressed to these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Wrap a raw connection id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_id_serializes_as_bare_string() {
        let id = FanId::new("42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"42\"");

        let parsed: FanId = serde_json::from_str("\"-Nabc\"").unwrap();
        assert_eq!(parsed.as_str(), "-Nabc");
    }

    #[test]
    fn test_ids_display_raw_value() {
        assert_eq!(StreamId::new("s-1").to_string(), "s-1");
        assert_eq!(ConnectionId::new("c-9").to_string(), "c-9");
    }

    #[test]
    fn test_fan_ids_order_lexically() {
        let mut ids = vec![FanId::new("b"), FanId::new("a"), FanId::new("c")];
        ids.sort();
        assert_eq!(ids, vec![FanId::new("a"), FanId::new("b"), FanId::new("c")]);
    }
}
