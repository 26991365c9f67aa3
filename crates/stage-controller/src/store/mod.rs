//! Shared store boundary.
//!
//! The event's ground truth lives in an external, path-addressed document
//! store. Subscriptions have value-replace semantics: every notification
//! carries the whole current value at the watched path (or `None` once it is
//! gone), delivered in write order for that path only.

mod listeners;
mod memory;
mod paths;

pub use listeners::{ListenerSet, StoreNotification, StoreWatch};
pub use memory::MemoryStore;
pub use paths::{EventPaths, UNIVERSAL_CHAT_ID};

use crate::errors::ScError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// What the store does on our behalf if the client vanishes.
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectAction {
    Remove,
    Set(Value),
    /// Merge these (relative) child paths into the registered path.
    Update(Map<String, Value>),
}

/// A live subscription to one path.
#[derive(Debug)]
pub struct StoreSubscription {
    pub path: String,
    pub receiver: mpsc::UnboundedReceiver<Option<Value>>,
}

/// Real-time key/value store with on-disconnect hooks.
#[async_trait::async_trait]
pub trait SharedStore: Send + Sync {
    /// Read once. `None` if nothing is stored at the path.
    async fn read(&self, path: &str) -> Result<Option<Value>, ScError>;

    /// Replace the value at a path. Writing `null` removes it.
    async fn write(&self, path: &str, value: Value) -> Result<(), ScError>;

    /// Write several child paths (relative to `path`) in one call.
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), ScError>;

    async fn remove(&self, path: &str) -> Result<(), ScError>;

    /// Append under an ordered, store-generated key and return that key.
    async fn push(&self, path: &str, value: Value) -> Result<String, ScError>;

    /// Watch a path. The current value is delivered first.
    async fn subscribe(&self, path: &str) -> Result<StoreSubscription, ScError>;

    async fn on_disconnect(&self, path: &str, action: DisconnectAction) -> Result<(), ScError>;

    /// Drop every on-disconnect hook registered at or below `path`.
    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), ScError>;
}

/// Decode a stored value, treating absence as `None`.
pub fn decode<T: DeserializeOwned>(path: &str, value: Option<Value>) -> Result<Option<T>, ScError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ScError::Store(format!("unexpected value at {path}: {e}"))),
    }
}

/// Build an update map from `(key, value)` pairs.
#[must_use]
pub fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
