//! Shared store with failure injection.
//!
//! `FlakyStore` wraps a [`MemoryStore`] and fails writes (`write`, `update`,
//! `remove`, `push`) at chosen paths with [`ScError::Store`]. Reads,
//! subscriptions and hooks always go through.

use serde_json::{Map, Value};
use stage_controller::errors::ScError;
use stage_controller::store::{DisconnectAction, MemoryStore, SharedStore, StoreSubscription};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl FlakyStore {
    #[must_use]
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing: Arc::default(),
        }
    }

    /// Make every write to exactly `path` fail.
    pub fn fail_writes_to(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// The wrapped store, for seeding and assertions.
    #[must_use]
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check(&self, path: &str) -> Result<(), ScError> {
        if self.failing.lock().unwrap().contains(path) {
            return Err(ScError::Store(format!("injected write failure at {path}")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SharedStore for FlakyStore {
    async fn read(&self, path: &str) -> Result<Option<Value>, ScError> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), ScError> {
        self.check(path)?;
        self.inner.write(path, value).await
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), ScError> {
        self.check(path)?;
        self.inner.update(path, fields).await
    }

    async fn remove(&self, path: &str) -> Result<(), ScError> {
        self.check(path)?;
        self.inner.remove(path).await
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, ScError> {
        self.check(path)?;
        self.inner.push(path, value).await
    }

    async fn subscribe(&self, path: &str) -> Result<StoreSubscription, ScError> {
        self.inner.subscribe(path).await
    }

    async fn on_disconnect(&self, path: &str, action: DisconnectAction) -> Result<(), ScError> {
        self.inner.on_disconnect(path, action).await
    }

    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), ScError> {
        self.inner.cancel_on_disconnect(path).await
    }
}
