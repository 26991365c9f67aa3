//! Store listeners feeding the event actor.
//!
//! Each attached watch gets a forwarding task that tags the raw notifications
//! with a [`StoreWatch`] and posts them into the actor's store channel. All
//! tasks hang off one child token so teardown can detach them in one step.

use super::SharedStore;
use crate::errors::ScError;
use crate::roles::PrivilegedRole;
use common::types::FanId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What a notification is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreWatch {
    ActiveFans,
    Volume,
    Screen,
    PrivateCall,
    RoleActive(PrivilegedRole),
    UniversalChat,
    FanChat(FanId),
}

/// One value-replace notification.
#[derive(Debug, Clone)]
pub struct StoreNotification {
    pub watch: StoreWatch,
    pub value: Option<Value>,
}

/// The set of active store listeners for one event.
pub struct ListenerSet {
    store: Arc<dyn SharedStore>,
    sender: mpsc::UnboundedSender<StoreNotification>,
    token: CancellationToken,
    watches: HashMap<StoreWatch, CancellationToken>,
}

impl ListenerSet {
    #[must_use]
    pub fn new(
        store: Arc<dyn SharedStore>,
        sender: mpsc::UnboundedSender<StoreNotification>,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            store,
            sender,
            token: parent.child_token(),
            watches: HashMap::new(),
        }
    }

    #[must_use]
    pub fn is_attached(&self, watch: &StoreWatch) -> bool {
        self.watches.contains_key(watch)
    }

    /// Number of attached watches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Start forwarding notifications for `path`. Attaching twice is a no-op.
    pub async fn attach(&mut self, watch: StoreWatch, path: String) -> Result<(), ScError> {
        if self.is_attached(&watch) {
            return Ok(());
        }
        let mut subscription = self.store.subscribe(&path).await?;
        let token = self.token.child_token();
        let sender = self.sender.clone();
        let task_token = token.clone();
        let task_watch = watch.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = task_token.cancelled() => break,
                    next = subscription.receiver.recv() => {
                        let Some(value) = next else {
                            debug!(target: "sc.store", path = %subscription.path, "Store subscription closed");
                            break;
                        };
                        let notification = StoreNotification {
                            watch: task_watch.clone(),
                            value,
                        };
                        if sender.send(notification).is_err() {
                            warn!(target: "sc.store", path = %subscription.path, "Event actor gone, dropping listener");
                            break;
                        }
                    }
                }
            }
        });

        debug!(target: "sc.store", watch = ?watch, path = %path, "Listener attached");
        self.watches.insert(watch, token);
        Ok(())
    }

    pub fn detach(&mut self, watch: &StoreWatch) {
        if let Some(token) = self.watches.remove(watch) {
            token.cancel();
            debug!(target: "sc.store", watch = ?watch, "Listener detached");
        }
    }

    /// Detach every listener. The set can be attached again afterwards.
    pub fn detach_all(&mut self) {
        let count = self.watches.len();
        for (_, token) in self.watches.drain() {
            token.cancel();
        }
        debug!(target: "sc.store", count, "All listeners detached");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_attach_forwards_tagged_notifications() {
        let store = MemoryStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let parent = CancellationToken::new();
        let mut listeners = ListenerSet::new(Arc::new(store.clone()), tx, &parent);

        listeners
            .attach(StoreWatch::Screen, "event/screen".to_string())
            .await
            .unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.watch, StoreWatch::Screen);
        assert_eq!(first.value, None);

        store.write("event/screen", json!("celebrity")).await.unwrap();
        let next = rx.recv().await.unwrap();
        assert_eq!(next.value, Some(json!("celebrity")));
    }

    #[tokio::test]
    async fn test_attach_twice_is_noop() {
        let store = MemoryStore::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let parent = CancellationToken::new();
        let mut listeners = ListenerSet::new(Arc::new(store.clone()), tx, &parent);

        listeners
            .attach(StoreWatch::Volume, "event/volume".to_string())
            .await
            .unwrap();
        listeners
            .attach(StoreWatch::Volume, "event/volume".to_string())
            .await
            .unwrap();
        assert_eq!(listeners.len(), 1);
        assert_eq!(store.watcher_count().await, 1);
    }

    #[tokio::test]
    async fn test_detach_all_stops_forwarding() {
        let store = MemoryStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let parent = CancellationToken::new();
        let mut listeners = ListenerSet::new(Arc::new(store.clone()), tx, &parent);

        listeners
            .attach(StoreWatch::PrivateCall, "event/privateCall".to_string())
            .await
            .unwrap();
        let _initial = rx.recv().await.unwrap();

        listeners.detach_all();
        assert!(listeners.is_empty());
        tokio::task::yield_now().await;

        store
            .write("event/privateCall", json!({"isWith": "host"}))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        listeners
            .attach(StoreWatch::PrivateCall, "event/privateCall".to_string())
            .await
            .unwrap();
        let reattached = rx.recv().await.unwrap();
        assert_eq!(reattached.value, Some(json!({"isWith": "host"})));
    }
}
