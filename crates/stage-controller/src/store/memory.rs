//! In-process [`SharedStore`].
//!
//! A JSON document tree behind a mutex. It follows the same rules as a hosted
//! real-time store: `null` deletes, empty objects vanish, `push` keys sort in
//! insertion order, and watchers of a path are notified when anything at,
//! above or below that path changes. [`MemoryStore::simulate_disconnect`] runs
//! the registered on-disconnect hooks the way the hosted store would when the
//! client's socket drops.

use super::{DisconnectAction, SharedStore, StoreSubscription};
use crate::errors::ScError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

#[derive(Debug)]
struct Watcher {
    path: Vec<String>,
    sender: mpsc::UnboundedSender<Option<Value>>,
}

#[derive(Debug)]
struct Inner {
    root: Value,
    watchers: Vec<Watcher>,
    on_disconnect: BTreeMap<String, DisconnectAction>,
    push_counter: u64,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            root: Value::Object(Map::new()),
            watchers: Vec::new(),
            on_disconnect: BTreeMap::new(),
            push_counter: 0,
        }
    }
}

/// Shared, cloneable in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn get_at<'a>(node: &'a Value, segs: &[String]) -> Option<&'a Value> {
    segs.iter().try_fold(node, |node, seg| node.get(seg.as_str()))
}

fn is_empty_node(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn set_at(node: &mut Value, segs: &[String], value: Value) {
    let Some((head, rest)) = segs.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        if rest.is_empty() {
            if is_empty_node(&value) {
                map.remove(head);
            } else {
                map.insert(head.clone(), value);
            }
            return;
        }
        let child = map.entry(head.clone()).or_insert(Value::Null);
        set_at(child, rest, value);
        if is_empty_node(child) {
            map.remove(head);
        }
    }
}

fn related(a: &[String], b: &[String]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

impl Inner {
    fn value_at(&self, segs: &[String]) -> Option<Value> {
        get_at(&self.root, segs).filter(|v| !v.is_null()).cloned()
    }

    fn set(&mut self, segs: &[String], value: Value) {
        set_at(&mut self.root, segs, value);
        if !self.root.is_object() {
            self.root = Value::Object(Map::new());
        }
    }

    fn notify(&mut self, changed: &[Vec<String>]) {
        let root = &self.root;
        self.watchers.retain(|w| {
            if !changed.iter().any(|c| related(c, &w.path)) {
                return !w.sender.is_closed();
            }
            let value = get_at(root, &w.path).filter(|v| !v.is_null()).cloned();
            w.sender.send(value).is_ok()
        });
    }

    fn apply_disconnect_action(&mut self, path: &str, action: DisconnectAction) -> Vec<Vec<String>> {
        let base = segments(path);
        match action {
            DisconnectAction::Remove => {
                self.set(&base, Value::Null);
                vec![base]
            }
            DisconnectAction::Set(value) => {
                self.set(&base, value);
                vec![base]
            }
            DisconnectAction::Update(fields) => fields
                .into_iter()
                .map(|(key, value)| {
                    let mut segs = base.clone();
                    segs.extend(segments(&key));
                    self.set(&segs, value);
                    segs
                })
                .collect(),
        }
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value without going through the trait (test and demo setup).
    pub async fn seed(&self, path: &str, value: Value) {
        let segs = segments(path);
        let mut inner = self.inner.lock().await;
        inner.set(&segs, value);
        inner.notify(&[segs]);
    }

    /// Run and clear every on-disconnect hook, as if the client dropped.
    pub async fn simulate_disconnect(&self) {
        let mut inner = self.inner.lock().await;
        let actions = std::mem::take(&mut inner.on_disconnect);
        let mut changed = Vec::new();
        for (path, action) in actions {
            debug!(target: "sc.store.memory", path = %path, "Running on-disconnect hook");
            changed.extend(inner.apply_disconnect_action(&path, action));
        }
        inner.notify(&changed);
    }

    /// Paths with a pending on-disconnect hook.
    pub async fn pending_disconnect_hooks(&self) -> Vec<String> {
        self.inner.lock().await.on_disconnect.keys().cloned().collect()
    }

    /// Number of live watchers (closed receivers are pruned on the next write).
    pub async fn watcher_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.watchers.iter().filter(|w| !w.sender.is_closed()).count()
    }
}

#[async_trait::async_trait]
impl SharedStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Option<Value>, ScError> {
        let inner = self.inner.lock().await;
        Ok(inner.value_at(&segments(path)))
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), ScError> {
        let segs = segments(path);
        let mut inner = self.inner.lock().await;
        inner.set(&segs, value);
        inner.notify(&[segs]);
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), ScError> {
        let base = segments(path);
        let mut inner = self.inner.lock().await;
        let mut changed = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            let mut segs = base.clone();
            segs.extend(segments(&key));
            inner.set(&segs, value);
            changed.push(segs);
        }
        inner.notify(&changed);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), ScError> {
        self.write(path, Value::Null).await
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, ScError> {
        let mut inner = self.inner.lock().await;
        inner.push_counter += 1;
        let key = format!("-{:019}", inner.push_counter);
        let mut segs = segments(path);
        segs.push(key.clone());
        inner.set(&segs, value);
        inner.notify(&[segs]);
        Ok(key)
    }

    async fn subscribe(&self, path: &str) -> Result<StoreSubscription, ScError> {
        let segs = segments(path);
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;
        sender
            .send(inner.value_at(&segs))
            .map_err(|e| ScError::Store(format!("subscribe failed: {e}")))?;
        inner.watchers.push(Watcher {
            path: segs,
            sender,
        });
        Ok(StoreSubscription {
            path: path.to_string(),
            receiver,
        })
    }

    async fn on_disconnect(&self, path: &str, action: DisconnectAction) -> Result<(), ScError> {
        let mut inner = self.inner.lock().await;
        inner.on_disconnect.insert(segments(path).join("/"), action);
        Ok(())
    }

    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), ScError> {
        let prefix = segments(path);
        let mut inner = self.inner.lock().await;
        inner
            .on_disconnect
            .retain(|registered, _| !segments(registered).starts_with(&prefix));
        Ok(())
    }
}
