//! Realtime store: a shared JSON tree with path-scoped reads, writes and
//! change notifications.
//!
//! ```text
//!  writer ──set/update──▶ RealtimeStore ──StoreChange──▶ broadcast ──▶ Subscription (per path)
//! ```
//!
//! Every implementation publishes each mutation as a [`StoreChange`] on a
//! `tokio::sync::broadcast` channel. Consumers never register callbacks; they
//! hold a receiver and decide which changes concern them.

mod event_stream;
mod memory;
mod path;
mod rest;

pub use event_stream::{EventStreamParser, StreamEvent};
pub use memory::MemoryStore;
pub use path::{set_at, update_at, value_at, StorePath};
pub use rest::RestStore;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

/// Capacity of every store's change channel.
pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 1000;

/// How a change was written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// `data` replaced the value at `path`.
    Put,
    /// `data` is an object whose children were merged under `path`.
    Patch,
}

/// Notification broadcast for every mutation of the store.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreChange {
    pub path: StorePath,
    pub kind: ChangeKind,
    pub data: Value,
}

impl StoreChange {
    pub fn put(path: StorePath, data: Value) -> Self {
        Self {
            path,
            kind: ChangeKind::Put,
            data,
        }
    }

    pub fn patch(path: StorePath, fields: Map<String, Value>) -> Self {
        Self {
            path,
            kind: ChangeKind::Patch,
            data: Value::Object(fields),
        }
    }

    /// The change as a list of single-location replacements.
    ///
    /// Patch keys that are not valid relative paths are skipped.
    pub fn puts(&self) -> Vec<(StorePath, &Value)> {
        match (self.kind, &self.data) {
            (ChangeKind::Put, data) => vec![(self.path.clone(), data)],
            (ChangeKind::Patch, Value::Object(fields)) => fields
                .iter()
                .filter_map(|(key, value)| {
                    StorePath::parse(key)
                        .ok()
                        .filter(|rel| !rel.is_root())
                        .map(|rel| (self.path.join(&rel), value))
                })
                .collect(),
            (ChangeKind::Patch, _) => Vec::new(),
        }
    }

    /// True when this change can alter the value at `watched`.
    pub fn touches(&self, watched: &StorePath) -> bool {
        self.puts().iter().any(|(path, _)| path.overlaps(watched))
    }

    /// Apply this change to `current`, the last known value at `watched`.
    ///
    /// Returns whether the value changed.
    pub fn apply_to(&self, watched: &StorePath, current: &mut Value) -> bool {
        let mut next = current.clone();
        for (path, data) in self.puts() {
            if let Some(rel) = watched.relative_to(&path) {
                next = value_at(data, &rel).cloned().unwrap_or(Value::Null);
            } else if let Some(rel) = path.relative_to(watched) {
                set_at(&mut next, &rel, data.clone());
            }
        }
        if next == *current {
            false
        } else {
            *current = next;
            true
        }
    }
}

/// Shared realtime key-path database.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Read the value at `path`; `None` when nothing is stored there.
    async fn get(&self, path: &StorePath) -> Result<Option<Value>>;

    /// Replace the value at `path` (`null` deletes).
    async fn set(&self, path: &StorePath, value: Value) -> Result<()>;

    /// Merge `fields` into the object at `path`.
    async fn update(&self, path: &StorePath, fields: Map<String, Value>) -> Result<()>;

    /// Start delivering changes under `path` and return a receiver of all
    /// changes this store publishes.
    async fn subscribe(&self, path: &StorePath) -> Result<broadcast::Receiver<StoreChange>>;
}

/// Store used when no backend could be configured; every call fails with
/// the configured reason.
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RealtimeStore for UnavailableStore {
    async fn get(&self, _path: &StorePath) -> Result<Option<Value>> {
        Err(anyhow!(self.reason.clone()))
    }

    async fn set(&self, _path: &StorePath, _value: Value) -> Result<()> {
        Err(anyhow!(self.reason.clone()))
    }

    async fn update(&self, _path: &StorePath, _fields: Map<String, Value>) -> Result<()> {
        Err(anyhow!(self.reason.clone()))
    }

    async fn subscribe(&self, _path: &StorePath) -> Result<broadcast::Receiver<StoreChange>> {
        Err(anyhow!(self.reason.clone()))
    }
}

/// Value feed for a single path.
///
/// Yields the current value first, then every distinct value the path takes.
/// Absent values are reported as `Value::Null`.
pub struct Subscription {
    store: Arc<dyn RealtimeStore>,
    path: StorePath,
    current: Value,
    rx: broadcast::Receiver<StoreChange>,
    initial_pending: bool,
}

impl Subscription {
    pub async fn open(store: Arc<dyn RealtimeStore>, path: StorePath) -> Result<Self> {
        // Receiver first so nothing written between the read and the
        // subscription is lost.
        let rx = store.subscribe(&path).await?;
        let current = store.get(&path).await?.unwrap_or(Value::Null);
        Ok(Self {
            store,
            path,
            current,
            rx,
            initial_pending: true,
        })
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Last value delivered (or about to be delivered first).
    pub fn current(&self) -> &Value {
        &self.current
    }

    /// Wait for the next value. `None` once the store stops publishing.
    pub async fn next(&mut self) -> Option<Value> {
        if std::mem::take(&mut self.initial_pending) {
            return Some(self.current.clone());
        }

        loop {
            match self.rx.recv().await {
                Ok(change) => {
                    if change.apply_to(&self.path, &mut self.current) {
                        return Some(self.current.clone());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(path = %self.path, skipped = skipped, "Subscription lagged, re-reading value");
                    match self.store.get(&self.path).await {
                        Ok(value) => {
                            let value = value.unwrap_or(Value::Null);
                            if value != self.current {
                                self.current = value;
                                return Some(self.current.clone());
                            }
                        }
                        Err(e) => warn!(path = %self.path, error = %e, "Failed to re-read value"),
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
