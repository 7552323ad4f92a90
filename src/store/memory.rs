use crate::store::{
    path, RealtimeStore, StoreChange, StorePath, CHANGE_CHANNEL_CAPACITY,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

/// In-process store: one JSON tree plus a broadcast channel of changes.
pub struct MemoryStore {
    tree: RwLock<Value>,

    /// Broadcast channel for change notifications
    change_tx: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            tree: RwLock::new(Value::Null),
            change_tx,
        }
    }

    /// Whole tree, for diagnostics and tests.
    pub fn snapshot(&self) -> Result<Value> {
        let tree = self
            .tree
            .read()
            .map_err(|_| anyhow!("Store lock poisoned"))?;
        Ok(tree.clone())
    }

    /// Number of live change receivers.
    pub fn receiver_count(&self) -> usize {
        self.change_tx.receiver_count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeStore for MemoryStore {
    async fn get(&self, at: &StorePath) -> Result<Option<Value>> {
        let tree = self
            .tree
            .read()
            .map_err(|_| anyhow!("Store lock poisoned"))?;
        Ok(path::value_at(&tree, at).cloned())
    }

    async fn set(&self, at: &StorePath, value: Value) -> Result<()> {
        let mut tree = self
            .tree
            .write()
            .map_err(|_| anyhow!("Store lock poisoned"))?;
        path::set_at(&mut tree, at, value.clone());

        // Sent under the write lock so receivers observe writes in order
        let _ = self.change_tx.send(StoreChange::put(at.clone(), value));
        debug!(path = %at, "Store set");
        Ok(())
    }

    async fn update(&self, at: &StorePath, fields: Map<String, Value>) -> Result<()> {
        let mut tree = self
            .tree
            .write()
            .map_err(|_| anyhow!("Store lock poisoned"))?;
        path::update_at(&mut tree, at, &fields)?;

        let _ = self.change_tx.send(StoreChange::patch(at.clone(), fields));
        debug!(path = %at, "Store update");
        Ok(())
    }

    async fn subscribe(&self, _path: &StorePath) -> Result<broadcast::Receiver<StoreChange>> {
        Ok(self.change_tx.subscribe())
    }
}
