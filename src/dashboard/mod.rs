//! Dashboard data binding.
//!
//! A [`RealtimeData`] handle follows one store path and exposes its latest
//! state (`Loading`, `Ready`, `Failed`) through a `tokio::sync::watch`
//! channel. [`Dashboard`] pairs the `devices` and `sensors` feeds and turns
//! them into the view models in [`view`].

mod view;

pub use view::{format_reading, DeviceCard, DeviceIcon, SensorPanel, StatusBar};

use crate::home::{device_path, devices_path, sensors_path, DeviceStatus};
use crate::store::{RealtimeStore, StorePath, Subscription};
use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// State of a live store path.
#[derive(Clone, Debug, PartialEq)]
pub enum DataState {
    /// No value received yet
    Loading,
    /// Latest value; `None` when nothing is stored at the path
    Ready(Option<Value>),
    /// The subscription could not be opened
    Failed(String),
}

impl DataState {
    pub fn is_loading(&self) -> bool {
        matches!(self, DataState::Loading)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            DataState::Ready(value) => value.as_ref(),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            DataState::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Live view of one store path.
///
/// The background subscription stops when the handle is dropped.
pub struct RealtimeData {
    path: StorePath,
    rx: watch::Receiver<DataState>,
    task: JoinHandle<()>,
}

impl RealtimeData {
    pub fn watch(store: Arc<dyn RealtimeStore>, path: StorePath) -> Self {
        let (tx, rx) = watch::channel(DataState::Loading);
        let watched = path.clone();

        let task = tokio::spawn(async move {
            let mut subscription = match Subscription::open(store, watched.clone()).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    warn!(path = %watched, error = %e, "Failed to subscribe");
                    let _ = tx.send(DataState::Failed(format!("{:#}", e)));
                    return;
                }
            };

            while let Some(value) = subscription.next().await {
                let value = (!value.is_null()).then_some(value);
                if tx.send(DataState::Ready(value)).is_err() {
                    break;
                }
            }
            debug!(path = %watched, "Realtime feed ended");
        });

        Self { path, rx, task }
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Latest state without waiting.
    pub fn current(&self) -> DataState {
        self.rx.borrow().clone()
    }

    /// Wait for the next state change.
    pub async fn changed(&mut self) -> Result<DataState> {
        self.rx
            .changed()
            .await
            .map_err(|_| anyhow!("Realtime feed for {} closed", self.path))?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Wait until the feed has left `Loading`.
    pub async fn settled(&mut self) -> Result<DataState> {
        let state = self
            .rx
            .wait_for(|state| !state.is_loading())
            .await
            .map_err(|_| anyhow!("Realtime feed for {} closed", self.path))?;
        Ok(state.clone())
    }
}

impl Drop for RealtimeData {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Flip a device: merge `{status: <opposite>}` into `devices/<id>`.
pub async fn toggle_device(
    store: &dyn RealtimeStore,
    device_id: &str,
    current: DeviceStatus,
) -> Result<DeviceStatus> {
    let next = current.toggled();
    let mut fields = Map::new();
    fields.insert("status".to_string(), Value::from(next.as_str()));

    store
        .update(&device_path(device_id)?, fields)
        .await
        .with_context(|| format!("Failed to update device {}", device_id))?;
    Ok(next)
}

/// Devices and sensor feeds of one dashboard session.
pub struct Dashboard {
    store: Arc<dyn RealtimeStore>,
    pub devices: RealtimeData,
    pub sensors: RealtimeData,
}

impl Dashboard {
    pub fn open(store: Arc<dyn RealtimeStore>) -> Self {
        Self {
            devices: RealtimeData::watch(Arc::clone(&store), devices_path()),
            sensors: RealtimeData::watch(Arc::clone(&store), sensors_path()),
            store,
        }
    }

    /// One card per device in the latest snapshot; `None` while loading.
    pub fn device_cards(&self) -> Option<Vec<DeviceCard>> {
        match self.devices.current() {
            DataState::Loading => None,
            state => Some(view::device_cards(state.value())),
        }
    }

    /// `None` while loading or when no sensor data exists.
    pub fn sensor_panel(&self) -> Option<SensorPanel> {
        self.sensors.current().value().map(SensorPanel::from_value)
    }

    pub fn status_bar(&self) -> StatusBar {
        StatusBar::from_value(self.sensors.current().value())
    }

    /// Toggle the device shown on `card`.
    pub async fn toggle(&self, card: &DeviceCard) -> Result<DeviceStatus> {
        let result = toggle_device(self.store.as_ref(), &card.id, card.status).await;
        if let Err(e) = &result {
            warn!(device_id = %card.id, error = %e, "Error updating device");
        }
        result
    }
}
