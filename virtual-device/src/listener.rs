use crate::device::{DeviceMirror, DeviceTransition};
use crate::feed::{Feed, FeedMessage};
use homelink::home::{device_status_path, DeviceStatus};
use homelink::store::{RealtimeStore, Subscription};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Follow `devices/<id>/status` for every mirrored device.
pub fn spawn_device_listeners(
    store: Arc<dyn RealtimeStore>,
    mirror: Arc<DeviceMirror>,
    feed: Arc<Feed>,
) -> Vec<JoinHandle<()>> {
    info!("Listening for device state changes");

    mirror
        .ids()
        .into_iter()
        .map(|device_id| {
            let store = Arc::clone(&store);
            let mirror = Arc::clone(&mirror);
            let feed = Arc::clone(&feed);
            tokio::spawn(async move {
                if let Err(e) = follow_device(store, &device_id, &mirror, &feed).await {
                    error!(device_id = %device_id, error = %format!("{:#}", e), "Device listener stopped");
                }
            })
        })
        .collect()
}

async fn follow_device(
    store: Arc<dyn RealtimeStore>,
    device_id: &str,
    mirror: &DeviceMirror,
    feed: &Feed,
) -> anyhow::Result<()> {
    let mut subscription = Subscription::open(store, device_status_path(device_id)?).await?;

    while let Some(value) = subscription.next().await {
        handle_status_value(device_id, &value, mirror, feed);
    }

    warn!(device_id = %device_id, "Device status feed ended");
    Ok(())
}

/// Apply one observed status value.
///
/// `null`, values equal to the mirror, and anything but `"on"`/`"off"` are
/// ignored.
pub fn handle_status_value(
    device_id: &str,
    value: &Value,
    mirror: &DeviceMirror,
    feed: &Feed,
) -> Option<DeviceTransition> {
    let raw = match value {
        Value::Null => return None,
        Value::String(raw) => raw,
        other => {
            warn!(device_id = %device_id, value = %other, "Ignoring non-string device status");
            return None;
        }
    };
    let status: DeviceStatus = match raw.parse() {
        Ok(status) => status,
        Err(e) => {
            warn!(device_id = %device_id, error = %e, "Ignoring invalid device status");
            return None;
        }
    };

    let transition = mirror.apply(device_id, status)?;
    info!(
        device_id = %transition.device_id,
        name = %transition.name,
        status = %transition.status,
        "Device update"
    );
    info!("GPIO {} -> {}", transition.pin, transition.gpio_level());

    feed.publish_all(FeedMessage::device_change(&transition));
    Some(transition)
}
