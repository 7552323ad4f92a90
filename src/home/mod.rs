// Smart-home domain model: devices, sensor snapshot and the seed state

mod clock;
mod device;
mod sensor;

pub use clock::MonotonicClock;
pub use device::{
    device_path, device_status_path, devices_path, Device, DeviceMap, DeviceStatus, DEVICES_KEY,
};
pub use sensor::{
    round_tenth, sensors_path, SensorReading, SensorSnapshot, BASELINE_HUMIDITY,
    BASELINE_TEMPERATURE, HUMIDITY_SPREAD, SENSORS_KEY, TEMPERATURE_SPREAD,
};

use crate::store::RealtimeStore;
use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

/// The three demo devices, all off.
pub fn seed_devices() -> DeviceMap {
    let mut devices = DeviceMap::new();
    devices.insert(
        "lamp1".to_string(),
        Device {
            name: "Living Room Lamp".to_string(),
            status: DeviceStatus::Off,
            temperature: None,
        },
    );
    devices.insert(
        "fan1".to_string(),
        Device {
            name: "Bedroom Fan".to_string(),
            status: DeviceStatus::Off,
            temperature: None,
        },
    );
    devices.insert(
        "ac1".to_string(),
        Device {
            name: "Air Conditioner".to_string(),
            status: DeviceStatus::Off,
            temperature: Some(24.0),
        },
    );
    devices
}

/// Write the seed devices and a baseline sensor snapshot.
///
/// The snapshot is stamped strictly after any `lastUpdate` already stored, so
/// repeated initialization always advances the timestamp.
pub async fn initialize_store(
    store: &dyn RealtimeStore,
    clock: &MonotonicClock,
) -> Result<(DeviceMap, SensorSnapshot)> {
    let prior = store
        .get(&sensors_path())
        .await
        .context("Failed to read current sensor data")?
        .and_then(|sensors| sensors.get("lastUpdate").and_then(Value::as_i64));

    let devices = seed_devices();
    store
        .set(&devices_path(), serde_json::to_value(&devices)?)
        .await
        .context("Failed to seed devices")?;

    let sensors = SensorReading::baseline().stamped(clock.after(prior));
    store
        .set(&sensors_path(), serde_json::to_value(sensors)?)
        .await
        .context("Failed to seed sensor data")?;

    info!(
        devices = devices.len(),
        last_update = sensors.last_update,
        "Store initialized"
    );
    Ok((devices, sensors))
}

#[cfg(test)]
mod tests;
