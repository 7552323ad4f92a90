use homelink::home::{seed_devices, DeviceStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Simulated GPIO pin driving each known device
pub const GPIO_PINS: [(&str, u8); 3] = [("lamp1", 12), ("fan1", 13), ("ac1", 14)];

pub fn gpio_pin(device_id: &str) -> Option<u8> {
    GPIO_PINS
        .iter()
        .find(|(id, _)| *id == device_id)
        .map(|(_, pin)| *pin)
}

/// A device as the simulator knows it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VirtualDevice {
    pub name: String,
    pub pin: u8,
    pub status: DeviceStatus,
}

/// A status change the mirror accepted.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceTransition {
    pub device_id: String,
    pub name: String,
    pub pin: u8,
    pub status: DeviceStatus,
}

impl DeviceTransition {
    /// Output level the pin is driven to
    pub fn gpio_level(&self) -> &'static str {
        if self.status.is_on() {
            "HIGH"
        } else {
            "LOW"
        }
    }
}

/// In-process copy of the known devices and their last seen status.
///
/// The lock is only held for map reads and writes.
#[derive(Debug)]
pub struct DeviceMirror {
    devices: RwLock<BTreeMap<String, VirtualDevice>>,
}

impl DeviceMirror {
    pub fn new(devices: BTreeMap<String, VirtualDevice>) -> Self {
        Self {
            devices: RwLock::new(devices),
        }
    }

    /// The seeded devices with their pins, all off.
    pub fn with_defaults() -> Self {
        let devices = seed_devices()
            .into_iter()
            .filter_map(|(id, device)| {
                gpio_pin(&id).map(|pin| {
                    let mirrored = VirtualDevice {
                        name: device.name,
                        pin,
                        status: device.status,
                    };
                    (id, mirrored)
                })
            })
            .collect();
        Self::new(devices)
    }

    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, VirtualDevice> {
        self.read().clone()
    }

    pub fn status(&self, device_id: &str) -> Option<DeviceStatus> {
        self.read().get(device_id).map(|d| d.status)
    }

    /// Record `status` for `device_id`.
    ///
    /// Returns the transition when the device is known and its status changed.
    pub fn apply(&self, device_id: &str, status: DeviceStatus) -> Option<DeviceTransition> {
        let mut devices = self
            .devices
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let device = devices.get_mut(device_id)?;
        if device.status == status {
            return None;
        }
        device.status = status;

        Some(DeviceTransition {
            device_id: device_id.to_string(),
            name: device.name.clone(),
            pin: device.pin,
            status,
        })
    }

    /// Set every device back to off.
    pub fn reset(&self) {
        let mut devices = self
            .devices
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for device in devices.values_mut() {
            device.status = DeviceStatus::Off;
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, VirtualDevice>> {
        self.devices.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DeviceMirror {
    fn default() -> Self {
        Self::with_defaults()
    }
}
