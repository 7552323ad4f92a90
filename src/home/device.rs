use crate::store::StorePath;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Top-level key holding every device
pub const DEVICES_KEY: &str = "devices";

/// Binary power state of a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    On,
    Off,
}

impl DeviceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceStatus::On => "on",
            DeviceStatus::Off => "off",
        }
    }

    pub fn is_on(self) -> bool {
        self == DeviceStatus::On
    }

    pub fn toggled(self) -> Self {
        match self {
            DeviceStatus::On => DeviceStatus::Off,
            DeviceStatus::Off => DeviceStatus::On,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "on" => Ok(DeviceStatus::On),
            "off" => Ok(DeviceStatus::Off),
            other => bail!("status must be \"on\" or \"off\", got {:?}", other),
        }
    }
}

/// Controllable device record as stored under `devices/<id>`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub status: DeviceStatus,
    /// Set-point for climate devices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Devices keyed by identifier
pub type DeviceMap = BTreeMap<String, Device>;

pub fn devices_path() -> StorePath {
    StorePath::from_trusted(&[DEVICES_KEY])
}

pub fn device_path(device_id: &str) -> Result<StorePath> {
    devices_path().child(device_id)
}

pub fn device_status_path(device_id: &str) -> Result<StorePath> {
    device_path(device_id)?.child("status")
}
