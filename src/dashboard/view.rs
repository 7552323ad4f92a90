use crate::home::DeviceStatus;
use chrono::{DateTime, Local, TimeZone, Utc};
use serde_json::Value;
use std::fmt::Display;

/// Icon shown on a device card, picked from the device id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceIcon {
    Lamp,
    Fan,
    Climate,
    Power,
}

impl DeviceIcon {
    pub fn for_device(device_id: &str) -> Self {
        let id = device_id.to_lowercase();
        if id.contains("lamp") {
            DeviceIcon::Lamp
        } else if id.contains("fan") {
            DeviceIcon::Fan
        } else if id.contains("ac") {
            DeviceIcon::Climate
        } else {
            DeviceIcon::Power
        }
    }
}

/// One device on the dashboard.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceCard {
    pub id: String,
    pub name: String,
    pub status: DeviceStatus,
    pub temperature: Option<f64>,
    pub icon: DeviceIcon,
}

impl DeviceCard {
    /// Build a card from a raw `devices/<id>` entry.
    ///
    /// Missing names fall back to the id; anything but `"on"` shows as off.
    pub fn from_entry(id: &str, entry: &Value) -> Self {
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .unwrap_or(id)
            .to_string();
        let status = match entry.get("status").and_then(Value::as_str) {
            Some("on") => DeviceStatus::On,
            _ => DeviceStatus::Off,
        };
        let temperature = entry
            .get("temperature")
            .and_then(Value::as_f64)
            .filter(|t| *t != 0.0);

        Self {
            id: id.to_string(),
            name,
            status,
            temperature,
            icon: DeviceIcon::for_device(id),
        }
    }

    pub fn is_on(&self) -> bool {
        self.status.is_on()
    }

    /// `Status: ON`
    pub fn status_label(&self) -> String {
        format!("Status: {}", self.status.as_str().to_uppercase())
    }

    pub fn temperature_label(&self) -> Option<String> {
        self.temperature
            .map(|t| format!("Temperature: {}°C", format_reading(t)))
    }

    /// `Turn ON` / `Turn OFF`
    pub fn action_label(&self) -> String {
        format!("Turn {}", self.status.toggled().as_str().to_uppercase())
    }
}

/// Cards for every entry of a `devices` snapshot, in key order.
pub(super) fn device_cards(devices: Option<&Value>) -> Vec<DeviceCard> {
    let mut cards: Vec<DeviceCard> = match devices {
        Some(Value::Object(entries)) => entries
            .iter()
            .map(|(id, entry)| DeviceCard::from_entry(id, entry))
            .collect(),
        _ => Vec::new(),
    };
    cards.sort_by(|a, b| a.id.cmp(&b.id));
    cards
}

/// Sensor tab contents.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorPanel {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub last_update: Option<DateTime<Utc>>,
    /// Any other readings stored under `sensors`
    pub extra: Vec<(String, Value)>,
}

impl SensorPanel {
    pub fn from_value(sensors: &Value) -> Self {
        let extra = sensors
            .as_object()
            .map(|fields| {
                fields
                    .iter()
                    .filter(|(key, _)| !matches!(key.as_str(), "temperature" | "humidity" | "lastUpdate"))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            temperature: sensors.get("temperature").and_then(Value::as_f64),
            humidity: sensors.get("humidity").and_then(Value::as_f64),
            last_update: last_update(sensors),
            extra,
        }
    }

    pub fn temperature_label(&self) -> Option<String> {
        self.temperature.map(|t| format!("{}°C", format_reading(t)))
    }

    pub fn humidity_label(&self) -> Option<String> {
        self.humidity.map(|h| format!("{}%", format_reading(h)))
    }

    /// `Last update: <local date time>` or `N/A`
    pub fn last_update_label(&self) -> String {
        match self.last_update {
            Some(at) => format!(
                "Last update: {}",
                at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            ),
            None => "Last update: N/A".to_string(),
        }
    }
}

/// Summary line above the tabs.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusBar {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub last_update: Option<DateTime<Utc>>,
}

impl StatusBar {
    pub fn from_value(sensors: Option<&Value>) -> Self {
        Self {
            temperature: sensors.and_then(|s| s.get("temperature")).and_then(Value::as_f64),
            humidity: sensors.and_then(|s| s.get("humidity")).and_then(Value::as_f64),
            last_update: sensors.and_then(last_update),
        }
    }

    pub fn update_text(&self) -> String {
        self.update_text_in(&Local)
    }

    /// `Updated: HH:MM:SS` in `tz`, or `Waiting for data...`
    pub fn update_text_in<Tz>(&self, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        match self.last_update {
            Some(at) => format!("Updated: {}", at.with_timezone(tz).format("%H:%M:%S")),
            None => "Waiting for data...".to_string(),
        }
    }
}

fn last_update(sensors: &Value) -> Option<DateTime<Utc>> {
    sensors
        .get("lastUpdate")
        .and_then(Value::as_i64)
        .filter(|ms| *ms != 0)
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

/// Whole numbers without a decimal point, everything else as is: `24`, `26.3`.
pub fn format_reading(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}
