use crate::device::{DeviceTransition, VirtualDevice};
use homelink::home::{DeviceStatus, SensorReading};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the frame channel shared by all WebSocket clients
pub const FEED_CAPACITY: usize = 256;

/// Frame sent to monitor clients
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FeedMessage {
    /// Full device list, always the first frame on a connection
    Init {
        devices: BTreeMap<String, VirtualDevice>,
    },
    #[serde(rename_all = "camelCase")]
    DeviceUpdate {
        device_id: String,
        status: DeviceStatus,
    },
    SensorUpdate {
        temperature: f64,
        humidity: f64,
    },
    Log {
        level: LogLevel,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<LogDetails>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Device,
    Sensor,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogDetails {
    pub name: String,
    pub status: DeviceStatus,
    pub pin: u8,
}

impl FeedMessage {
    /// `deviceUpdate` followed by its `log` frame
    pub fn device_change(transition: &DeviceTransition) -> [FeedMessage; 2] {
        [
            FeedMessage::DeviceUpdate {
                device_id: transition.device_id.clone(),
                status: transition.status,
            },
            FeedMessage::Log {
                level: LogLevel::Device,
                message: format!("{} turned {}", transition.name, transition.status),
                details: Some(LogDetails {
                    name: transition.name.clone(),
                    status: transition.status,
                    pin: transition.pin,
                }),
            },
        ]
    }

    /// `sensorUpdate` followed by its `log` frame
    pub fn sensor_reading(reading: &SensorReading) -> [FeedMessage; 2] {
        [
            FeedMessage::SensorUpdate {
                temperature: reading.temperature,
                humidity: reading.humidity,
            },
            FeedMessage::Log {
                level: LogLevel::Sensor,
                message: format!(
                    "Temp: {:.1}°C, Humidity: {:.1}%",
                    reading.temperature, reading.humidity
                ),
                details: None,
            },
        ]
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Fan-out of frames to every connected client.
#[derive(Debug)]
pub struct Feed {
    tx: broadcast::Sender<FeedMessage>,
}

impl Feed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    /// Send to all current clients; nobody listening is fine.
    pub fn publish(&self, message: FeedMessage) {
        if self.tx.send(message).is_err() {
            debug!("No feed clients connected");
        }
    }

    pub fn publish_all(&self, messages: impl IntoIterator<Item = FeedMessage>) {
        for message in messages {
            self.publish(message);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedMessage> {
        self.tx.subscribe()
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Feed {
    fn default() -> Self {
        Self::new()
    }
}
