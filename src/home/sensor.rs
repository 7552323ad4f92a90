use crate::store::StorePath;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Top-level key holding the sensor snapshot
pub const SENSORS_KEY: &str = "sensors";

pub const BASELINE_TEMPERATURE: f64 = 26.0;
pub const TEMPERATURE_SPREAD: f64 = 2.0;
pub const BASELINE_HUMIDITY: f64 = 45.0;
pub const HUMIDITY_SPREAD: f64 = 5.0;

/// Current sensor values as stored under `sensors`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorSnapshot {
    pub temperature: f64,
    pub humidity: f64,
    /// Epoch milliseconds of the write
    pub last_update: i64,
}

impl SensorSnapshot {
    /// Children written by a sensor update.
    pub fn fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("temperature".to_string(), json!(self.temperature));
        fields.insert("humidity".to_string(), json!(self.humidity));
        fields.insert("lastUpdate".to_string(), json!(self.last_update));
        fields
    }
}

/// Unstamped temperature/humidity pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SensorReading {
    pub temperature: f64,
    pub humidity: f64,
}

impl SensorReading {
    pub fn baseline() -> Self {
        Self {
            temperature: BASELINE_TEMPERATURE,
            humidity: BASELINE_HUMIDITY,
        }
    }

    /// Baseline plus a uniform perturbation, rounded to one decimal.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let temperature =
            BASELINE_TEMPERATURE + rng.gen_range(-TEMPERATURE_SPREAD..TEMPERATURE_SPREAD);
        let humidity = BASELINE_HUMIDITY + rng.gen_range(-HUMIDITY_SPREAD..HUMIDITY_SPREAD);
        Self {
            temperature: round_tenth(temperature),
            humidity: round_tenth(humidity),
        }
    }

    pub fn stamped(self, last_update: i64) -> SensorSnapshot {
        SensorSnapshot {
            temperature: self.temperature,
            humidity: self.humidity,
            last_update,
        }
    }
}

pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn sensors_path() -> StorePath {
    StorePath::from_trusted(&[SENSORS_KEY])
}
