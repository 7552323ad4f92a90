use crate::feed::{Feed, FeedMessage};
use homelink::home::{sensors_path, MonotonicClock, SensorReading};
use homelink::store::RealtimeStore;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Latest simulated reading, shared with the status printer.
#[derive(Debug)]
pub struct SensorGauge {
    latest: RwLock<SensorReading>,
}

impl SensorGauge {
    pub fn new() -> Self {
        Self {
            latest: RwLock::new(SensorReading::baseline()),
        }
    }

    pub fn current(&self) -> SensorReading {
        *self.latest.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, reading: SensorReading) {
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = reading;
    }
}

impl Default for SensorGauge {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything one sensor tick touches.
pub struct SensorRelay {
    pub store: Arc<dyn RealtimeStore>,
    pub clock: Arc<MonotonicClock>,
    pub gauge: Arc<SensorGauge>,
    pub feed: Arc<Feed>,
}

impl SensorRelay {
    /// Sample, write to `sensors` and forward to feed clients.
    ///
    /// Returns `None` when the store write failed; nothing is forwarded then.
    pub async fn tick(&self) -> Option<SensorReading> {
        let reading = SensorReading::sample(&mut rand::thread_rng());
        self.gauge.record(reading);

        let snapshot = reading.stamped(self.clock.now_millis());
        if let Err(e) = self.store.update(&sensors_path(), snapshot.fields()).await {
            error!(error = %format!("{:#}", e), "Failed to write sensor data");
            return None;
        }

        info!(
            temperature = %format!("{:.1}", reading.temperature),
            humidity = %format!("{:.1}", reading.humidity),
            "Sensor update"
        );
        self.feed.publish_all(FeedMessage::sensor_reading(&reading));
        Some(reading)
    }
}

/// Run a sensor tick every `period`, starting one period from now.
pub async fn run_sensor_updates(relay: SensorRelay, period: Duration) {
    info!(interval_ms = period.as_millis() as u64, "Starting sensor updates");

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        relay.tick().await;
    }
}
