use crate::device::DeviceMirror;
use crate::sensors::SensorGauge;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Lines of the periodic status table
pub fn status_lines(mirror: &DeviceMirror, gauge: &SensorGauge) -> Vec<String> {
    let mut lines = vec!["SYSTEM STATUS".to_string(), "Virtual Devices:".to_string()];
    for device in mirror.snapshot().values() {
        lines.push(format!(
            "  {}: {}",
            device.name,
            device.status.as_str().to_uppercase()
        ));
    }

    let reading = gauge.current();
    lines.push("Sensors:".to_string());
    lines.push(format!("  Temperature: {:.1}°C", reading.temperature));
    lines.push(format!("  Humidity: {:.1}%", reading.humidity));
    lines
}

/// Log the status table now and then every `period`.
pub async fn run_status_printer(mirror: Arc<DeviceMirror>, gauge: Arc<SensorGauge>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        for line in status_lines(&mirror, &gauge) {
            info!("{}", line);
        }
    }
}
