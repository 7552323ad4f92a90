use super::{ApiError, AppState};
use crate::home::{sensors_path, SensorReading};
use axum::{extract::State, response::Json};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

#[derive(Serialize)]
pub(super) struct SensorsResponse {
    success: bool,
    sensors: Value,
}

#[derive(Serialize)]
pub(super) struct SensorUpdateResponse {
    success: bool,
    message: String,
    temperature: f64,
    humidity: f64,
}

/// GET /api/sensors - Current sensor snapshot
pub(super) async fn read_sensors(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SensorsResponse>, ApiError> {
    let sensors = state
        .store
        .get(&sensors_path())
        .await
        .map_err(|e| ApiError::store("Failed to read sensor data", e))?
        .unwrap_or_else(|| json!({}));

    Ok(Json(SensorsResponse {
        success: true,
        sensors,
    }))
}

/// POST /api/sensors - Write a simulated reading
pub(super) async fn sample_sensors(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SensorUpdateResponse>, ApiError> {
    let reading = SensorReading::sample(&mut rand::thread_rng());
    let snapshot = reading.stamped(state.clock.now_millis());

    state
        .store
        .update(&sensors_path(), snapshot.fields())
        .await
        .map_err(|e| ApiError::store("Failed to update sensor data", e))?;

    info!(
        temperature = reading.temperature,
        humidity = reading.humidity,
        "Sensor data updated"
    );

    Ok(Json(SensorUpdateResponse {
        success: true,
        message: "Sensor data updated".to_string(),
        temperature: reading.temperature,
        humidity: reading.humidity,
    }))
}
