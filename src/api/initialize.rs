use super::{ApiError, AppState};
use crate::home::{initialize_store, DeviceMap, SensorSnapshot};
use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub(super) struct InitializeResponse {
    success: bool,
    message: String,
    devices: DeviceMap,
    sensors: SensorSnapshot,
}

/// POST /api/initialize - Seed devices and sensor data
pub(super) async fn initialize(
    State(state): State<Arc<AppState>>,
) -> Result<Json<InitializeResponse>, ApiError> {
    let (devices, sensors) = initialize_store(state.store.as_ref(), &state.clock)
        .await
        .map_err(|e| ApiError::store("Failed to initialize store", e))?;

    Ok(Json(InitializeResponse {
        success: true,
        message: "Store initialized successfully".to_string(),
        devices,
        sensors,
    }))
}

pub(super) async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed("Method not allowed. Use POST.")
}
