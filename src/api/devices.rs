use super::{ApiError, AppState};
use crate::home::{device_status_path, devices_path, DeviceStatus};
use axum::{body::Bytes, extract::State, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// POST/PUT body
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceCommand {
    device_id: Option<String>,
    status: Option<String>,
}

#[derive(Serialize)]
pub(super) struct DevicesResponse {
    success: bool,
    devices: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DeviceUpdateResponse {
    success: bool,
    message: String,
    device_id: String,
    status: DeviceStatus,
}

/// GET /api/devices - All device records
pub(super) async fn list_devices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DevicesResponse>, ApiError> {
    let devices = state
        .store
        .get(&devices_path())
        .await
        .map_err(|e| ApiError::store("Failed to read devices", e))?
        .unwrap_or_else(|| json!({}));

    Ok(Json(DevicesResponse {
        success: true,
        devices,
    }))
}

/// POST|PUT /api/devices - Set one device's status
///
/// Any identifier is accepted; writing an unknown id creates a bare status
/// entry in the store.
pub(super) async fn set_device_status(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<DeviceUpdateResponse>, ApiError> {
    let command: DeviceCommand = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?;

    let (device_id, status) = match (
        command.device_id.filter(|id| !id.is_empty()),
        command.status.filter(|s| !s.is_empty()),
    ) {
        (Some(device_id), Some(status)) => (device_id, status),
        _ => {
            return Err(ApiError::BadRequest(
                "deviceId and status are required".to_string(),
            ))
        }
    };

    let status: DeviceStatus = status
        .parse()
        .map_err(|e: anyhow::Error| ApiError::BadRequest(e.to_string()))?;
    let path = device_status_path(&device_id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid deviceId: {}", e)))?;

    state
        .store
        .set(&path, json!(status))
        .await
        .map_err(|e| ApiError::store("Failed to update device", e))?;

    info!(device_id = %device_id, status = %status, "Device status set");

    Ok(Json(DeviceUpdateResponse {
        success: true,
        message: format!("Device {} set to {}", device_id, status),
        device_id,
        status,
    }))
}
