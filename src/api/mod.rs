// HTTP endpoint layer: devices, sensors, initialize, plus the local store emulator

mod devices;
mod emulator;
mod initialize;
mod sensors;

pub use emulator::create_emulator_router;

use crate::home::MonotonicClock;
use crate::store::RealtimeStore;
use axum::{
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, MethodRouter},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RealtimeStore>,
    pub clock: Arc<MonotonicClock>,
}

impl AppState {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self {
            store,
            clock: Arc::new(MonotonicClock::new()),
        }
    }
}

/// Create API router with the devices, sensors and initialize endpoints
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route(
            "/api/devices",
            get(devices::list_devices)
                .post(devices::set_device_status)
                .put(devices::set_device_status)
                .options(preflight)
                .fallback(method_not_allowed)
                .layer(cors(&[Method::GET, Method::POST, Method::PUT, Method::OPTIONS])),
        )
        .route(
            "/api/sensors",
            get(sensors::read_sensors)
                .post(sensors::sample_sensors)
                .options(preflight)
                .fallback(method_not_allowed)
                .layer(cors(&[Method::GET, Method::POST, Method::OPTIONS])),
        )
        .route(
            "/api/initialize",
            initialize_routes().layer(cors(&[Method::POST, Method::OPTIONS])),
        )
        .with_state(state)
}

fn initialize_routes() -> MethodRouter<Arc<AppState>> {
    post(initialize::initialize)
        .options(preflight)
        .fallback(initialize::method_not_allowed)
}

fn cors(methods: &[Method]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(methods.to_vec())
        .allow_headers([header::CONTENT_TYPE])
}

/// Bare OPTIONS (no preflight headers): 200 with an empty body
async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed("Method not allowed")
}

/// Failure envelope
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

/// Application error types
#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    MethodNotAllowed(&'static str),
    Store(String),
}

impl ApiError {
    /// Log a failed store operation and wrap it for the response
    fn store(context: &str, e: anyhow::Error) -> Self {
        let message = format!("{:#}", e);
        error!(error = %message, "{}", context);
        ApiError::Store(message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::MethodNotAllowed(msg) => (StatusCode::METHOD_NOT_ALLOWED, msg.to_string()),
            ApiError::Store(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        let body = Json(ErrorResponse {
            success: false,
            error: error_message,
        });
        (status, body).into_response()
    }
}
