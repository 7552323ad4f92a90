// Integration tests for the HTTP API backed by a shared store

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use homelink::api::{create_emulator_router, create_router, AppState};
use homelink::dashboard::{DataState, Dashboard};
use homelink::home::{device_status_path, DeviceStatus};
use homelink::store::{MemoryStore, RealtimeStore, RestStore, StorePath, Subscription};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn create_test_app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let app = create_router(AppState::new(store.clone())).merge(create_emulator_router(store.clone()));
    (app, store)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

/// Initialize, toggle through the API, read back through both surfaces.
#[tokio::test]
async fn test_initialize_toggle_and_read() {
    let (app, _) = create_test_app();

    let (status, body) = send(&app, "POST", "/api/initialize", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["devices"].as_object().unwrap().len(), 3);

    let (status, _) = send(
        &app,
        "POST",
        "/api/devices",
        Some(json!({"deviceId": "lamp1", "status": "on"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, "GET", "/api/devices", None).await;
    assert_eq!(body["devices"]["lamp1"]["status"], "on");
    assert_eq!(body["devices"]["fan1"]["status"], "off");

    let (status, raw) = send(&app, "GET", "/store/devices/lamp1/status.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(raw, json!("on"));
}

/// Writes through the emulator show up in the API and vice versa.
#[tokio::test]
async fn test_emulator_and_api_share_state() {
    let (app, _) = create_test_app();

    let (status, _) = send(
        &app,
        "PUT",
        "/store/sensors.json",
        Some(json!({"temperature": 22.5, "humidity": 50.0, "lastUpdate": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, "GET", "/api/sensors", None).await;
    assert_eq!(body["sensors"]["temperature"], 22.5);

    send(&app, "POST", "/api/sensors", None).await;
    let (_, raw) = send(&app, "GET", "/store/sensors/lastUpdate.json", None).await;
    assert!(raw.as_i64().unwrap() > 1);
}

/// A remote client and a dashboard follow API writes over the event stream.
#[tokio::test]
async fn test_remote_subscribers_follow_api_writes() {
    let (app, _) = create_test_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn({
        let app = app.clone();
        async move {
            axum::serve(listener, app).await.unwrap();
        }
    });

    send(&app, "POST", "/api/initialize", None).await;

    let remote: Arc<dyn RealtimeStore> =
        Arc::new(RestStore::new(format!("http://{}/store", addr), None).unwrap());
    let mut fan = Subscription::open(remote.clone(), device_status_path("fan1").unwrap())
        .await
        .unwrap();
    assert_eq!(fan.next().await, Some(json!("off")));

    let mut dashboard = Dashboard::open(remote.clone());
    assert!(matches!(
        dashboard.devices.settled().await.unwrap(),
        DataState::Ready(Some(_))
    ));

    send(
        &app,
        "PUT",
        "/api/devices",
        Some(json!({"deviceId": "fan1", "status": "on"})),
    )
    .await;

    let next = tokio::time::timeout(Duration::from_secs(5), fan.next())
        .await
        .unwrap();
    assert_eq!(next, Some(json!("on")));

    let state = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let state = dashboard.devices.changed().await.unwrap();
            if state.value().map(|d| d["fan1"]["status"] == "on").unwrap_or(false) {
                break state;
            }
        }
    })
    .await
    .unwrap();
    assert!(state.value().is_some());

    let card = dashboard
        .device_cards()
        .unwrap()
        .into_iter()
        .find(|c| c.id == "fan1")
        .unwrap();
    assert_eq!(card.status, DeviceStatus::On);

    // Toggle from the dashboard lands back in the API's store
    dashboard.toggle(&card).await.unwrap();
    let (_, body) = send(&app, "GET", "/api/devices", None).await;
    assert_eq!(body["devices"]["fan1"]["status"], "off");

    let untouched = remote
        .get(&StorePath::parse("devices/lamp1/status").unwrap())
        .await
        .unwrap();
    assert_eq!(untouched, Some(json!("off")));

    server.abort();
}
