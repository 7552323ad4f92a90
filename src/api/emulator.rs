//! Local stand-in for the hosted realtime database.
//!
//! Serves a [`MemoryStore`] over the same REST surface [`RestStore`] speaks:
//! - `GET /store/<path>.json` - value or `null`
//! - `GET` with `Accept: text/event-stream` - initial `put` then live changes
//! - `PUT` / `PATCH` / `DELETE` - write and echo the written data
//!
//! [`RestStore`]: crate::store::RestStore

use crate::store::{value_at, ChangeKind, MemoryStore, RealtimeStore, StoreChange, StorePath};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::get,
    Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{info, warn};

/// Keep-alive interval of event streams
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Create emulator router serving `store` under `/store`
pub fn create_emulator_router(store: Arc<MemoryStore>) -> Router {
    Router::new()
        .route(
            "/store/*path",
            get(read_or_stream)
                .put(write_value)
                .patch(merge_value)
                .delete(delete_value),
        )
        .with_state(store)
}

/// Error body, `{"error": "..."}`
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct EmulatorError {
    status: StatusCode,
    message: String,
}

impl EmulatorError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(e: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{:#}", e),
        }
    }
}

impl IntoResponse for EmulatorError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// `devices/lamp1.json` -> `devices/lamp1`
fn resource_path(raw: &str) -> Result<StorePath, EmulatorError> {
    let trimmed = raw
        .strip_suffix(".json")
        .ok_or_else(|| EmulatorError::bad_request("Path must end with .json"))?;
    StorePath::parse(trimmed).map_err(|e| EmulatorError::bad_request(e.to_string()))
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false)
}

/// GET /store/<path>.json
async fn read_or_stream(
    State(store): State<Arc<MemoryStore>>,
    Path(raw): Path<String>,
    headers: HeaderMap,
) -> Result<Response, EmulatorError> {
    let path = resource_path(&raw)?;

    if wants_event_stream(&headers) {
        let stream = change_frames(store, path)
            .await?
            .map(|(kind, rel, data)| Ok::<Event, Infallible>(stream_event(kind, &rel, &data)));
        return Ok(Sse::new(stream)
            .keep_alive(
                KeepAlive::new()
                    .interval(KEEP_ALIVE_INTERVAL)
                    .event(Event::default().event("keep-alive").data("null")),
            )
            .into_response());
    }

    let value = store
        .get(&path)
        .await
        .map_err(EmulatorError::internal)?
        .unwrap_or(Value::Null);
    Ok(Json(value).into_response())
}

/// PUT /store/<path>.json
async fn write_value(
    State(store): State<Arc<MemoryStore>>,
    Path(raw): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<Value>, EmulatorError> {
    let path = resource_path(&raw)?;
    store
        .set(&path, value.clone())
        .await
        .map_err(EmulatorError::internal)?;
    Ok(Json(value))
}

/// PATCH /store/<path>.json
async fn merge_value(
    State(store): State<Arc<MemoryStore>>,
    Path(raw): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<Value>, EmulatorError> {
    let path = resource_path(&raw)?;
    let Value::Object(fields) = value else {
        return Err(EmulatorError::bad_request("PATCH body must be a JSON object"));
    };
    store
        .update(&path, fields.clone())
        .await
        .map_err(|e| EmulatorError::bad_request(format!("{:#}", e)))?;
    Ok(Json(Value::Object(fields)))
}

/// DELETE /store/<path>.json
async fn delete_value(
    State(store): State<Arc<MemoryStore>>,
    Path(raw): Path<String>,
) -> Result<Json<Value>, EmulatorError> {
    let path = resource_path(&raw)?;
    store
        .set(&path, Value::Null)
        .await
        .map_err(EmulatorError::internal)?;
    Ok(Json(Value::Null))
}

/// Event-stream frame: kind, path relative to the listener, data.
type Frame = (&'static str, StorePath, Value);

/// Initial `put` of the value at `listen`, then every change touching it.
///
/// A subscriber that falls behind the change channel gets a fresh `put` of
/// the whole listened value in place of the changes it missed.
async fn change_frames(
    store: Arc<MemoryStore>,
    listen: StorePath,
) -> Result<impl Stream<Item = Frame> + Send, EmulatorError> {
    let rx = store
        .subscribe(&listen)
        .await
        .map_err(EmulatorError::internal)?;
    let initial = store
        .get(&listen)
        .await
        .map_err(EmulatorError::internal)?
        .unwrap_or(Value::Null);

    info!(path = %listen, "Event stream opened");

    let updates = BroadcastStream::new(rx)
        .then(move |message| {
            let store = Arc::clone(&store);
            let listen = listen.clone();
            async move {
                match message {
                    Ok(change) => relative_events(&listen, &change),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(path = %listen, skipped, "Event stream lagged, resending value");
                        let current = match store.get(&listen).await {
                            Ok(value) => value.unwrap_or(Value::Null),
                            Err(e) => {
                                warn!(path = %listen, error = %e, "Failed to reread lagged path");
                                return Vec::new();
                            }
                        };
                        vec![("put", StorePath::root(), current)]
                    }
                }
            }
        })
        .flat_map(stream::iter);

    Ok(stream::once(async move { ("put", StorePath::root(), initial) }).chain(updates))
}

fn stream_event(kind: &str, rel: &StorePath, data: &Value) -> Event {
    let payload = json!({ "path": rel.to_string(), "data": data });
    Event::default().event(kind).data(payload.to_string())
}

/// Re-express `change` relative to a stream listening at `listen`.
fn relative_events(listen: &StorePath, change: &StoreChange) -> Vec<(&'static str, StorePath, Value)> {
    if change.kind == ChangeKind::Patch {
        if let Some(rel) = change.path.relative_to(listen) {
            return vec![("patch", rel, change.data.clone())];
        }
    }

    change
        .puts()
        .into_iter()
        .filter_map(|(path, data)| {
            if let Some(rel) = path.relative_to(listen) {
                Some(("put", rel, data.clone()))
            } else {
                listen.relative_to(&path).map(|rel| {
                    let below = value_at(data, &rel).cloned().unwrap_or(Value::Null);
                    ("put", StorePath::root(), below)
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn path(raw: &str) -> StorePath {
        StorePath::parse(raw).unwrap()
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        };
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("Content-Type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_resource_path() {
        assert_eq!(resource_path("devices/lamp1.json").ok(), Some(path("devices/lamp1")));
        assert_eq!(resource_path(".json").ok(), Some(StorePath::root()));
        assert!(resource_path("devices").is_err());
        assert!(resource_path("dev$ices.json").is_err());
    }

    #[test]
    fn test_relative_events() {
        let listen = path("devices");

        let below = StoreChange::put(path("devices/lamp1/status"), json!("on"));
        assert_eq!(
            relative_events(&listen, &below),
            vec![("put", path("lamp1/status"), json!("on"))]
        );

        let above = StoreChange::put(StorePath::root(), json!({"devices": {"fan1": {"status": "off"}}}));
        assert_eq!(
            relative_events(&listen, &above),
            vec![("put", StorePath::root(), json!({"fan1": {"status": "off"}}))]
        );

        let patch = StoreChange::patch(path("devices/lamp1"), json!({"status": "off"}).as_object().unwrap().clone());
        assert_eq!(
            relative_events(&listen, &patch),
            vec![("patch", path("lamp1"), json!({"status": "off"}))]
        );

        let unrelated = StoreChange::put(path("sensors/humidity"), json!(41.0));
        assert!(relative_events(&listen, &unrelated).is_empty());
    }

    #[test]
    fn test_patch_above_listener_becomes_put() {
        let listen = path("devices/lamp1/status");
        let patch = StoreChange::patch(
            path("devices"),
            json!({"lamp1/status": "on", "fan1/status": "on"}).as_object().unwrap().clone(),
        );
        assert_eq!(
            relative_events(&listen, &patch),
            vec![("put", StorePath::root(), json!("on"))]
        );
    }

    #[tokio::test]
    async fn test_lagged_stream_resends_current_value() {
        use crate::store::CHANGE_CHANNEL_CAPACITY;

        let store = Arc::new(MemoryStore::new());
        let frames = change_frames(Arc::clone(&store), path("sensors"))
            .await
            .unwrap();
        tokio::pin!(frames);

        // Channel slots round up to a power of two
        let last = CHANGE_CHANNEL_CAPACITY * 2;
        for n in 1..=last {
            store.set(&path("sensors/n"), json!(n)).await.unwrap();
        }

        assert_eq!(frames.next().await, Some(("put", StorePath::root(), Value::Null)));
        assert_eq!(
            frames.next().await,
            Some(("put", StorePath::root(), json!({"n": last})))
        );
        // Changes still buffered follow the resync
        let (kind, rel, _) = frames.next().await.unwrap();
        assert_eq!((kind, rel), ("put", path("n")));
    }

    #[tokio::test]
    async fn test_rest_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let app = create_emulator_router(Arc::clone(&store));

        let (status, body) = send(app.clone(), "PUT", "/store/devices/lamp1.json", Some(json!({"name": "Lamp", "status": "off"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "off");

        let (status, _) = send(app.clone(), "PATCH", "/store/devices/lamp1.json", Some(json!({"status": "on"}))).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(app.clone(), "GET", "/store/devices/lamp1/status.json", None).await;
        assert_eq!(body, json!("on"));

        let (_, body) = send(app.clone(), "DELETE", "/store/devices.json", None).await;
        assert_eq!(body, Value::Null);
        let (_, body) = send(app, "GET", "/store/.json", None).await;
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let app = create_emulator_router(Arc::new(MemoryStore::new()));

        let (status, body) = send(app.clone(), "GET", "/store/devices", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Path must end with .json");

        let (status, _) = send(app, "PATCH", "/store/sensors.json", Some(json!(5))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rest_store_against_emulator() {
        use crate::store::{RestStore, Subscription};

        let backing = Arc::new(MemoryStore::new());
        let app = create_emulator_router(Arc::clone(&backing));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let remote: Arc<dyn RealtimeStore> =
            Arc::new(RestStore::new(format!("http://{}/store", addr), None).unwrap());
        remote
            .set(&path("devices/lamp1/status"), json!("off"))
            .await
            .unwrap();
        assert_eq!(
            backing.get(&path("devices/lamp1/status")).await.unwrap(),
            Some(json!("off"))
        );

        let mut sub = Subscription::open(Arc::clone(&remote), path("devices/lamp1/status"))
            .await
            .unwrap();
        assert_eq!(sub.next().await, Some(json!("off")));

        // A write straight into the backing store reaches the subscriber via the stream
        backing
            .set(&path("devices/lamp1/status"), json!("on"))
            .await
            .unwrap();
        let next = tokio::time::timeout(Duration::from_secs(5), sub.next())
            .await
            .unwrap();
        assert_eq!(next, Some(json!("on")));
    }
}
