//! Client for a Firebase-compatible realtime database REST API.
//!
//! Reads and writes are plain `GET`/`PUT`/`PATCH` requests on
//! `<base>/<path>.json`. Change subscriptions open a streaming `GET` with
//! `Accept: text/event-stream`; the server answers with `put`/`patch` events
//! whose `path` is relative to the streamed location.

use crate::config::{StoreBackend, StoreConfig};
use crate::credentials::{AuthToken, ServiceAccount, StoreCredentials, MISSING_CREDENTIALS};
use crate::store::{
    EventStreamParser, RealtimeStore, StoreChange, StorePath, StreamEvent,
    CHANGE_CHANNEL_CAPACITY,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Payload of a streamed `put` or `patch` event.
#[derive(Debug, Deserialize)]
struct StreamPayload {
    path: String,
    data: Value,
}

/// Realtime store reached over HTTP.
pub struct RestStore {
    base_url: String,
    auth: Option<AuthToken>,
    http_client: Client,
    change_tx: broadcast::Sender<StoreChange>,

    /// Running stream listeners keyed by streamed path
    listeners: Arc<DashMap<StorePath, JoinHandle<()>>>,
}

impl RestStore {
    /// Create a client for `base_url` (e.g. `https://<project>-default-rtdb.firebaseio.com`).
    pub fn new(base_url: impl Into<String>, auth: Option<AuthToken>) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent("homelink/0.1")
            .build()
            .context("Failed to build HTTP client")?;
        let (change_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            http_client,
            change_tx,
            listeners: Arc::new(DashMap::new()),
        })
    }

    /// Build the client for the `emulator` or `firebase` backend.
    pub fn from_config(config: &StoreConfig, credentials: Option<StoreCredentials>) -> Result<Self> {
        match config.backend {
            StoreBackend::Emulator => Self::new(config.emulator_url(), None),
            StoreBackend::Firebase => {
                let credentials = credentials.ok_or_else(|| anyhow!(MISSING_CREDENTIALS))?;
                let url = config
                    .database_url
                    .clone()
                    .or_else(|| {
                        credentials
                            .service_account
                            .as_ref()
                            .map(ServiceAccount::default_database_url)
                    })
                    .ok_or_else(|| {
                        anyhow!("FIREBASE_DATABASE_URL is required when no service account is configured")
                    })?;
                Self::new(url, Some(credentials.token))
            }
            StoreBackend::Memory => Err(anyhow!("The memory backend has no REST endpoint")),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Number of open stream listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn url(&self, path: &StorePath) -> String {
        resource_url(&self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        with_auth(request, self.auth.as_ref())
    }

    /// True when a running listener already streams `path` or an ancestor.
    fn is_streamed(&self, path: &StorePath) -> bool {
        self.listeners
            .iter()
            .any(|entry| path.starts_with(entry.key()) && !entry.value().is_finished())
    }
}

impl Drop for RestStore {
    fn drop(&mut self) {
        for entry in self.listeners.iter() {
            entry.value().abort();
        }
    }
}

#[async_trait]
impl RealtimeStore for RestStore {
    async fn get(&self, path: &StorePath) -> Result<Option<Value>> {
        let response = self
            .authorize(self.http_client.get(self.url(path)))
            .send()
            .await
            .with_context(|| format!("Failed to send read request for {}", path))?;

        let response = check_response_status(response).await?;
        let value: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse value at {}", path))?;

        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<()> {
        let response = self
            .authorize(self.http_client.put(self.url(path)))
            .json(&value)
            .send()
            .await
            .with_context(|| format!("Failed to send write request for {}", path))?;
        check_response_status(response).await?;

        let _ = self.change_tx.send(StoreChange::put(path.clone(), value));
        debug!(path = %path, "Store set");
        Ok(())
    }

    async fn update(&self, path: &StorePath, fields: Map<String, Value>) -> Result<()> {
        let response = self
            .authorize(self.http_client.patch(self.url(path)))
            .json(&fields)
            .send()
            .await
            .with_context(|| format!("Failed to send update request for {}", path))?;
        check_response_status(response).await?;

        let _ = self.change_tx.send(StoreChange::patch(path.clone(), fields));
        debug!(path = %path, "Store update");
        Ok(())
    }

    async fn subscribe(&self, path: &StorePath) -> Result<broadcast::Receiver<StoreChange>> {
        let rx = self.change_tx.subscribe();

        if !self.is_streamed(path) {
            info!(path = %path, "Opening change stream");
            let request = self
                .authorize(self.http_client.get(self.url(path)))
                .header(header::ACCEPT, "text/event-stream");
            let listeners = Arc::clone(&self.listeners);
            let change_tx = self.change_tx.clone();
            let streamed = path.clone();

            let handle = tokio::spawn(async move {
                if let Err(e) = run_listener(request, &streamed, change_tx).await {
                    error!(path = %streamed, error = %e, "Change stream failed");
                }
                listeners.remove(&streamed);
            });
            self.listeners.insert(path.clone(), handle);
        }

        Ok(rx)
    }
}

/// `<base>/<encoded segments>.json`
pub(crate) fn resource_url(base_url: &str, path: &StorePath) -> String {
    let encoded: Vec<String> = path
        .segments()
        .iter()
        .map(|s| urlencoding::encode(s).into_owned())
        .collect();
    format!("{}/{}.json", base_url, encoded.join("/"))
}

fn with_auth(request: RequestBuilder, auth: Option<&AuthToken>) -> RequestBuilder {
    match auth {
        Some(token) => {
            let (name, value) = token.query_param();
            request.query(&[(name, value)])
        }
        None => request,
    }
}

async fn check_response_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    // The database reports failures as {"error": "..."}
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    Err(anyhow!("Store request failed with status {}: {}", status, message))
}

/// Read the event stream for `streamed` and publish each change.
async fn run_listener(
    request: RequestBuilder,
    streamed: &StorePath,
    change_tx: broadcast::Sender<StoreChange>,
) -> Result<()> {
    let response = request
        .send()
        .await
        .with_context(|| format!("Failed to open change stream for {}", streamed))?;
    let response = check_response_status(response).await?;

    let mut body = response.bytes_stream();
    let mut parser = EventStreamParser::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("Change stream read failed")?;
        for event in parser.feed(&chunk) {
            match translate_event(streamed, &event)? {
                StreamOutcome::Change(change) => {
                    let _ = change_tx.send(change);
                }
                StreamOutcome::Ignore => {}
                StreamOutcome::Closed(reason) => {
                    warn!(path = %streamed, reason = %reason, "Change stream closed by server");
                    return Ok(());
                }
            }
        }
    }

    warn!(path = %streamed, "Change stream ended");
    Ok(())
}

#[derive(Debug, PartialEq)]
enum StreamOutcome {
    Change(StoreChange),
    Ignore,
    Closed(String),
}

fn translate_event(streamed: &StorePath, event: &StreamEvent) -> Result<StreamOutcome> {
    match event.event.as_str() {
        "put" | "patch" => {
            let payload: StreamPayload = serde_json::from_str(&event.data)
                .with_context(|| format!("Malformed {} event", event.event))?;
            let path = streamed.join(&StorePath::parse(&payload.path)?);

            let change = if event.event == "put" {
                StoreChange::put(path, payload.data)
            } else {
                match payload.data {
                    Value::Object(fields) => StoreChange::patch(path, fields),
                    other => return Err(anyhow!("Patch event data must be an object, got {}", other)),
                }
            };
            Ok(StreamOutcome::Change(change))
        }
        "keep-alive" => Ok(StreamOutcome::Ignore),
        "cancel" | "auth_revoked" => Ok(StreamOutcome::Closed(event.event.clone())),
        other => {
            debug!(event = %other, "Ignoring unknown stream event");
            Ok(StreamOutcome::Ignore)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChangeKind;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn path(raw: &str) -> StorePath {
        StorePath::parse(raw).unwrap()
    }

    #[test]
    fn from_config_resolves_urls() {
        let emulator = StoreConfig {
            backend: StoreBackend::Emulator,
            database_url: None,
        };
        let store = RestStore::from_config(&emulator, None).unwrap();
        assert_eq!(store.base_url(), "http://localhost:3000/store");

        let firebase = StoreConfig {
            backend: StoreBackend::Firebase,
            database_url: None,
        };
        let err = RestStore::from_config(&firebase, None).err().unwrap();
        assert_eq!(err.to_string(), MISSING_CREDENTIALS);

        let credentials = StoreCredentials {
            service_account: Some(ServiceAccount {
                project_id: "demo".to_string(),
                client_email: "svc@demo.iam".to_string(),
                private_key: "key".to_string(),
            }),
            token: AuthToken::DatabaseSecret("secret".to_string()),
        };
        let store = RestStore::from_config(&firebase, Some(credentials)).unwrap();
        assert_eq!(store.base_url(), "https://demo-default-rtdb.firebaseio.com");
    }

    #[test]
    fn resource_url_encodes_segments() {
        assert_eq!(
            resource_url("https://db.example.com", &path("devices/living room")),
            "https://db.example.com/devices/living%20room.json"
        );
        assert_eq!(
            resource_url("https://db.example.com", &StorePath::root()),
            "https://db.example.com/.json"
        );
    }

    #[test]
    fn translate_put_is_relative_to_streamed_path() {
        let event = StreamEvent {
            event: "put".to_string(),
            data: r#"{"path":"/lamp1/status","data":"on"}"#.to_string(),
        };
        let outcome = translate_event(&path("devices"), &event).unwrap();
        assert_eq!(
            outcome,
            StreamOutcome::Change(StoreChange::put(path("devices/lamp1/status"), json!("on")))
        );
    }

    #[test]
    fn translate_patch_and_control_events() {
        let patch = StreamEvent {
            event: "patch".to_string(),
            data: r#"{"path":"/","data":{"temperature":25.3}}"#.to_string(),
        };
        match translate_event(&path("sensors"), &patch).unwrap() {
            StreamOutcome::Change(change) => {
                assert_eq!(change.kind, ChangeKind::Patch);
                assert_eq!(change.path, path("sensors"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let keep_alive = StreamEvent {
            event: "keep-alive".to_string(),
            data: "null".to_string(),
        };
        assert_eq!(
            translate_event(&path("sensors"), &keep_alive).unwrap(),
            StreamOutcome::Ignore
        );

        let cancel = StreamEvent {
            event: "cancel".to_string(),
            data: "null".to_string(),
        };
        assert!(matches!(
            translate_event(&path("sensors"), &cancel).unwrap(),
            StreamOutcome::Closed(_)
        ));
    }

    #[test]
    fn translate_rejects_non_object_patch() {
        let event = StreamEvent {
            event: "patch".to_string(),
            data: r#"{"path":"/","data":5}"#.to_string(),
        };
        assert!(translate_event(&path("sensors"), &event).is_err());
    }

    #[tokio::test]
    async fn get_reads_value_with_auth_param() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/sensors.json")
            .match_query(Matcher::UrlEncoded("auth".into(), "secret".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"temperature":26.0,"humidity":45.0,"lastUpdate":1}"#)
            .create_async()
            .await;

        let store = RestStore::new(server.url(), Some(AuthToken::DatabaseSecret("secret".into()))).unwrap();
        let value = store.get(&path("sensors")).await.unwrap().unwrap();
        assert_eq!(value["humidity"], json!(45.0));
    }

    #[tokio::test]
    async fn get_null_is_absent() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/devices.json")
            .with_status(200)
            .with_body("null")
            .create_async()
            .await;

        let store = RestStore::new(server.url(), None).unwrap();
        assert!(store.get(&path("devices")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_puts_json_and_publishes_change() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/devices/lamp1/status.json")
            .match_body(Matcher::Json(json!("on")))
            .with_status(200)
            .with_body(r#""on""#)
            .create_async()
            .await;

        let store = RestStore::new(server.url(), None).unwrap();
        let mut rx = store.change_tx.subscribe();
        store
            .set(&path("devices/lamp1/status"), json!("on"))
            .await
            .unwrap();

        mock.assert_async().await;
        let change = rx.try_recv().unwrap();
        assert_eq!(change, StoreChange::put(path("devices/lamp1/status"), json!("on")));
    }

    #[tokio::test]
    async fn update_sends_patch_with_access_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PATCH", "/sensors.json")
            .match_query(Matcher::UrlEncoded("access_token".into(), "tok".into()))
            .match_body(Matcher::Json(json!({"temperature": 25.0})))
            .with_status(200)
            .with_body(r#"{"temperature":25.0}"#)
            .create_async()
            .await;

        let store = RestStore::new(server.url(), Some(AuthToken::AccessToken("tok".into()))).unwrap();
        let fields = json!({"temperature": 25.0}).as_object().unwrap().clone();
        store.update(&path("sensors"), fields).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_body_is_reported() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/devices.json")
            .with_status(401)
            .with_body(r#"{"error":"Permission denied"}"#)
            .create_async()
            .await;

        let store = RestStore::new(server.url(), None).unwrap();
        let err = store.get(&path("devices")).await.unwrap_err();
        assert!(err.to_string().contains("Permission denied"));
    }

    #[tokio::test]
    async fn subscribe_streams_changes() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/devices.json")
            .match_header("accept", "text/event-stream")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(concat!(
                "event: put\n",
                "data: {\"path\":\"/\",\"data\":{\"lamp1\":{\"status\":\"off\"}}}\n\n",
                "event: put\n",
                "data: {\"path\":\"/lamp1/status\",\"data\":\"on\"}\n\n",
            ))
            .create_async()
            .await;

        let store = RestStore::new(server.url(), None).unwrap();
        let mut rx = store.subscribe(&path("devices")).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.path, path("devices"));
        let second = rx.recv().await.unwrap();
        assert_eq!(second, StoreChange::put(path("devices/lamp1/status"), json!("on")));
    }
}
