use crate::device::DeviceMirror;
use crate::feed::{Feed, FeedMessage};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    Router,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shared state for WebSocket connections
#[derive(Clone)]
pub struct WsState {
    pub feed: Arc<Feed>,
    pub mirror: Arc<DeviceMirror>,
}

/// Create WebSocket router; any path upgrades.
pub fn create_ws_router(state: Arc<WsState>) -> Router {
    Router::new().fallback(ws_handler).with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<WsState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// First frame and the live receiver for a new client.
///
/// The receiver is taken before the mirror snapshot, so no device change
/// can fall between the `init` frame and the first forwarded update.
pub fn open_session(state: &WsState) -> (FeedMessage, broadcast::Receiver<FeedMessage>) {
    let rx = state.feed.subscribe();
    let init = FeedMessage::Init {
        devices: state.mirror.snapshot(),
    };
    (init, rx)
}

async fn handle_socket(socket: WebSocket, state: Arc<WsState>) {
    let connection_id = Uuid::new_v4();
    info!(connection_id = %connection_id, "Web client connected");

    let (tx, rx) = socket.split();
    run_connection(tx, rx, &state, connection_id).await;

    info!(connection_id = %connection_id, "Web client disconnected");
}

/// Send `init`, then relay feed frames until the client goes away.
async fn run_connection<Tx, Rx>(mut tx: Tx, mut rx: Rx, state: &WsState, connection_id: Uuid)
where
    Tx: Sink<Message> + Unpin,
    Tx::Error: std::error::Error + Send + Sync + 'static,
    Rx: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let (init, mut feed_rx) = open_session(state);
    if let Err(e) = send_frame(&mut tx, &init).await {
        error!(connection_id = %connection_id, error = %e, "Failed to send init frame");
        return;
    }

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    None | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = tx.send(Message::Pong(data)).await {
                            error!(connection_id = %connection_id, error = %e, "Failed to send pong");
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!(connection_id = %connection_id, len = text.len(), "Ignoring client message");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            result = feed_rx.recv() => {
                match result {
                    Ok(frame) => {
                        if let Err(e) = send_frame(&mut tx, &frame).await {
                            error!(connection_id = %connection_id, error = %e, "Failed to send frame");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(connection_id = %connection_id, skipped = skipped, "Web client lagged, skipped frames");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

async fn send_frame<Tx>(tx: &mut Tx, frame: &FeedMessage) -> anyhow::Result<()>
where
    Tx: Sink<Message> + Unpin,
    Tx::Error: std::error::Error + Send + Sync + 'static,
{
    let json = frame.to_json()?;
    tx.send(Message::Text(json)).await?;
    Ok(())
}
