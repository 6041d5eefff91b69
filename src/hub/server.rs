//! WebSocket transport for the observer hub.
//!
//! One axum route upgrades observers onto the hub. The connection is
//! split: the send half lives behind [`ObserverConnection`] so the hub
//! can push events and replies, while this module's receive loop feeds
//! client frames into the hub.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;

use super::{EventHub, ObserverConnection};

const WS_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Send half of an observer WebSocket, behind the connection seam.
struct WsConnection {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    open: AtomicBool,
}

impl WsConnection {
    fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
            open: AtomicBool::new(true),
        }
    }

    fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObserverConnection for WsConnection {
    async fn send_text(&self, text: &str) -> anyhow::Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text.to_string()))
            .await
            .map_err(|e| {
                self.mark_closed();
                anyhow::anyhow!("websocket send failed: {e}")
            })
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Ping(Vec::new())).await.map_err(|e| {
            self.mark_closed();
            anyhow::anyhow!("websocket ping failed: {e}")
        })
    }

    async fn close(&self, code: u16, reason: &str) -> anyhow::Result<()> {
        self.mark_closed();
        let mut sink = self.sink.lock().await;
        sink.send(Message::Close(Some(CloseFrame {
            code,
            reason: Cow::Owned(reason.to_string()),
        })))
        .await
        .map_err(|e| anyhow::anyhow!("websocket close failed: {e}"))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Serves the hub's WebSocket endpoint.
pub struct HubServer {
    hub: EventHub,
}

impl HubServer {
    /// Wrap a hub in a server.
    #[must_use]
    pub fn new(hub: EventHub) -> Self {
        Self { hub }
    }

    /// The axum router exposing `/ws`.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(websocket_handler))
            .with_state(self.hub.clone())
    }

    /// Bind the configured address and serve until the listener fails.
    ///
    /// The heartbeat sweep runs for the lifetime of the server.
    ///
    /// # Errors
    ///
    /// IO faults from binding or serving.
    pub async fn serve(&self) -> Result<()> {
        let addr = self.hub.config().bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(%addr, "observer hub listening");

        let heartbeat = self.hub.spawn_heartbeat();
        let result = axum::serve(listener, self.router()).await;
        heartbeat.abort();
        result.map_err(Into::into)
    }
}

async fn websocket_handler(ws: WebSocketUpgrade, State(hub): State<EventHub>) -> Response {
    ws.max_message_size(WS_MAX_MESSAGE_SIZE)
        .on_upgrade(|socket| observer_stream(socket, hub))
}

/// Drive one observer connection: register it with the hub, then feed
/// client frames in until the peer goes away.
async fn observer_stream(socket: WebSocket, hub: EventHub) {
    let (sink, stream) = socket.split();
    let connection = Arc::new(WsConnection::new(sink));

    let session_id = match hub.add_session(connection.clone()).await {
        Ok(session_id) => session_id,
        Err(fault) => {
            debug!("connection rejected: {fault}");
            return;
        }
    };

    receive_loop(stream, &hub, &session_id, &connection).await;

    connection.mark_closed();
    hub.remove_session(&session_id).await;
    info!(%session_id, "observer disconnected");
}

async fn receive_loop(
    mut stream: SplitStream<WebSocket>,
    hub: &EventHub,
    session_id: &str,
    connection: &Arc<WsConnection>,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let reply = hub.handle_client_message(session_id, &text).await;
                if connection.send_text(&reply.to_wire()).await.is_err() {
                    break;
                }
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Transport-level liveness counts as activity.
                hub.touch_session(session_id).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                let reply = super::ServerMessage::Error {
                    message: "Binary frames are not supported".to_string(),
                };
                if connection.send_text(&reply.to_wire()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(%session_id, "websocket receive error: {e}");
                break;
            }
        }
    }
}
