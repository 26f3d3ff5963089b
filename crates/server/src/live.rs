//! WebSocket endpoint streaming dashboard snapshots and events.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

use pulse_engine::{EventSink, SinkError};

use crate::state::AppState;

/// Send half of a client socket, driven by the broadcaster loop.
struct WsSink {
    sender: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait::async_trait]
impl EventSink for WsSink {
    async fn deliver(&self, payload: &str) -> Result<(), SinkError> {
        self.sender
            .lock()
            .await
            .send(Message::Text(payload.to_owned().into()))
            .await
            .map_err(|e| SinkError::Delivery(e.to_string()))
    }

    async fn close(&self) {
        let _ = self.sender.lock().await.close().await;
    }
}

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();
    let sink = Arc::new(WsSink {
        sender: Mutex::new(sender),
    });

    // The subscriber receives the current snapshot immediately, then
    // dashboard updates per tick and events per ingest.
    let id = state.engine.subscribe(sink).await;
    info!(subscriber = %id, "websocket client connected");

    // Consume incoming frames (pings, close) but ignore content.
    while let Some(Ok(msg)) = receiver.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }

    state.engine.unsubscribe(id).await;
    debug!(subscriber = %id, "websocket client disconnected");
}
