//! WebSocket connection handler.
//!
//! Each socket gets a connection id, an outbound channel drained by a sender
//! task, and a read loop that decodes envelopes and forwards them to the hub.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use atelier_core::protocol::{ClientEvent, ServerEvent};

use crate::state::RelayState;

/// Handle a single WebSocket connection for its whole lifetime.
pub async fn handle_websocket(socket: WebSocket, state: RelayState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // ── Step 1: Register With Hub ─────────────────────────────────────────

    state.hub.connect(&conn_id, tx.clone());
    tracing::info!(conn_id = conn_id.as_str(), "WebSocket connected");

    // ── Step 2: Spawn Sender Task ─────────────────────────────────────────

    let sender_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize server event: {}", e);
                }
            }
        }
    });

    // ── Step 3: Process Events ────────────────────────────────────────────

    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match ClientEvent::parse(&text) {
                Ok(event) => state.hub.event(&conn_id, event),
                Err(e) => {
                    tracing::warn!(
                        conn_id = conn_id.as_str(),
                        error = %e,
                        "Failed to parse client event"
                    );
                    let _ = tx.send(ServerEvent::Error {
                        message: format!("Invalid message format: {}", e),
                    });
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = conn_id.as_str(), "Client sent close frame");
                break;
            }
            Err(e) => {
                tracing::warn!(
                    conn_id = conn_id.as_str(),
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
            _ => {} // Binary, Ping, Pong
        }
    }

    // ── Step 4: Cleanup ───────────────────────────────────────────────────

    state.hub.disconnect(&conn_id);
    sender_task.abort();
    tracing::info!(conn_id = conn_id.as_str(), "WebSocket disconnected");
}
