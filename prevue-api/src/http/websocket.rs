//! WebSocket push channel
//!
//! Forwards broadcaster events (sync progress, regeneration, heartbeats)
//! to connected clients as JSON envelopes. Authentication happens in the
//! shared API-key middleware via the `api_key` query parameter.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use tracing::debug;

use prevue_core::service::Envelope;

use super::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// `GET /ws?api_key=...`
pub async fn websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    if send_envelope(&mut socket, &Envelope::connected()).await.is_err() {
        return;
    }

    let mut events = state.broadcaster.subscribe();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if send_envelope(&mut socket, &Envelope::heartbeat()).await.is_err() {
                    break;
                }
            }
            event = events.recv() => {
                match event {
                    Ok(envelope) => {
                        if send_envelope(&mut socket, &envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "WebSocket client lagged behind event stream");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            message = socket.recv() => {
                match message {
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    // Clients only listen; inbound frames are ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    debug!("WebSocket client disconnected");
}

async fn send_envelope(socket: &mut WebSocket, envelope: &Envelope) -> Result<(), axum::Error> {
    let text = serde_json::to_string(envelope).unwrap_or_else(|_| "{}".to_string());
    socket.send(WsMessage::Text(text.into())).await
}
