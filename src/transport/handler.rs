//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and drives one connection through the
//! hub's connect, message and disconnect callbacks.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::messages::{decode, encode, malformed_json, Inbound};
use crate::api::AppState;
use crate::hub::Hub;
use crate::session::{Frame, Socket, CLIENT_CHANNEL};

/// Disconnect reason when the client closed the socket
const CLIENT_CLOSE: &str = "client close";
/// Disconnect reason when the transport failed
const TRANSPORT_ERROR: &str = "transport error";

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Handle an established WebSocket connection
async fn handle_socket(ws: WebSocket, hub: Hub) {
    let (mut sender, mut receiver) = ws.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    let socket = Socket::new(tx);

    if let Err(e) = hub.connect(&socket).await {
        tracing::error!(error = %e, "Failed to register WebSocket connection");
        let refusal = Frame::client(serde_json::json!({ "e": e.to_string() }));
        if let Ok(text) = encode(&refusal) {
            let _ = sender.send(Message::Text(text)).await;
        }
        return;
    }

    let socket_id = socket.id().to_string();

    // Forward frames queued by the hub to the wire
    let send_id = socket_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match encode(&frame) {
                Ok(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        tracing::debug!(
                            socket_id = %send_id,
                            "WebSocket send failed, closing connection"
                        );
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize frame");
                }
            }
        }
    });

    // Inbound frames are handled one at a time, in arrival order
    let recv_hub = hub.clone();
    let recv_socket = socket.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&recv_hub, &recv_socket, msg).await {
                        return CLIENT_CLOSE;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        socket_id = %recv_socket.id(),
                        error = %e,
                        "WebSocket receive error"
                    );
                    return TRANSPORT_ERROR;
                }
            }
        }
        CLIENT_CLOSE
    });

    let reason = tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            TRANSPORT_ERROR
        }
        reason = &mut recv_task => {
            send_task.abort();
            reason.unwrap_or(TRANSPORT_ERROR)
        }
    };

    hub.disconnect(&socket_id, reason).await;
}

/// Handle a received WebSocket message
///
/// Returns false if the connection should be closed.
pub(crate) async fn handle_ws_message(hub: &Hub, socket: &Socket, message: Message) -> bool {
    match message {
        Message::Text(text) => {
            match decode(&text) {
                Inbound::Server(payload) => {
                    hub.handle_message(socket, payload).await;
                }
                Inbound::Other(channel) => {
                    tracing::debug!(
                        socket_id = %socket.id(),
                        channel = %channel,
                        "Ignoring frame on unknown channel"
                    );
                }
                Inbound::Malformed(error) => {
                    tracing::debug!(
                        socket_id = %socket.id(),
                        error = %error,
                        "Invalid frame"
                    );
                    let _ = socket.emit(CLIENT_CHANNEL, malformed_json());
                }
            }
            true
        }
        Message::Binary(_) => {
            let _ = socket.emit(CLIENT_CHANNEL, malformed_json());
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(socket_id = %socket.id(), "Client requested close");
            false
        }
    }
}
