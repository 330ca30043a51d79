// =============================================================================
// WebSocket Handler — push channel for subscribers
// =============================================================================
//
// Clients connect to `/api/v1/ws?client_id=<id>&client_type=<bot|web>` and
// receive:
//   1. An immediate snapshot of every tracked symbol's last price.
//   2. Price updates filtered by their subscription set (empty = all).
//   3. Triggered alerts, if they registered as `bot`.
//
// One task per connection runs a `select!` over the hub's outbound queue and
// the inbound socket. Control frames: inbound Ping gets a Pong; Close, read
// errors, and a dropped queue all end the task, which deregisters the
// connection on the way out.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::engine::FxEngine;
use crate::hub::{ClientMessage, ClientType, ServerMessage};

#[derive(Deserialize)]
pub struct WsQuery {
    client_id: Option<String>,
    client_type: Option<String>,
}

/// Axum handler for the WebSocket upgrade request.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(engine): State<Arc<FxEngine>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let client_id = query
        .client_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let client_type = ClientType::parse(query.client_type.as_deref().unwrap_or("unknown"));

    info!(client_id = %client_id, client_type = ?client_type, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, engine, client_id, client_type))
}

/// Manage one subscriber connection's lifecycle.
async fn handle_ws_connection(
    socket: WebSocket,
    engine: Arc<FxEngine>,
    client_id: String,
    client_type: ClientType,
) {
    // Registration queues the snapshot as the first outbound message.
    let mut queue_rx = engine.connect_client(&client_id, client_type);
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            // ── Outbound: drain the hub queue ───────────────────────────
            queued = queue_rx.recv() => {
                match queued {
                    Some(message) => match serde_json::to_string(&message) {
                        Ok(json) => {
                            if sender.send(Message::Text(json)).await.is_err() {
                                debug!(client_id = %client_id, "WebSocket send failed — disconnecting");
                                break;
                            }
                        }
                        Err(e) => {
                            // Serialisation errors are not network errors;
                            // skip the message, keep the connection.
                            warn!(error = %e, "failed to serialise outbound message");
                        }
                    },
                    // The hub dropped this connection (dead queue detected
                    // during a broadcast).
                    None => break,
                }
            }

            // ── Inbound: control messages from the subscriber ───────────
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(message) => engine.handle_client_message(&client_id, message),
                            Err(_) => {
                                engine.hub.send_to(&client_id, ServerMessage::Error {
                                    message: "Unrecognized message".to_string(),
                                });
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Binary(_))) => {
                        debug!(client_id = %client_id, "binary message ignored");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(client_id = %client_id, "WebSocket close frame received");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(client_id = %client_id, error = %e, "WebSocket receive error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    engine.hub.disconnect(&client_id);
}
