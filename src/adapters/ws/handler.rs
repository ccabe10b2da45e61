//! WebSocket endpoint: accept, register, read loop, cleanup.
//!
//! The socket is split. The write half is owned by the `WsTransport`
//! writer task; the read half is driven here and feeds heartbeats and
//! subscription changes into the registry.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::protocol::ClientMessage;
use super::transport::WsTransport;
use crate::adapters::http::AppState;
use crate::domain::envelope::{ControlMessage, now_rfc3339};
use crate::domain::topic::Topic;
use crate::ports::transport::ClientTransport;

/// `?client_id=` on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub client_id: Option<String>,
}

/// `GET /ws` upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let client_id = params
        .client_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}

async fn handle_socket(socket: WebSocket, client_id: String, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Reject duplicates before handing the sink to a writer task.
    if state.registry.is_connected(&client_id).await {
        warn!(client_id = %client_id, "Duplicate client id, refusing connection");
        let refusal = ControlMessage::Error {
            message: format!("client id {client_id} is already connected"),
        };
        if let Ok(text) = serde_json::to_string(&refusal) {
            if let Err(e) = ws_tx.send(Message::Text(text)).await {
                debug!(client_id = %client_id, error = %e, "Ignoring send error on refused socket");
            }
        }
        if let Err(e) = ws_tx.send(Message::Close(None)).await {
            debug!(client_id = %client_id, error = %e, "Ignoring close error on refused socket");
        }
        return;
    }

    let (transport, mut close_rx, writer) = WsTransport::spawn(ws_tx, state.client_buffer);
    let transport = Arc::new(transport);

    let session = match state.registry.connect(transport.clone(), &client_id).await {
        Ok(session) => session,
        Err(e) => {
            // Lost a race with another socket using the same id.
            warn!(client_id = %client_id, error = %e, "Registration refused");
            reply(&transport, &ControlMessage::Error { message: e.to_string() }).await;
            if let Err(e) = transport.close().await {
                debug!(client_id = %client_id, error = %e, "Ignoring close error on refused socket");
            }
            if let Err(e) = writer.await {
                debug!(client_id = %client_id, error = %e, "Writer task ended abnormally");
            }
            return;
        }
    };
    state
        .telemetry
        .connections_observed(state.registry.connection_count().await);

    reply(
        &transport,
        &ControlMessage::ConnectionEstablished {
            client_id: client_id.clone(),
            timestamp: now_rfc3339(),
        },
    )
    .await;

    loop {
        tokio::select! {
            biased;
            _ = close_rx.changed() => {
                debug!(client_id = %client_id, "Transport closed by server");
                break;
            }
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&state, &transport, &client_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(client_id = %client_id, error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
        }
    }

    // The registry may already have evicted this session.
    state.registry.disconnect_session(&client_id, session).await;
    if let Err(e) = transport.close().await {
        debug!(client_id = %client_id, error = %e, "Ignoring close error on disconnect");
    }
    let _ = writer.await;
    state
        .telemetry
        .connections_observed(state.registry.connection_count().await);
    info!(client_id = %client_id, "Client disconnected");
}

async fn handle_text(state: &AppState, transport: &Arc<WsTransport>, client_id: &str, text: &str) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(client_id, error = %e, "Unparseable client frame");
            reply(
                transport,
                &ControlMessage::Error {
                    message: format!("invalid message: {e}"),
                },
            )
            .await;
            return;
        }
    };

    match message {
        ClientMessage::Heartbeat => {
            state.registry.heartbeat(client_id).await;
            reply(
                transport,
                &ControlMessage::HeartbeatAck {
                    timestamp: now_rfc3339(),
                },
            )
            .await;
        }
        ClientMessage::Ping => {
            state.registry.heartbeat(client_id).await;
            reply(
                transport,
                &ControlMessage::Pong {
                    timestamp: now_rfc3339(),
                },
            )
            .await;
        }
        ClientMessage::Subscribe { topic } => {
            let ack = if state.registry.subscribe(client_id, &topic).await {
                ControlMessage::Subscribed { topic }
            } else {
                ControlMessage::Error {
                    message: format!("unknown topic: {topic}"),
                }
            };
            reply(transport, &ack).await;
        }
        ClientMessage::Unsubscribe { topic } => {
            state.registry.unsubscribe(client_id, &topic).await;
            // Leaving a topic one never joined is still acknowledged.
            let ack = if Topic::parse(&topic).is_some() {
                ControlMessage::Unsubscribed { topic }
            } else {
                ControlMessage::Error {
                    message: format!("unknown topic: {topic}"),
                }
            };
            reply(transport, &ack).await;
        }
    }
}

async fn reply(transport: &WsTransport, message: &ControlMessage) {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to serialize control message");
            return;
        }
    };
    if let Err(e) = transport.send(&text).await {
        debug!(error = %e, "Control reply dropped");
    }
}
