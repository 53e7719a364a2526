//! WebSocket channel for one flow session.
//!
//! The server pushes a snapshot on connect and after every change. Clients
//! send intent JSON (tagged by `action`) or `{"action": "go_back"}`.
//! Intents run on their own task so snapshots, including the pending one,
//! keep flowing while the provider call is outstanding.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::intent::{Intent, IntentRequest};
use super::orchestrator::{Orchestrator, SessionSnapshot};
use super::routes::{FlowRouteState, lookup};

/// Messages sent to the client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Snapshot { snapshot: SessionSnapshot },
    Error { message: String },
}

/// Messages accepted from the client.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClientMessage {
    Control(Control),
    Intent(IntentRequest),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Control {
    GoBack,
}

pub(super) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<FlowRouteState>,
    Path(id): Path<String>,
) -> Response {
    let flow = match lookup(&state.registry, &id).await {
        Ok(flow) => flow,
        Err(response) => return response,
    };
    info!(session_id = %flow.id(), "Flow WebSocket client connecting");
    ws.on_upgrade(move |socket| handle_socket(socket, flow))
        .into_response()
}

async fn send(socket: &mut WebSocket, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            error!(error = %e, "Failed to serialize WS message");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, flow: Arc<Orchestrator>) {
    let mut rx: watch::Receiver<SessionSnapshot> = flow.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let initial = ServerMessage::Snapshot {
        snapshot: rx.borrow_and_update().clone(),
    };
    if !send(&mut socket, &initial).await {
        warn!(session_id = %flow.id(), "Failed to send initial snapshot, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    debug!(session_id = %flow.id(), "Snapshot channel closed");
                    break;
                }
                let msg = ServerMessage::Snapshot {
                    snapshot: rx.borrow_and_update().clone(),
                };
                if !send(&mut socket, &msg).await {
                    debug!("Client disconnected during send");
                    break;
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_message(&text, &flow, &reply_tx).await
                            && !send(&mut socket, &reply).await
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(session_id = %flow.id(), "Flow WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }

            Some(reply) = reply_rx.recv() => {
                if !send(&mut socket, &reply).await {
                    break;
                }
            }
        }
    }

    debug!(session_id = %flow.id(), "Flow WebSocket closed");
}

/// Apply one client message. Returns a direct reply when the client needs
/// one beyond the snapshot stream. Engine faults from a spawned intent come
/// back through `replies`.
async fn handle_client_message(
    text: &str,
    flow: &Arc<Orchestrator>,
    replies: &mpsc::UnboundedSender<ServerMessage>,
) -> Option<ServerMessage> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Control(Control::GoBack)) => {
            if !flow.go_back().await {
                debug!(session_id = %flow.id(), "Back navigation refused");
            }
            None
        }
        Ok(ClientMessage::Intent(request)) => {
            let flow = Arc::clone(flow);
            let replies = replies.clone();
            tokio::spawn(async move {
                if let Err(e) = flow.invoke(Intent::from(request)).await {
                    // Receiver is gone only if the socket already closed.
                    let _ = replies.send(ServerMessage::Error {
                        message: e.to_string(),
                    });
                }
            });
            None
        }
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized WS message from client");
            Some(ServerMessage::Error {
                message: "Unrecognized message".to_string(),
            })
        }
    }
}
