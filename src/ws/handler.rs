//! Full-duplex streaming session over an upgraded connection.
//!
//! Each session runs two tasks: a writer draining the session's outbound
//! channel (the only thing that touches the sink, so replies and broadcast
//! notifications never interleave on the wire) and a reader dispatching
//! client frames. When either side finishes, the session is unregistered
//! and every subscription it held is detached.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::error::RelayError;
use crate::registry::SessionHandle;
use crate::server::AppState;

use super::frame::{ClientFrame, Outbound, ServerFrame};

const OUTBOUND_BUFFER: usize = 32;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[tracing::instrument(name = "ws.session", skip(socket, state))]
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOUND_BUFFER);
    let session = state.registry.register(tx);
    let session_id = session.id;

    tracing::info!(session_id = %session_id, "streaming session established");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Writer: sole owner of the sink half.
    let send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Frame(frame) => {
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to serialize frame");
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Ping => {
                    if ws_sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let state_clone = state.clone();
    let session_clone = session.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(message) => {
                    if !process_message(message, &state_clone, &session_clone).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(session_id = %session_clone.id, error = %e, "websocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = send_task => {
            tracing::debug!(session_id = %session_id, "writer finished");
        }
        _ = recv_task => {
            tracing::debug!(session_id = %session_id, "reader finished");
        }
    }

    state.registry.unregister(session_id).await;
    tracing::info!(session_id = %session_id, "streaming session closed");
}

/// Returns false when the session should end.
async fn process_message(
    message: Message,
    state: &AppState,
    session: &Arc<SessionHandle>,
) -> bool {
    match message {
        Message::Text(text) => {
            session.touch();

            let frame: ClientFrame = match serde_json::from_str(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(session_id = %session.id, error = %e, "unparseable frame");
                    let _ = session.send(ServerFrame::error(e.to_string())).await;
                    return true;
                }
            };

            handle_frame(frame, state, session).await;
            true
        }
        Message::Binary(_) => {
            let _ = session
                .send(ServerFrame::error("binary frames are not supported"))
                .await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            session.touch();
            true
        }
        Message::Close(_) => {
            tracing::debug!(session_id = %session.id, "received close frame");
            false
        }
    }
}

async fn handle_frame(frame: ClientFrame, state: &AppState, session: &Arc<SessionHandle>) {
    match frame {
        ClientFrame::Subscribe {
            queue_id,
            access_token,
        } => {
            // A handle alone is public knowledge; only the token holder may
            // drain notifications.
            let Some(token) = access_token else {
                let _ = session
                    .send(ServerFrame::error(RelayError::InvalidAccessToken.to_string()))
                    .await;
                return;
            };

            match state.manager.authorize(&queue_id, &token).await {
                Ok(()) => {
                    state.registry.attach(session, &queue_id).await;
                }
                Err(e) => {
                    tracing::warn!(session_id = %session.id, queue_id = %queue_id, "subscribe rejected");
                    let _ = session.send(ServerFrame::error(e.to_string())).await;
                }
            }
        }
        ClientFrame::Unsubscribe { queue_id } => {
            state.registry.detach(session, &queue_id).await;
        }
        ClientFrame::Ack {
            queue_id,
            message_id,
            access_token,
        } => {
            if let Err(e) = state
                .manager
                .acknowledge(&queue_id, &message_id, &access_token)
                .await
            {
                let _ = session.send(ServerFrame::error(e.to_string())).await;
            }
        }
        ClientFrame::Ping => {
            let _ = session.send(ServerFrame::pong()).await;
        }
    }
}
