//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        Path, Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    infrastructure::dto::websocket::InboundMessage,
    ui::state::AppState,
    usecase::{AdmittedConnection, ConnectParams, PublishError},
};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub display_name: Option<String>,
    pub password: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(query): Query<ConnectQuery>,
) -> impl IntoResponse {
    // Admission happens after the upgrade so rejections can carry a close
    // frame with a reason the client can read.
    ws.on_upgrade(move |socket| handle_socket(socket, state, room_id, query))
}

async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    room_id: String,
    query: ConnectQuery,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let params = ConnectParams {
        room_id,
        display_name: query.display_name,
        password: query.password,
    };

    let admitted = match state.connect_usecase.execute(params, tx).await {
        Ok(admitted) => admitted,
        Err(e) => {
            tracing::info!("Connection rejected: {}", e);
            let close = Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: e.to_string().into(),
            }));
            // The peer may already be gone
            let _ = socket.send(close).await;
            return;
        }
    };

    run_session(socket, state, admitted, rx).await;
}

/// Spawns a task that receives payloads from the rx channel and pushes them
/// to the WebSocket sender.
///
/// This is the outbound half of the session: whatever the relay task fans
/// out to this connection's channel is forwarded to the client as-is.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    })
}

async fn run_session(
    socket: WebSocket,
    state: Arc<AppState>,
    admitted: AdmittedConnection,
    rx: mpsc::UnboundedReceiver<String>,
) {
    let room_id = admitted.room.id.clone();
    let meta = admitted.meta.clone();
    let (mut sender, mut receiver) = socket.split();

    // Send the welcome frame (roster + count) to the newly admitted client
    match state.connect_usecase.welcome_envelope(&admitted).await {
        Ok(envelope) => {
            if let Err(e) = sender.send(Message::Text(envelope.to_json().into())).await {
                tracing::warn!(
                    "Failed to send welcome frame to '{}': {}",
                    meta.id.as_str(),
                    e
                );
                state.disconnect_usecase.execute(&room_id, &meta).await;
                return;
            }
        }
        Err(e) => {
            tracing::warn!(
                "Failed to build welcome frame for '{}': {}",
                meta.id.as_str(),
                e
            );
        }
    }

    // Announce the join to everyone in the room (all instances)
    if let Err(e) = state.connect_usecase.announce_online(&admitted).await {
        tracing::warn!(
            "Failed to announce '{}' online in room '{}': {}",
            meta.display_name.as_str(),
            room_id.as_str(),
            e
        );
    }

    // Inbound half: decode client frames and publish them on the broker
    let recv_state = Arc::clone(&state);
    let recv_room_id = room_id.clone();
    let recv_meta = meta.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!("WebSocket error for '{}': {}", recv_meta.id.as_str(), e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    let Some(text) = InboundMessage::text_of(&text) else {
                        continue;
                    };
                    match recv_state
                        .publish_message_usecase
                        .execute(&recv_room_id, &recv_meta, text)
                        .await
                    {
                        Ok(()) => {}
                        Err(PublishError::RoomGone) => {
                            tracing::info!(
                                "Room '{}' is gone, ending session of '{}'",
                                recv_room_id.as_str(),
                                recv_meta.id.as_str()
                            );
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Failed to publish message from '{}': {}",
                                recv_meta.id.as_str(),
                                e
                            );
                        }
                    }
                }
                Message::Close(_) => {
                    tracing::info!("Client '{}' requested close", recv_meta.id.as_str());
                    break;
                }
                // Ping/pong is handled automatically by the WebSocket protocol
                _ => {}
            }
        }
    });

    // Outbound half
    let mut send_task = pusher_loop(rx, sender);

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    // Teardown runs exactly once, whatever ended the session
    state.disconnect_usecase.execute(&room_id, &meta).await;
}
