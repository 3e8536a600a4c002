//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;

use crate::domain::{ParticipantId, RoomId};

use super::super::state::AppState;

/// WebSocket エンドポイント: `/ws/chat/{room_id}/{uid}`
///
/// 未知のルーム ID はロビーとして扱われ、接続時にルームが作られる。
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path((room_id, uid)): Path<(String, String)>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, room_id, uid))
}

/// Spawns a task that receives messages from the rx channel and pushes them to the WebSocket sender.
///
/// This function handles the outbound message flow: messages from other
/// participants (via rx channel) are sent to this connection's WebSocket.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            // Send the message to this connection
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, room_id: String, uid: String) {
    let room_id = RoomId::new(room_id);
    let participant = ParticipantId::new(uid);

    let (sender, mut receiver) = socket.split();

    // Create a channel for this connection to receive messages
    let (tx, rx) = mpsc::unbounded_channel();

    // Register room membership and the connection (lobby semantics)
    let connection_id = state
        .connect_participant_usecase
        .execute(&room_id, &participant, tx)
        .await;

    // Outbound: push messages from other participants to this connection
    let mut send_task = pusher_loop(rx, sender);

    // Inbound: process text frames one at a time in arrival order
    let recv_state = state.clone();
    let recv_room_id = room_id.clone();
    let recv_participant = participant.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::error!("WebSocket error: {}", e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    recv_state
                        .send_message_usecase
                        .execute(&recv_room_id, &recv_participant, text.as_str())
                        .await;
                }
                Message::Ping(_) => {
                    // Ping/pong is handled automatically by the WebSocket protocol
                    tracing::debug!("received ping");
                }
                Message::Close(_) => {
                    tracing::info!("participant '{}' requested close", recv_participant);
                    break;
                }
                _ => {}
            }
        }
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    // Remove only the connection: membership survives disconnects, and
    // scheduled replies keep running
    state
        .disconnect_participant_usecase
        .execute(&room_id, &connection_id)
        .await;
    tracing::info!("participant '{}' disconnected from room {}", participant, room_id);
}
