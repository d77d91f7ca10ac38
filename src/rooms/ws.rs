use axum::{debug_handler, extract::{ws::{Message, WebSocket}, Query, State, WebSocketUpgrade}, response::IntoResponse};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::Hub;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RoomWsQuery {
    room_id: String,
}

/// Push channel. The handshake's `roomId` picks the room whose messages this
/// connection receives for as long as it stays open.
#[debug_handler(state = crate::AppState)]
pub async fn room_ws(
    Query(RoomWsQuery { room_id }): Query<RoomWsQuery>,
    State(hub): State<Hub>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |stream| serve_member(stream, hub, room_id))
}

async fn serve_member(stream: WebSocket, hub: Hub, room_id: String) {
    let connection_id = Uuid::now_v7();
    let mut subscription = hub.subscribe(connection_id, &room_id);
    tracing::info!(%connection_id, room_id = %room_id, "a user connected");

    let (mut sender, mut receiver) = stream.split();

    let mut broadcast_task = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("skipping event: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // nothing is expected from clients; keep reading until they hang up
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut broadcast_task => recv_task.abort(),
        _ = &mut recv_task => broadcast_task.abort(),
    };

    tracing::info!(%connection_id, room_id = %room_id, "a user disconnected");
}
