use axum::{debug_handler, extract::{rejection::JsonRejection, Path, State}, Json};

use crate::{db::{Message, NewMessage}, AppResult, Hub, Store};

pub(crate) const MESSAGE_EVENT: &str = "message";

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list_msgs(
    State(store): State<Store>,
    Path(room_id): Path<String>,
) -> AppResult<Json<Vec<Message>>> {
    Ok(Json(store.list_messages(&room_id).await?))
}

/// Stores the message, then fans it out to the room. A failed write
/// returns before anything is published.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn send_msg(
    State(store): State<Store>,
    State(hub): State<Hub>,
    Path(room_id): Path<String>,
    body: Result<Json<NewMessage>, JsonRejection>,
) -> AppResult<Json<&'static str>> {
    let Json(msg) = body?;
    let saved = store.append_message(&room_id, msg).await?;

    let reached = hub.publish(&room_id, MESSAGE_EVENT, &saved.payload());
    tracing::debug!(room_id = %room_id, message_id = %saved.message_id, reached, "message broadcast");

    Ok(Json("ok"))
}
