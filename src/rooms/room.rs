use axum::{debug_handler, extract::{Path, State}, Json};

use crate::{db::RoomSummary, AppResult, Store};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list_rooms(
    State(store): State<Store>,
) -> AppResult<Json<Vec<RoomSummary>>> {
    Ok(Json(store.list_public_rooms().await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room(
    State(store): State<Store>,
    Path(room_id): Path<String>,
) -> AppResult<Json<RoomSummary>> {
    Ok(Json(store.get_room(&room_id).await?))
}
