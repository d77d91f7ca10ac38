use axum::{debug_handler, extract::{rejection::JsonRejection, State}, Json};

use crate::{db::NewRoom, AppResult, Store};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_room(
    State(store): State<Store>,
    body: Result<Json<NewRoom>, JsonRejection>,
) -> AppResult<Json<&'static str>> {
    let Json(room) = body?;
    store.create_room(&room).await?;

    Ok(Json("ok"))
}
