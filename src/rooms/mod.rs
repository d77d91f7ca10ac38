mod room;
mod msg;
mod new;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use ws::room_ws;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(room::list_rooms).post(new::new_room))
        .route("/{room_id}", get(room::room))
        .route("/{room_id}/messages", get(msg::list_msgs).post(msg::send_msg))
}
