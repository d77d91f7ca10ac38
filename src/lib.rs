pub mod appresult;
pub mod config;
pub mod db;
pub mod hub;
pub mod rooms;

use axum::{extract::FromRef, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use appresult::{AppError, AppResult, ChatError, ChatResult};
pub use config::Config;
pub use db::Store;
pub use hub::Hub;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Store,
    pub hub: Hub,
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/ws", get(rooms::room_ws))
        .nest("/rooms", rooms::router())
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn hello() -> &'static str {
    "snackchat-server"
}
