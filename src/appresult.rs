use axum::{extract::rejection::JsonRejection, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("{0} already exists")]
    Conflict(String),
    #[error("Chat room does not exist")]
    RoomNotFound(String),
    #[error("room {0} not found")]
    NotFound(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        use ChatError::*;
        match self {
            Conflict(_) => StatusCode::CONFLICT,
            RoomNotFound(_) | NotFound(_) => StatusCode::NOT_FOUND,
            Invalid(_) => StatusCode::BAD_REQUEST,
            Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Handler-boundary error. Anything convertible into `anyhow::Error` lands here
/// and is turned into a failure response carrying its description.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(err) = self.0.downcast_ref::<ChatError>() {
            let status = err.status();
            if status.is_server_error() {
                tracing::error!("{:#}", self.0);
            } else {
                tracing::debug!("{err}");
            }

            // posting into a missing room answers with a bare string
            if let ChatError::RoomNotFound(_) = err {
                return (status, Json(err.to_string())).into_response();
            }
            return (status, Json(json!({ "error": err.to_string() }))).into_response();
        }

        if let Some(rejection) = self.0.downcast_ref::<JsonRejection>() {
            tracing::debug!("rejected body: {rejection}");
            return (
                rejection.status(),
                Json(json!({ "error": rejection.body_text() })),
            )
                .into_response();
        }

        tracing::error!("{:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
