use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("No key provided")]
    MissingKey,
    #[error("Key not found")]
    KeyNotFound(String),
    #[error("Failed to bind or serve: {0}")]
    Io(#[from] std::io::Error),
}

/// Converts a `ServerError` into the `{"status": "error", "reason": ...}` body clients expect.
impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::MissingKey => StatusCode::BAD_REQUEST,
            ServerError::KeyNotFound(key) => {
                tracing::debug!(key = %key, "Delete of unknown key.");
                StatusCode::NOT_FOUND
            }
            ServerError::Io(e) => {
                tracing::error!(error = ?e, "Server IO error.");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(json!({ "status": "error", "reason": self.to_string() }));
        (status, body).into_response()
    }
}
