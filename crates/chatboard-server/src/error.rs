use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use chatboard_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Primary store failure.  Aborts the operation; nothing was broadcast.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid request: {0}")]
    Validation(String),

    /// Revocation by anyone but the author (or of an already-revoked or
    /// unknown message).
    #[error("Can only revoke your own message")]
    RevokeDenied,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upload too large: {size} bytes (max {max})")]
    UploadTooLarge { size: usize, max: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            // Oversize and malformed uploads alike surface as 400 before
            // any store write.
            ServerError::Validation(_) | ServerError::UploadTooLarge { .. } => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ServerError::RevokeDenied => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
