use crate::services::bucket_service::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Errors surfaced to API clients.
///
/// Each variant maps to one status code. `Internal` details are logged and
/// replaced with a generic message before they reach the client.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A platform binding the route needs is not configured.
    #[error("{0}")]
    Configuration(String),

    /// The client sent missing or malformed input.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Configuration(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Internal(detail) => {
                tracing::error!("internal error: {}", detail);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidObjectKey(reason) => {
                AppError::Validation(format!("invalid key: {}", reason))
            }
            StorageError::ObjectNotFound(key) => {
                AppError::NotFound(format!("object `{}` not found", key))
            }
            StorageError::BodyRead(err) => {
                AppError::Validation(format!("upload body could not be read: {}", err))
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}
