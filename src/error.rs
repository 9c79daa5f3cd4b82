use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not permitted: {0}")]
    Authorization(String),

    #[error("Failed to fetch messages: {0}")]
    Fetch(String),

    #[error("Failed to send: {0}")]
    Send(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Completion service error: {0}")]
    Completion(String),

    #[error("Internal server error")]
    InternalError,

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    /// Remote failures that leave local state intact and can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Fetch(_) | AppError::Send(_) | AppError::Storage(_) | AppError::ConnectionLost(_)
        )
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error occurred".to_string())
            }
            AppError::Authentication(ref msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Validation(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(ref msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unauthorized(ref msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Authorization(ref msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Fetch(_)
            | AppError::Send(_)
            | AppError::Storage(_)
            | AppError::ConnectionLost(_)
            | AppError::Completion(_) => {
                tracing::warn!("Upstream failure: {}", self);
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AppError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
