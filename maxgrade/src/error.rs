//! Error types for the maxgrade HTTP surface

use crate::intake::IntakeError;
use crate::session::TransitionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., grading already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upload over the size limit (413)
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Upload is not an image or video (415)
    #[error("{0}")]
    UnsupportedMediaType(String),

    /// Session cap reached (429)
    #[error("Too many sessions (limit {0})")]
    TooManySessions(usize),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<IntakeError> for ApiError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::FileTooLarge { .. } => {
                ApiError::PayloadTooLarge(err.user_message().to_string())
            }
            IntakeError::UnsupportedMediaType(_) => {
                ApiError::UnsupportedMediaType(err.user_message().to_string())
            }
            IntakeError::Read(_) => ApiError::BadRequest(err.user_message().to_string()),
        }
    }
}

impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        ApiError::Conflict(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE", msg)
            }
            ApiError::UnsupportedMediaType(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_MEDIA_TYPE",
                msg,
            ),
            ApiError::TooManySessions(limit) => (
                StatusCode::TOO_MANY_REQUESTS,
                "TOO_MANY_SESSIONS",
                format!("Too many sessions (limit {})", limit),
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
