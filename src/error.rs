// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::store::StoreError;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized (unknown user and wrong password share one message)
    AuthError(String),

    // 403 Forbidden (account suspended/disabled)
    AccountDisabled(String),

    // 423 Locked (lockout window still open)
    AccountLocked(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., duplicate username, double submission)
    Conflict(String),

    // 410 Gone (quiz deadline passed)
    SessionExpired(String),

    // 409 Conflict (answers frozen by an earlier submission)
    SessionAlreadySubmitted(String),

    // 503 Service Unavailable (storage update could not be applied; retryable)
    StorageFailure(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AccountDisabled(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::AccountLocked(msg) => (StatusCode::LOCKED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::SessionExpired(msg) => (StatusCode::GONE, msg),
            AppError::SessionAlreadySubmitted(msg) => (StatusCode::CONFLICT, msg),
            AppError::StorageFailure(msg) => {
                tracing::error!("Storage failure: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage unavailable, please retry".to_string(),
                )
            }
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Converts `StoreError` into `AppError`.
/// Allows using the `?` operator on storage calls in handlers.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Unavailable(msg) => AppError::StorageFailure(msg),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
