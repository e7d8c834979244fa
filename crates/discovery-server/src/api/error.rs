//! API error types and responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use discovery_core::{CoreError, ScopeError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::core::AuthError;
use crate::storage::StorageError;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The request scope ended before the operation finished
    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Timeout(msg) => (StatusCode::REQUEST_TIMEOUT, "TIMEOUT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) | StorageError::NotEnoughAcks(_) => {
                ApiError::NotFound(err.to_string())
            }
            StorageError::AlreadyRegistered(_) => ApiError::Conflict(err.to_string()),
            StorageError::Unauthorized(msg) => ApiError::Unauthorized(msg),
            StorageError::NonceExhausted(_) => ApiError::Unauthorized(err.to_string()),
            StorageError::Scope(reason) => ApiError::from(reason),
            StorageError::Database(_)
            | StorageError::Serialization(_)
            | StorageError::Connection(_) => {
                error!(error = %err, "Storage failure");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<ScopeError> for ApiError {
    fn from(err: ScopeError) -> Self {
        ApiError::Timeout(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingHeader(_) | AuthError::MalformedHeader { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            AuthError::NonceMismatch { .. } | AuthError::InvalidSignature(_) => {
                ApiError::Unauthorized(err.to_string())
            }
            AuthError::Storage(e) => ApiError::from(e),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("Invalid JSON body: {}", err))
    }
}
