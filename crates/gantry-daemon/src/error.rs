//! Error types for gantry-daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("server error: {0}")]
    Server(String),

    /// Resource store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A convergence pass failed
    #[error("sync error: {0}")]
    Sync(#[from] gantry_core::SyncError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resource-store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation conflicts with the resource's current lifecycle state
    #[error("conflict: {0}")]
    Conflict(String),
}

/// API-facing errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),

    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Store(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Store(_) => (StatusCode::CONFLICT, "STORE_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
