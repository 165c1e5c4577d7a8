//! Error types for shelf-ingest
//!
//! - `SyncError`: failures that end a run (its text becomes the run's error)
//! - `ApiError`: HTTP boundary errors rendered as JSON

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::client::ClientError;

/// Fatal-to-run failures
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to create run record: {0}")]
    CreateRun(String),

    #[error("failed to read catalog counts: {0}")]
    Counts(String),

    #[error("search for subject '{subject}' failed: {source}")]
    Search {
        subject: String,
        #[source]
        source: ClientError,
    },

    #[error("run cancelled")]
    Cancelled,
}

impl SyncError {
    /// Map a search failure, keeping cancellation distinct
    pub fn search(subject: &str, err: ClientError) -> Self {
        match err {
            ClientError::Cancelled => SyncError::Cancelled,
            source => SyncError::Search {
                subject: subject.to_string(),
                source,
            },
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or wrong shared secret (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. a run is already active
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// shelf-common error
    #[error("Common error: {0}")]
    Common(#[from] shelf_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
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
