//! Error types for vstream-ingest
//!
//! One error enum covers the service's failure kinds; the `IntoResponse`
//! impl maps each kind to its HTTP surface. Internal failure detail never
//! reaches a PBX caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use vstream_common::db::models::CallState;

/// Main error type for vstream-ingest
#[derive(Error, Debug)]
pub enum Error {
    /// Request failed validation (422)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Call does not exist (404)
    #[error("Call not found: {0}")]
    CallNotFound(String),

    /// Lifecycle transition not permitted by the state machine.
    /// A programming error when raised inside the pipeline; never surfaced
    /// to a PBX caller.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: CallState, to: CallState },

    /// AI retry policy exhausted its attempt and deadline budget
    #[error("AI service unavailable: {0}")]
    AiUnavailable(String),

    /// Store-level failure other than a duplicate insert
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Shared store/model layer failure, e.g. a persisted row that no
    /// longer decodes
    #[error("Store error: {0}")]
    Store(#[from] vstream_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            Error::InvalidInput(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_INPUT", msg),
            Error::CallNotFound(msg) => (StatusCode::NOT_FOUND, "CALL_NOT_FOUND", msg),
            // Internal kinds are logged where they occur; the response body
            // is sanitized.
            Error::InvalidTransition { .. }
            | Error::AiUnavailable(_)
            | Error::Database(_)
            | Error::Store(_)
            | Error::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
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

/// Convenience Result type using the vstream-ingest Error
pub type Result<T> = std::result::Result<T, Error>;
