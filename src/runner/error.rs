//! Runner-level error types that surface over HTTP.
//!
//! Failures that happen *inside* a step (spawn failure, timeout, non-zero
//! exit) are not represented here; the Step Runner synthesizes those
//! directly into a [`StepResult`](crate::runner::model::StepResult) per the
//! propagation policy.

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Serialize;

/// JSON body of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

/// Errors the Runner can report over HTTP.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The container runtime failed its preflight checks.
    #[error("preflight failed: {0}")]
    Preflight(String),

    /// The request failed validation.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The output directory could not be packed into an archive.
    #[error("failed to pack artifacts: {0}")]
    Pack(String),

    /// Any other unexpected failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for RunnerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Preflight(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::Pack(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal error handling request");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
