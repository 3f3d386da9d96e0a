// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quotient_core::OrchestrationError;
use quotient_db::DbError;
use serde::Serialize;
use thiserror::Error;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::JobNotFound(id) => {
                tracing::warn!(job_id = %id, "Job not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Job not found", format!("Job ID: {}", id)),
                )
            }
            ApiError::Orchestration(err) => match err {
                OrchestrationError::Validation(msg) => {
                    tracing::warn!(message = %msg, "Submission failed validation");
                    (
                        StatusCode::BAD_REQUEST,
                        ErrorResponse::with_details("Validation failed", msg.clone()),
                    )
                }
                OrchestrationError::UnknownTier { tier } => {
                    // A tier outside the policy table is a configuration
                    // anomaly, not a user mistake; log it loudly.
                    tracing::error!(tier = %tier, "Unknown subscription tier");
                    (
                        StatusCode::FORBIDDEN,
                        ErrorResponse::with_details(
                            "Unknown subscription tier",
                            format!("Tier: {}", tier),
                        ),
                    )
                }
                OrchestrationError::QuotaExceeded { current, limit } => {
                    tracing::warn!(current = current, limit = limit, "Quota exceeded");
                    (
                        StatusCode::FORBIDDEN,
                        ErrorResponse::with_details(
                            "Concurrency quota exceeded",
                            format!("{} of {} active jobs", current, limit),
                        ),
                    )
                }
                OrchestrationError::UnroutableJobType { job_type } => {
                    tracing::error!(job_type = %job_type, "No backend configured for job type");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorResponse::new("Internal server error"),
                    )
                }
                OrchestrationError::Dispatch(msg) | OrchestrationError::Execution(msg) => {
                    // Dispatch and execution failures are asynchronous; they
                    // should never reach a handler. If one does, treat it as
                    // an internal error and keep details out of the body.
                    tracing::error!(message = %msg, "Unexpected asynchronous error in handler");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorResponse::new("Internal server error"),
                    )
                }
            },
            ApiError::Database(db_err) => {
                tracing::error!(error = %db_err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Database error", db_err.to_string()),
                )
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
            ApiError::Conflict(msg) => {
                tracing::warn!(message = %msg, "Conflict");
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::with_details("Conflict", msg.clone()),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
