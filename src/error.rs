//! Error types for the REST API.

use crate::config::ConfigError;
use crate::tasks::SubmitError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

#[cfg(test)]
mod tests;

/// API error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
    /// Error code.
    pub code: String,
}

/// Rate limit error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct RateLimitErrorResponse {
    /// Machine-readable error kind.
    pub error: String,
    /// Human-readable explanation.
    pub message: String,
    /// Seconds until the client may retry.
    pub retry_after: u64,
}

/// API error types.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Task not found.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Task queue at capacity.
    #[error("Task queue full: {0}")]
    QueueFull(String),

    /// Service not accepting work.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded {
        /// Maximum requests allowed per window.
        limit: u32,
        /// Remaining requests (always 0 when exceeded).
        remaining: u32,
        /// Unix timestamp when the rate limit resets.
        reset: i64,
        /// Window length in seconds.
        window: u64,
        /// Seconds until reset.
        retry_after: u64,
    },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::TaskNotFound(_) => (StatusCode::NOT_FOUND, "TASK_NOT_FOUND"),
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::QueueFull(_) => (StatusCode::SERVICE_UNAVAILABLE, "QUEUE_FULL"),
            ApiError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::RateLimitExceeded {
                limit,
                remaining,
                reset,
                window,
                retry_after,
            } => {
                let body = Json(RateLimitErrorResponse {
                    error: "rate_limit_exceeded".to_string(),
                    message: format!(
                        "Rate limit of {} requests per {} seconds exceeded",
                        limit, window
                    ),
                    retry_after: *retry_after,
                });

                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [
                        ("X-RateLimit-Limit", limit.to_string()),
                        ("X-RateLimit-Remaining", remaining.to_string()),
                        ("X-RateLimit-Reset", reset.to_string()),
                        ("X-RateLimit-Window", window.to_string()),
                        ("Retry-After", retry_after.to_string()),
                    ],
                    body,
                )
                    .into_response();
            }
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::QueueFull { .. } => ApiError::QueueFull(err.to_string()),
            SubmitError::Stopped => ApiError::ServiceUnavailable(err.to_string()),
            SubmitError::Duplicate(_) | SubmitError::InvalidId => {
                ApiError::InvalidRequest(err.to_string())
            }
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidValue(msg) => ApiError::InvalidRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
