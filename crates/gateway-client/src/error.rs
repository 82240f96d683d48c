//! Error types for the gateway client.

use thiserror::Error;


/// Client error types.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from API.
        message: String,
    },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The gateway rejected the request with 429 Too Many Requests.
    #[error("Rate limited, retry after {retry_after} seconds")]
    RateLimited {
        /// Seconds until the client may retry.
        retry_after: u64,
    },

    /// A task did not reach a terminal state in time.
    #[error("Timed out waiting for task {0}")]
    Timeout(String),
}
