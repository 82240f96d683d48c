//! API middleware for rate limiting.

use crate::auth::ClientMetadata;
use crate::error::ApiError;
use crate::ratelimit::{Decision, RateLimitInfo};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::warn;

/// Header carrying the rule's request limit.
pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Header carrying the requests left in the window.
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Header carrying the window end in epoch seconds.
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
/// Header carrying the window length in seconds.
pub const RATE_LIMIT_WINDOW: HeaderName = HeaderName::from_static("x-ratelimit-window");

/// Rate limiting middleware.
///
/// Resolves the caller identity, records the request against its bucket and
/// returns 429 Too Many Requests once the rule is exhausted. Adds rate limit
/// headers to every response it admits. Excluded paths pass straight through.
///
/// Any internal fault in the admission path lets the request through.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if state.admission.bypasses(&path) {
        return next.run(request).await;
    }

    let admission = Arc::clone(&state.admission);
    let checked = catch_unwind(AssertUnwindSafe(|| {
        let identity = ClientMetadata::from_request(&request).identity();
        admission.check(&identity, &path)
    }));

    let info = match checked {
        Ok(Ok(Decision::Allowed(info))) => info,
        Ok(Ok(Decision::Denied(info))) => return denied(&info).into_response(),
        Ok(Err(e)) => {
            warn!("Admission check failed for {}, allowing request: {}", path, e);
            return next.run(request).await;
        }
        Err(_) => {
            warn!("Admission check panicked for {}, allowing request", path);
            return next.run(request).await;
        }
    };

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &info);
    response
}

fn denied(info: &RateLimitInfo) -> ApiError {
    ApiError::RateLimitExceeded {
        limit: info.limit,
        remaining: info.remaining,
        reset: info.reset_at,
        window: info.window_seconds,
        retry_after: info.retry_after.unwrap_or(1),
    }
}

/// Writes the rate limit headers for an admitted request.
pub fn apply_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(info.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(info.remaining));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(info.reset_at));
    headers.insert(RATE_LIMIT_WINDOW, HeaderValue::from(info.window_seconds));
}
