//! Route configuration.

use crate::api::{handlers, middleware};
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;

/// Creates the API router.
///
/// Every route passes through the rate limiting middleware; paths excluded
/// in configuration are let through without being counted.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Signal parsing
        .route("/api/v1/signals/parse", post(handlers::submit_signal))
        .route(
            "/api/v1/signals/tasks/{task_id}",
            get(handlers::get_task_status),
        )
        .route("/api/v1/signals/stats", get(handlers::get_signal_stats))
        // Rate limit administration
        .route(
            "/api/v1/admin/rate-limits",
            get(handlers::get_rate_limits).put(handlers::replace_rate_limits),
        )
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::rate_limit_middleware,
        ))
        .with_state(state)
}
