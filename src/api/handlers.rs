//! API request handlers.

use crate::config::{RouteRuleConfig, RuleConfig};
use crate::error::ApiError;
use crate::models::{
    HealthResponse, RateLimitRulesResponse, ReplaceRateLimitsRequest, SignalStatsResponse,
    SubmitSignalRequest, SubmitSignalResponse,
};
use crate::ratelimit::RateLimitRule;
use crate::state::AppState;
use crate::tasks::{TaskResult, TaskStatus};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use std::sync::Arc;
use tracing::info;


/// Base path under which task status is polled.
const TASKS_PATH: &str = "/api/v1/signals/tasks";

fn rule_config(rule: &RateLimitRule) -> RuleConfig {
    RuleConfig {
        max_requests: rule.max_requests(),
        window_seconds: rule.window_seconds(),
        burst: Some(rule.burst()),
    }
}

fn rate_limit_rules(state: &AppState) -> RateLimitRulesResponse {
    let rules = state.admission.rules();
    let routes = rules
        .routes()
        .into_iter()
        .map(|(pattern, rule)| RouteRuleConfig {
            pattern,
            max_requests: rule.max_requests(),
            window_seconds: rule.window_seconds(),
            burst: Some(rule.burst()),
        })
        .collect();

    RateLimitRulesResponse {
        enabled: state.admission.is_enabled(),
        default_rule: rule_config(&rules.default_rule()),
        routes,
        tracked_buckets: state.admission.tracked_buckets(),
    }
}

// ============================================================================
// Health Check
// ============================================================================

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Signal Parsing
// ============================================================================

/// Submit a trading signal for asynchronous parsing.
#[utoipa::path(
    post,
    path = "/api/v1/signals/parse",
    request_body = SubmitSignalRequest,
    responses(
        (status = 202, description = "Signal queued for parsing", body = SubmitSignalResponse),
        (status = 400, description = "Invalid request or duplicate task id"),
        (status = 429, description = "Rate limit exceeded", body = crate::error::RateLimitErrorResponse),
        (status = 503, description = "Task queue full or processor stopped")
    ),
    tag = "Signals"
)]
pub async fn submit_signal(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SubmitSignalRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitSignalResponse>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    let task_id = state.tasks.submit(request.payload, request.task_id)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitSignalResponse {
            poll_url: format!("{}/{}", TASKS_PATH, task_id),
            task_id,
            status: TaskStatus::Queued,
        }),
    ))
}

/// Get the status and result of a parsing task.
#[utoipa::path(
    get,
    path = "/api/v1/signals/tasks/{task_id}",
    params(
        ("task_id" = String, Path, description = "Task identifier")
    ),
    responses(
        (status = 200, description = "Task status", body = TaskResult),
        (status = 404, description = "Task not found or expired")
    ),
    tag = "Signals"
)]
pub async fn get_task_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskResult>, ApiError> {
    state
        .tasks
        .get_status(&task_id)
        .map(Json)
        .ok_or(ApiError::TaskNotFound(task_id))
}

/// Get task processor statistics.
#[utoipa::path(
    get,
    path = "/api/v1/signals/stats",
    responses(
        (status = 200, description = "Task processor statistics", body = SignalStatsResponse)
    ),
    tag = "Signals"
)]
pub async fn get_signal_stats(State(state): State<Arc<AppState>>) -> Json<SignalStatsResponse> {
    let stats = state.tasks.stats();
    Json(SignalStatsResponse {
        queued: stats.counts.queued,
        processing: stats.counts.processing,
        completed: stats.counts.completed,
        failed: stats.counts.failed,
        queue_depth: stats.queue_depth,
        queue_capacity: stats.queue_capacity,
        running: stats.running,
        max_age_hours: state.tasks.max_age_hours(),
    })
}

// ============================================================================
// Rate Limit Administration
// ============================================================================

/// Get the active rate limit rules.
#[utoipa::path(
    get,
    path = "/api/v1/admin/rate-limits",
    responses(
        (status = 200, description = "Active rate limit rules", body = RateLimitRulesResponse)
    ),
    tag = "Admin"
)]
pub async fn get_rate_limits(State(state): State<Arc<AppState>>) -> Json<RateLimitRulesResponse> {
    Json(rate_limit_rules(&state))
}

/// Replace the rate limit route table.
///
/// The new table takes effect for the next request. Existing buckets keep
/// their counts.
#[utoipa::path(
    put,
    path = "/api/v1/admin/rate-limits",
    request_body = ReplaceRateLimitsRequest,
    responses(
        (status = 200, description = "Rules replaced", body = RateLimitRulesResponse),
        (status = 400, description = "Invalid rule or pattern")
    ),
    tag = "Admin"
)]
pub async fn replace_rate_limits(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ReplaceRateLimitsRequest>, JsonRejection>,
) -> Result<Json<RateLimitRulesResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

    let default = request
        .default_rule
        .map(|rule| rule.to_rule())
        .transpose()
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

    state.admission.rules().replace(default, &request.routes)?;
    info!(
        "Rate limit table replaced with {} route rules",
        request.routes.len()
    );

    Ok(Json(rate_limit_rules(&state)))
}
