//! Request and response models for the REST API.

use crate::config::{RouteRuleConfig, RuleConfig};
use crate::tasks::TaskStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Request to parse a trading signal asynchronously.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SubmitSignalRequest {
    /// Optional caller-chosen task id; generated when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Opaque payload handed to the signal parser.
    #[schema(value_type = Object)]
    pub payload: Value,
}

/// Response for an accepted signal parsing request.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SubmitSignalResponse {
    /// Task identifier to poll.
    pub task_id: String,
    /// Status at submission time (always `queued`).
    pub status: TaskStatus,
    /// Path at which the task status can be polled.
    pub poll_url: String,
}

/// Task processor statistics.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SignalStatsResponse {
    /// Tasks waiting to be processed.
    pub queued: usize,
    /// Tasks being processed.
    pub processing: usize,
    /// Tasks completed successfully.
    pub completed: usize,
    /// Tasks that failed.
    pub failed: usize,
    /// Tasks currently buffered in the queue.
    pub queue_depth: usize,
    /// Queue capacity.
    pub queue_capacity: usize,
    /// Whether the worker loop is running.
    pub running: bool,
    /// Result retention in hours.
    pub max_age_hours: u64,
}

/// Current admission control configuration.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct RateLimitRulesResponse {
    /// Whether rate limiting is enabled.
    pub enabled: bool,
    /// Rule applied when no route matches.
    pub default_rule: RuleConfig,
    /// Per-route rules, ordered by pattern.
    pub routes: Vec<RouteRuleConfig>,
    /// Number of rate limit buckets being tracked.
    pub tracked_buckets: usize,
}

/// Request to replace the route rule table.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ReplaceRateLimitsRequest {
    /// New default rule; the current one is kept when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_rule: Option<RuleConfig>,
    /// Complete new route table.
    pub routes: Vec<RouteRuleConfig>,
}
