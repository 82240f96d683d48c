//! Request and response types for the gateway API.

use serde::{Deserialize, Serialize};
use serde_json::Value;


// ============================================================================
// Health
// ============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

// ============================================================================
// Signals
// ============================================================================

/// Lifecycle state of a parsing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting in the queue.
    Queued,
    /// Picked up by the worker.
    Processing,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl TaskStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Request to parse a signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitSignalRequest {
    /// Optional caller-chosen task id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Signal payload.
    pub payload: Value,
}

/// Response for an accepted signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitSignalResponse {
    /// Task identifier to poll.
    pub task_id: String,
    /// Status at submission time.
    pub status: TaskStatus,
    /// Path at which the task can be polled.
    pub poll_url: String,
}

/// Current or final state of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Task identifier.
    pub task_id: String,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Submission time (RFC 3339).
    pub submitted_at: String,
    /// Time the worker picked the task up.
    #[serde(default)]
    pub started_at: Option<String>,
    /// Time the task finished.
    #[serde(default)]
    pub completed_at: Option<String>,
    /// Parser output.
    #[serde(default)]
    pub result: Option<Value>,
    /// Failure description.
    #[serde(default)]
    pub error: Option<String>,
    /// Whether the task succeeded.
    #[serde(default)]
    pub success: Option<bool>,
}

/// Task processor statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalStatsResponse {
    /// Tasks waiting to be processed.
    pub queued: usize,
    /// Tasks being processed.
    pub processing: usize,
    /// Tasks completed successfully.
    pub completed: usize,
    /// Tasks that failed.
    pub failed: usize,
    /// Tasks buffered in the queue.
    pub queue_depth: usize,
    /// Queue capacity.
    pub queue_capacity: usize,
    /// Whether the worker is running.
    pub running: bool,
    /// Result retention in hours.
    pub max_age_hours: u64,
}

// ============================================================================
// Rate Limits
// ============================================================================

/// A rate limit rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_seconds: u64,
    /// Burst allowance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,
}

/// A route pattern bound to a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRuleConfig {
    /// Path pattern.
    pub pattern: String,
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_seconds: u64,
    /// Burst allowance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<u32>,
}

impl RouteRuleConfig {
    /// Creates a route rule without an explicit burst.
    #[must_use]
    pub fn new(pattern: &str, max_requests: u32, window_seconds: u64) -> Self {
        Self {
            pattern: pattern.to_string(),
            max_requests,
            window_seconds,
            burst: None,
        }
    }
}

/// Active rate limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRulesResponse {
    /// Whether rate limiting is enabled.
    pub enabled: bool,
    /// Rule applied when no route matches.
    pub default_rule: RuleConfig,
    /// Per-route rules.
    pub routes: Vec<RouteRuleConfig>,
    /// Number of tracked buckets.
    pub tracked_buckets: usize,
}

/// Request to replace the rule table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceRateLimitsRequest {
    /// New default rule, if it should change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_rule: Option<RuleConfig>,
    /// Complete new route table.
    pub routes: Vec<RouteRuleConfig>,
}

/// Body of a 429 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitErrorResponse {
    /// Error kind.
    pub error: String,
    /// Human-readable explanation.
    pub message: String,
    /// Seconds until the client may retry.
    pub retry_after: u64,
}
