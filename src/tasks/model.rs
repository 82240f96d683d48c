//! Task and task result types.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Lifecycle state of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
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

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    #[must_use]
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Processing)
                | (Self::Queued, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
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

/// A unit of signal-parsing work.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    /// Unique task identifier.
    pub task_id: String,
    /// Opaque request handed to the parser.
    pub payload: Value,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
}

/// Current or final state of a task as seen by pollers.
///
/// Timestamps are RFC 3339 strings, the form in which they are served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TaskResult {
    /// Task identifier.
    pub task_id: String,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Submission time.
    pub submitted_at: String,
    /// Time the worker picked the task up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// Time the task reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Parser output, set on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub result: Option<Value>,
    /// Failure description, set on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the task succeeded, set once terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl TaskResult {
    /// A freshly queued result for `task`.
    #[must_use]
    pub fn queued(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            status: TaskStatus::Queued,
            submitted_at: format_timestamp(task.submitted_at),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            success: None,
        }
    }

    /// Parses the submission timestamp.
    #[must_use]
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.submitted_at)
    }
}

/// Formats a timestamp the way task results carry it.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses a task result timestamp.
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_transitions_are_monotonic() {
        use TaskStatus::*;
        assert!(Queued.can_transition_to(Processing));
        assert!(Queued.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Queued.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Queued));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Processing));
        assert!(Completed.is_terminal() && Failed.is_terminal());
        assert!(!Queued.is_terminal() && !Processing.is_terminal());
    }

    #[test]
    fn test_queued_result_serialization() {
        let task = Task {
            task_id: "t-1".to_string(),
            payload: serde_json::json!({"text": "BUY BTC 65000"}),
            submitted_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        };
        let result = TaskResult::queued(&task);

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"task_id\":\"t-1\""));
        assert!(json.contains("\"status\":\"queued\""));
        assert!(json.contains("\"submitted_at\":\"2024-01-02T03:04:05.000Z\""));
        assert!(!json.contains("started_at"));
        assert!(!json.contains("success"));
    }

    #[test]
    fn test_timestamp_round_trip_and_corruption() {
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(at)), Some(at));
        assert_eq!(parse_timestamp("not-a-date"), None);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TaskStatus::Processing.to_string(), "processing");
        assert_eq!(TaskStatus::Failed.to_string(), "failed");
    }
}
