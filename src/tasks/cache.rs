//! Result cache mapping task ids to their current status.

use super::model::{Task, TaskResult, TaskStatus, format_timestamp};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tracing::debug;

/// Number of results in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    /// Queued results.
    pub queued: usize,
    /// Processing results.
    pub processing: usize,
    /// Completed results.
    pub completed: usize,
    /// Failed results.
    pub failed: usize,
}

/// Task results keyed by task id.
///
/// Only the task processor writes; every transition is checked against the
/// lifecycle so a result never moves backwards.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: DashMap<String, TaskResult>,
}

impl ResultCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Inserts a queued result for `task`. Returns `false` if the id is taken.
    pub(crate) fn insert_queued(&self, task: &Task) -> bool {
        match self.entries.entry(task.task_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(TaskResult::queued(task));
                true
            }
        }
    }

    pub(crate) fn remove(&self, task_id: &str) {
        self.entries.remove(task_id);
    }

    /// Returns a snapshot of the result for `task_id`.
    #[must_use]
    pub fn get(&self, task_id: &str) -> Option<TaskResult> {
        self.entries.get(task_id).map(|r| r.clone())
    }

    pub(crate) fn mark_processing(&self, task_id: &str, at: DateTime<Utc>) -> bool {
        self.transition(task_id, TaskStatus::Processing, |r| {
            r.started_at = Some(format_timestamp(at));
        })
    }

    pub(crate) fn mark_completed(&self, task_id: &str, result: Value, at: DateTime<Utc>) -> bool {
        self.transition(task_id, TaskStatus::Completed, |r| {
            r.completed_at = Some(format_timestamp(at));
            r.result = Some(result);
            r.success = Some(true);
        })
    }

    pub(crate) fn mark_failed(&self, task_id: &str, error: String, at: DateTime<Utc>) -> bool {
        self.transition(task_id, TaskStatus::Failed, |r| {
            r.completed_at = Some(format_timestamp(at));
            r.error = Some(error);
            r.success = Some(false);
        })
    }

    /// Fails every result that has not finished: queued ones with
    /// `queued_error`, processing ones with `processing_error`. Returns the
    /// number failed.
    pub(crate) fn fail_unfinished(
        &self,
        queued_error: &str,
        processing_error: &str,
        at: DateTime<Utc>,
    ) -> usize {
        let mut failed = 0;
        for mut entry in self.entries.iter_mut() {
            let error = match entry.status {
                TaskStatus::Queued => queued_error,
                TaskStatus::Processing => processing_error,
                TaskStatus::Completed | TaskStatus::Failed => continue,
            };
            let result = entry.value_mut();
            result.status = TaskStatus::Failed;
            result.completed_at = Some(format_timestamp(at));
            result.error = Some(error.to_string());
            result.success = Some(false);
            failed += 1;
        }
        failed
    }

    fn transition(
        &self,
        task_id: &str,
        next: TaskStatus,
        apply: impl FnOnce(&mut TaskResult),
    ) -> bool {
        let Some(mut entry) = self.entries.get_mut(task_id) else {
            debug!("Task {} vanished before moving to {}", task_id, next);
            return false;
        };
        if !entry.status.can_transition_to(next) {
            debug!(
                "Ignoring transition of task {} from {} to {}",
                task_id, entry.status, next
            );
            return false;
        }
        entry.status = next;
        apply(entry.value_mut());
        true
    }

    /// Removes results submitted at or before `cutoff`, and any whose
    /// submission time cannot be parsed. A `cutoff` of `None` removes only
    /// the unparseable ones. Returns the number removed.
    pub fn purge(&self, cutoff: Option<DateTime<Utc>>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, result| match result.submitted_at() {
            Some(submitted) => cutoff.is_none_or(|cutoff| submitted > cutoff),
            None => false,
        });
        before.saturating_sub(self.entries.len())
    }

    /// Counts results by status.
    #[must_use]
    pub fn counts(&self) -> TaskCounts {
        let mut counts = TaskCounts::default();
        for entry in self.entries.iter() {
            match entry.status {
                TaskStatus::Queued => counts.queued += 1,
                TaskStatus::Processing => counts.processing += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Number of results held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
