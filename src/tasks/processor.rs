//! Asynchronous task processor: a bounded queue drained by a single worker.

use super::cache::{ResultCache, TaskCounts};
use super::model::{Task, TaskResult};
use super::parser::SignalParser;
use crate::clock::{Clock, SystemClock};
use crate::config::TaskConfig;
use chrono::Duration as TimeDelta;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Error recorded on tasks that were still queued when the processor stopped.
pub const SHUTDOWN_ERROR: &str = "task processor shut down before the task started";

/// Error recorded on a task whose parser outlived the shutdown timeout.
pub const ABANDONED_ERROR: &str = "task processor shut down while the task was running";

/// Reasons a submission is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The queue is at capacity.
    #[error("task queue is full (capacity {capacity})")]
    QueueFull {
        /// Queue capacity.
        capacity: usize,
    },
    /// The processor has been stopped.
    #[error("task processor is stopped")]
    Stopped,
    /// A caller-supplied id is already in use.
    #[error("task id already exists: {0}")]
    Duplicate(String),
    /// A caller-supplied id is blank.
    #[error("task id must not be empty")]
    InvalidId,
}

/// Snapshot of processor activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStats {
    /// Results by status.
    pub counts: TaskCounts,
    /// Tasks waiting in the channel.
    pub queue_depth: usize,
    /// Channel capacity.
    pub queue_capacity: usize,
    /// Whether the worker loop is running.
    pub running: bool,
}

/// State shared between the processor handle and its worker loop.
struct Worker {
    results: Arc<ResultCache>,
    parser: Arc<dyn SignalParser>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    cleanup_interval: Duration,
    max_age_hours: u64,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<Task>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Task processor started (poll interval {:?}, cleanup every {:?})",
            self.poll_interval, self.cleanup_interval
        );

        let mut cleanup_timer = interval_at(
            Instant::now() + self.cleanup_interval,
            self.cleanup_interval,
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Processor handle dropped without stop().
                        break;
                    }
                }
                _ = cleanup_timer.tick() => {
                    cleanup(&self.results, self.clock.as_ref(), self.max_age_hours);
                }
                received = timeout(self.poll_interval, rx.recv()) => match received {
                    Ok(Some(task)) => self.process(task).await,
                    Ok(None) => break,
                    Err(_) => {}
                },
            }
        }

        drain(&mut rx, &self.results, self.clock.as_ref());
        info!("Task processor stopped");
    }

    async fn process(&self, task: Task) {
        let Task { task_id, payload, .. } = task;

        if !self.results.mark_processing(&task_id, self.clock.now()) {
            warn!("Skipping task {}: no queued result entry", task_id);
            return;
        }
        debug!("Processing task {}", task_id);

        let parser = Arc::clone(&self.parser);
        let outcome = AssertUnwindSafe(async move { parser.parse(payload).await })
            .catch_unwind()
            .await;
        let finished = self.clock.now();

        match outcome {
            Ok(Ok(result)) => {
                self.results.mark_completed(&task_id, result, finished);
                debug!("Task {} completed", task_id);
            }
            Ok(Err(e)) => {
                warn!("Task {} failed: {}", task_id, e);
                self.results.mark_failed(&task_id, e.to_string(), finished);
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                error!("Task {} panicked in parser: {}", task_id, message);
                self.results
                    .mark_failed(&task_id, format!("parser panicked: {}", message), finished);
            }
        }
    }
}

/// Decoupled executor for signal parsing requests.
///
/// Producers call [`TaskProcessor::submit`] and poll
/// [`TaskProcessor::get_status`]; one worker loop started by
/// [`TaskProcessor::start`] is the only consumer of the queue and the only
/// writer of task results.
pub struct TaskProcessor {
    sender: mpsc::Sender<Task>,
    receiver: Mutex<Option<mpsc::Receiver<Task>>>,
    results: Arc<ResultCache>,
    parser: Arc<dyn SignalParser>,
    clock: Arc<dyn Clock>,
    config: TaskConfig,
    capacity: usize,
    accepting: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TaskProcessor {
    /// Creates a stopped processor using the system clock.
    #[must_use]
    pub fn new(config: &TaskConfig, parser: Arc<dyn SignalParser>) -> Self {
        Self::with_clock(config, parser, Arc::new(SystemClock::new()))
    }

    /// Creates a stopped processor reading time from `clock`.
    #[must_use]
    pub fn with_clock(
        config: &TaskConfig,
        parser: Arc<dyn SignalParser>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            results: Arc::new(ResultCache::new()),
            parser,
            clock,
            config: config.clone(),
            capacity,
            accepting: AtomicBool::new(true),
            shutdown_tx,
            worker: Mutex::new(None),
        }
    }

    /// Spawns the worker loop on the current tokio runtime.
    ///
    /// Returns `false` if the loop was already started or the processor was stopped.
    pub fn start(&self) -> bool {
        let Some(rx) = self.receiver.lock().take() else {
            return false;
        };

        let worker = Worker {
            results: Arc::clone(&self.results),
            parser: Arc::clone(&self.parser),
            clock: Arc::clone(&self.clock),
            poll_interval: Duration::from_millis(self.config.poll_interval_ms.max(1)),
            cleanup_interval: Duration::from_secs(self.config.cleanup_interval_secs.max(1)),
            max_age_hours: self.config.max_age_hours,
        };
        let handle = tokio::spawn(worker.run(rx, self.shutdown_tx.subscribe()));
        *self.worker.lock() = Some(handle);
        true
    }

    /// Stops accepting tasks, lets the task in flight finish, then marks every
    /// task still queued as failed.
    ///
    /// The task in flight gets `shutdown_timeout_secs` to finish. Past that
    /// the worker is aborted and the task is failed with [`ABANDONED_ERROR`].
    pub async fn stop(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);

        let handle = self.worker.lock().take();
        if let Some(mut handle) = handle {
            let deadline = Duration::from_secs(self.config.shutdown_timeout_secs.max(1));
            match timeout(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Task processor worker ended abnormally: {}", e),
                Err(_) => {
                    handle.abort();
                    error!(
                        "Task processor worker did not stop within {:?}, aborted",
                        deadline
                    );
                }
            }
        }

        // Never started: nothing consumed the queue.
        let rx = self.receiver.lock().take();
        if let Some(mut rx) = rx {
            drain(&mut rx, &self.results, self.clock.as_ref());
        }

        // Left behind by an aborted or crashed worker.
        let abandoned = self
            .results
            .fail_unfinished(SHUTDOWN_ERROR, ABANDONED_ERROR, self.clock.now());
        if abandoned > 0 {
            warn!("Marked {} unfinished tasks as failed after shutdown", abandoned);
        }
    }

    /// Enqueues a payload and returns its task id.
    ///
    /// The queued result exists before this returns, so an immediate poll
    /// never reports "not found". Never blocks: a full queue is rejected.
    ///
    /// # Errors
    /// Returns error if the queue is full, the processor is stopped, or a
    /// caller-supplied id is blank or already used.
    pub fn submit(&self, payload: Value, task_id: Option<String>) -> Result<String, SubmitError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(SubmitError::Stopped);
        }

        let task_id = match task_id {
            Some(id) if id.trim().is_empty() => return Err(SubmitError::InvalidId),
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        let task = Task {
            task_id: task_id.clone(),
            payload,
            submitted_at: self.clock.now(),
        };

        if !self.results.insert_queued(&task) {
            return Err(SubmitError::Duplicate(task_id));
        }

        match self.sender.try_send(task) {
            Ok(()) => {
                debug!("Task {} queued", task_id);
                Ok(task_id)
            }
            Err(TrySendError::Full(_)) => {
                self.results.remove(&task_id);
                warn!("Rejected task {}: queue full", task_id);
                Err(SubmitError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(_)) => {
                self.results.remove(&task_id);
                Err(SubmitError::Stopped)
            }
        }
    }

    /// Returns the current result for `task_id`.
    #[must_use]
    pub fn get_status(&self, task_id: &str) -> Option<TaskResult> {
        self.results.get(task_id)
    }

    /// Removes results older than `max_age_hours` and any with corrupt
    /// timestamps. Returns the number removed.
    pub fn cleanup(&self, max_age_hours: u64) -> usize {
        cleanup(&self.results, self.clock.as_ref(), max_age_hours)
    }

    /// Snapshot of queue and result counts.
    #[must_use]
    pub fn stats(&self) -> TaskStats {
        TaskStats {
            counts: self.results.counts(),
            queue_depth: self.capacity.saturating_sub(self.sender.capacity()),
            queue_capacity: self.capacity,
            running: self.is_running(),
        }
    }

    /// Whether the worker loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Configured result retention in hours.
    #[must_use]
    pub fn max_age_hours(&self) -> u64 {
        self.config.max_age_hours
    }
}

fn cleanup(results: &ResultCache, clock: &dyn Clock, max_age_hours: u64) -> usize {
    let cutoff = i64::try_from(max_age_hours)
        .ok()
        .and_then(TimeDelta::try_hours)
        .and_then(|age| clock.now().checked_sub_signed(age));
    let removed = results.purge(cutoff);
    if removed > 0 {
        info!(
            "Cleaned up {} task results older than {}h",
            removed, max_age_hours
        );
    }
    removed
}

fn drain(rx: &mut mpsc::Receiver<Task>, results: &ResultCache, clock: &dyn Clock) {
    rx.close();
    let mut abandoned = 0usize;
    while let Ok(task) = rx.try_recv() {
        results.mark_failed(&task.task_id, SHUTDOWN_ERROR.to_string(), clock.now());
        abandoned += 1;
    }
    if abandoned > 0 {
        warn!(
            "Marked {} queued tasks as failed during shutdown",
            abandoned
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
