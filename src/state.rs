//! Application state management.

use crate::config::{Config, ConfigError};
use crate::ratelimit::AdmissionController;
use crate::tasks::{SignalParser, TaskProcessor};
use std::sync::Arc;
use tracing::info;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Admission controller guarding every request.
    pub admission: Arc<AdmissionController>,
    /// Asynchronous signal parsing processor.
    pub tasks: Arc<TaskProcessor>,
    /// Application configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates the application state from configuration.
    ///
    /// The task processor is created stopped; call [`AppState::start`] from
    /// within a tokio runtime to spawn its worker.
    ///
    /// # Errors
    /// Returns error if the rate limit configuration is invalid.
    pub fn from_config(config: Config, parser: Arc<dyn SignalParser>) -> Result<Self, ConfigError> {
        let admission = Arc::new(AdmissionController::new(&config.rate_limit)?);
        let tasks = Arc::new(TaskProcessor::new(&config.tasks, parser));

        info!(
            "Admission control {} with {} route rules",
            if admission.is_enabled() {
                "enabled"
            } else {
                "disabled"
            },
            config.rate_limit.routes.len()
        );

        Ok(Self {
            admission,
            tasks,
            config: Arc::new(config),
        })
    }

    /// Creates the application state from already-built components.
    #[must_use]
    pub fn with_components(
        config: Config,
        admission: Arc<AdmissionController>,
        tasks: Arc<TaskProcessor>,
    ) -> Self {
        Self {
            admission,
            tasks,
            config: Arc::new(config),
        }
    }

    /// Starts background workers.
    pub fn start(&self) {
        self.tasks.start();
    }

    /// Stops background workers, failing any task that never started.
    pub async fn shutdown(&self) {
        self.tasks.stop().await;
    }
}
