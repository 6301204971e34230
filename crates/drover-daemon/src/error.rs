//! Error types for drover-daemon

use drover_scheduler::SchedulerError;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Scheduler service error
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// A background task ended abnormally
    #[error("Task failed: {0}")]
    Task(String),
}

impl From<config::ConfigError> for DaemonError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
