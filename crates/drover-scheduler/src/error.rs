//! Error types for the scheduler control plane

use crate::backend::BackendError;
use crate::driver::DriverError;
use crate::repository::RepositoryError;
use crate::service::ServiceState;
use drover_types::{AppId, TypesError};
use std::time::Duration;
use thiserror::Error;

/// Scheduler error type
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Bounded command got no reply in time
    #[error("Command {command} timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    /// Bounded command answered with a failure
    #[error("Command {command} rejected: {reason}")]
    CommandRejected { command: String, reason: String },

    /// Long-running operation completed with a failure
    #[error("Deployment failed: {0}")]
    DeploymentFailed(String),

    /// A reply channel received a message that is not valid for it
    #[error("Protocol violation: unexpected {message} reply to {command}")]
    UnexpectedMessage { command: String, message: String },

    /// The actor dropped a reply channel without answering
    #[error("Reply for {0} abandoned by the command actor")]
    CompletionAbandoned(String),

    #[error("Command actor unavailable: {0}")]
    ActorUnavailable(String),

    #[error("Port range [{min}, {max}) exhausted: {used} ports in use, {requested} requested")]
    PortRangeExhausted {
        min: u32,
        max: u32,
        used: usize,
        requested: usize,
    },

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Election backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Invalid application: {0}")]
    InvalidApp(#[from] TypesError),

    #[error("App not found: {0}")]
    AppNotFound(AppId),

    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: ServiceState, to: ServiceState },

    /// Service components are built by `start_up`
    #[error("Not initialized")]
    NotInitialized,

    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::CommandTimeout { .. } | Self::ActorUnavailable(_) | Self::Backend(_)
        )
    }
}
