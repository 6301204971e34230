//! Coordination backend for leader election
//!
//! The backend decides which of several candidates leads. It calls back into
//! the candidate from its own context, at most once per election cycle.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Election backend errors
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Candidacy registration failed: {0}")]
    Registration(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Receives the outcome of an election
#[async_trait]
pub trait Candidate: Send + Sync {
    /// Address advertised to the other candidates
    fn advertised_address(&self) -> String;

    /// This candidate won; `abdication` gives the leadership back.
    ///
    /// Must not wait for `abdication` to complete.
    async fn on_elected(&self, abdication: Arc<dyn Abdication>);

    /// This candidate lost or gave up leadership
    async fn on_defeated(&self);
}

/// Handle for giving up leadership voluntarily.
///
/// Abdicating makes the backend call `on_defeated` on the leader.
#[async_trait]
pub trait Abdication: Send + Sync {
    async fn abdicate(&self);
}

/// Coordination service that runs the election
#[async_trait]
pub trait CoordinationBackend: Send + Sync {
    /// Register a candidate; returns without waiting for the election
    async fn offer_leadership(&self, candidate: Arc<dyn Candidate>) -> Result<(), BackendError>;

    /// Advertised address of the current leader, if known
    async fn leader_data(&self) -> Option<String>;
}
