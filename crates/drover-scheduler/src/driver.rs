//! Cluster driver handles and their lifecycle
//!
//! A driver handle is the connection to the cluster manager. Its `run` loop
//! blocks for as long as the connection lives, and a handle that has been
//! stopped can never be run again. The [`DriverLifecycleManager`] owns the
//! one current handle and replaces it with a fresh one on every stop.

use drover_types::{FrameworkId, TaskId};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

/// Status reported by a driver handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    NotStarted,
    Running,
    Aborted,
    Stopped,
}

/// Driver errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("Driver generation {generation} already started")]
    AlreadyStarted { generation: u64 },

    #[error("Driver handle has already been run")]
    AlreadyRun,

    #[error("Driver not running")]
    NotRunning,

    #[error("Driver aborted: {0}")]
    Aborted(String),

    #[error("Failed to kill task {task_id}: {reason}")]
    KillFailed { task_id: TaskId, reason: String },
}

/// Connection to the resource-offering cluster manager.
///
/// `run` blocks the calling thread. `stop` and `kill_task` only enqueue a
/// request and must return promptly.
pub trait SchedulerDriver: Send + Sync {
    /// Run the driver loop until it is stopped or aborted
    fn run(&self) -> Result<DriverStatus, DriverError>;

    /// Ask the loop to exit; with `failover` the cluster manager keeps this
    /// framework's tasks running for the next leader
    fn stop(&self, failover: bool) -> DriverStatus;

    /// Ask the cluster manager to kill a task
    fn kill_task(&self, task_id: &TaskId) -> Result<DriverStatus, DriverError>;
}

/// Creates fresh driver handles
pub trait DriverFactory: Send + Sync {
    fn create(&self, framework_id: Option<&FrameworkId>) -> Arc<dyn SchedulerDriver>;
}

/// How a driver run loop ended
#[derive(Debug, Clone)]
pub struct DriverExit {
    /// Generation of the handle whose loop exited
    pub generation: u64,
    pub outcome: Result<DriverStatus, String>,
}

struct DriverSlot {
    handle: Arc<dyn SchedulerDriver>,
    generation: u64,
    /// Present once the handle was started; flips to `true` when its loop exits
    exited: Option<watch::Receiver<bool>>,
}

/// Owner of the single current driver handle
pub struct DriverLifecycleManager {
    factory: Arc<dyn DriverFactory>,
    framework_id: Option<FrameworkId>,
    slot: Mutex<DriverSlot>,
    /// Mirror of `slot.generation` readable without the lock
    generation: AtomicU64,
}

impl DriverLifecycleManager {
    pub fn new(factory: Arc<dyn DriverFactory>, framework_id: Option<FrameworkId>) -> Self {
        let handle = factory.create(framework_id.as_ref());
        Self {
            factory,
            framework_id,
            slot: Mutex::new(DriverSlot {
                handle,
                generation: 0,
                exited: None,
            }),
            generation: AtomicU64::new(0),
        }
    }

    pub fn framework_id(&self) -> Option<&FrameworkId> {
        self.framework_id.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Whether the current handle's loop has been started and not yet exited
    pub async fn is_running(&self) -> bool {
        let slot = self.slot.lock().await;
        slot.exited.as_ref().is_some_and(|rx| !*rx.borrow())
    }

    /// Launch the current handle's blocking loop on a background thread.
    ///
    /// `on_exit` runs once the loop has returned, panicked or failed. A
    /// handle is never started twice.
    #[instrument(skip(self, on_exit))]
    pub async fn start<F, Fut>(&self, on_exit: F) -> Result<u64, DriverError>
    where
        F: FnOnce(DriverExit) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock().await;
        if slot.exited.is_some() {
            return Err(DriverError::AlreadyStarted {
                generation: slot.generation,
            });
        }

        let (exited_tx, exited_rx) = watch::channel(false);
        slot.exited = Some(exited_rx);

        let handle = slot.handle.clone();
        let generation = slot.generation;

        info!(generation, "Running driver");

        tokio::spawn(async move {
            let outcome = match tokio::task::spawn_blocking(move || handle.run()).await {
                Ok(Ok(status)) => {
                    info!(generation, ?status, "Driver loop exited");
                    Ok(status)
                }
                Ok(Err(e)) => {
                    error!(generation, error = %e, "Driver loop failed");
                    Err(e.to_string())
                }
                Err(join_error) => {
                    error!(generation, error = %join_error, "Driver loop panicked");
                    Err(format!("driver loop panicked: {}", join_error))
                }
            };

            let _ = exited_tx.send(true);
            on_exit(DriverExit {
                generation,
                outcome,
            })
            .await;
        });

        Ok(generation)
    }

    /// Stop the current handle with failover and install a fresh one.
    ///
    /// Returns only after a started loop has exited. Calling this on a handle
    /// that was never started just replaces it.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let mut slot = self.slot.lock().await;

        match slot.exited.take() {
            Some(mut exited) => {
                let status = slot.handle.stop(true);
                info!(generation = slot.generation, ?status, "Stopping driver");
                if exited.wait_for(|done| *done).await.is_err() {
                    warn!(generation = slot.generation, "Driver loop vanished while stopping");
                }
            }
            None => {
                debug!(generation = slot.generation, "Driver was never started");
            }
        }

        slot.handle = self.factory.create(self.framework_id.as_ref());
        slot.generation += 1;
        self.generation.store(slot.generation, Ordering::Release);

        debug!(generation = slot.generation, "Installed fresh driver handle");
    }

    /// Forward a kill request to the current handle
    pub async fn kill_task(&self, task_id: &TaskId) -> Result<DriverStatus, DriverError> {
        let handle = self.slot.lock().await.handle.clone();
        handle.kill_task(task_id)
    }
}
