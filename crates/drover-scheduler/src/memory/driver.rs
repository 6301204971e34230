//! Driver that runs in-process without a cluster manager

use crate::driver::{DriverError, DriverFactory, DriverStatus, SchedulerDriver};
use drover_types::{FrameworkId, TaskId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct LocalState {
    status: DriverStatus,
    started: bool,
    stop_requested: bool,
    abort: Option<String>,
    killed: Vec<TaskId>,
}

/// Single-use driver handle whose loop parks until stopped or aborted
#[derive(Debug)]
pub struct LocalDriver {
    framework_id: Option<FrameworkId>,
    state: Mutex<LocalState>,
    wake: Condvar,
    runs: AtomicUsize,
    stops: AtomicUsize,
}

impl LocalDriver {
    pub fn new(framework_id: Option<FrameworkId>) -> Self {
        Self {
            framework_id,
            state: Mutex::new(LocalState {
                status: DriverStatus::NotStarted,
                started: false,
                stop_requested: false,
                abort: None,
                killed: Vec::new(),
            }),
            wake: Condvar::new(),
            runs: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn framework_id(&self) -> Option<&FrameworkId> {
        self.framework_id.as_ref()
    }

    pub fn status(&self) -> DriverStatus {
        self.lock().status
    }

    /// Number of times the loop was entered
    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::Acquire)
    }

    /// Number of stop requests received
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::Acquire)
    }

    /// Make the loop fail as if the cluster connection dropped
    pub fn abort(&self, reason: impl Into<String>) {
        let mut state = self.lock();
        state.abort = Some(reason.into());
        self.wake.notify_all();
    }

    /// Tasks killed through this handle, in request order
    pub fn killed_tasks(&self) -> Vec<TaskId> {
        self.lock().killed.clone()
    }

    fn lock(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SchedulerDriver for LocalDriver {
    fn run(&self) -> Result<DriverStatus, DriverError> {
        let mut state = self.lock();
        if state.started {
            return Err(DriverError::AlreadyRun);
        }
        state.started = true;
        self.runs.fetch_add(1, Ordering::AcqRel);

        if state.stop_requested {
            state.status = DriverStatus::Stopped;
            return Ok(DriverStatus::Stopped);
        }

        state.status = DriverStatus::Running;
        info!(framework_id = ?self.framework_id, "Local driver running");

        loop {
            if let Some(reason) = state.abort.take() {
                warn!(reason = %reason, "Local driver aborted");
                state.status = DriverStatus::Aborted;
                return Err(DriverError::Aborted(reason));
            }
            if state.stop_requested {
                debug!("Local driver stopped");
                state.status = DriverStatus::Stopped;
                return Ok(DriverStatus::Stopped);
            }
            state = self
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn stop(&self, failover: bool) -> DriverStatus {
        self.stops.fetch_add(1, Ordering::AcqRel);
        let mut state = self.lock();
        debug!(failover, "Local driver stop requested");
        state.stop_requested = true;
        if state.status == DriverStatus::NotStarted {
            state.status = DriverStatus::Stopped;
        }
        self.wake.notify_all();
        state.status
    }

    fn kill_task(&self, task_id: &TaskId) -> Result<DriverStatus, DriverError> {
        let mut state = self.lock();
        if state.status != DriverStatus::Running {
            return Err(DriverError::NotRunning);
        }
        info!(task_id = %task_id, "Killing task");
        state.killed.push(task_id.clone());
        Ok(DriverStatus::Running)
    }
}

/// Hands out [`LocalDriver`]s and remembers every one it created
#[derive(Debug, Default)]
pub struct LocalDriverFactory {
    drivers: Mutex<Vec<Arc<LocalDriver>>>,
}

impl LocalDriverFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// All handles created so far, oldest first
    pub fn drivers(&self) -> Vec<Arc<LocalDriver>> {
        self.lock().clone()
    }

    pub fn latest(&self) -> Option<Arc<LocalDriver>> {
        self.lock().last().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<LocalDriver>>> {
        self.drivers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DriverFactory for LocalDriverFactory {
    fn create(&self, framework_id: Option<&FrameworkId>) -> Arc<dyn SchedulerDriver> {
        let driver = Arc::new(LocalDriver::new(framework_id.cloned()));
        self.lock().push(driver.clone());
        driver
    }
}
