//! Scheduler service lifecycle
//!
//! `start_up` wires the components, `run` enters the election and parks
//! until `trigger_shutdown` releases it. A service runs once; after shutdown
//! it stays terminated.

use crate::actor::CommandActor;
use crate::backend::CoordinationBackend;
use crate::config::SchedulerConfig;
use crate::coordinator::DeploymentCoordinator;
use crate::driver::{DriverFactory, DriverLifecycleManager};
use crate::elector::LeaderElector;
use crate::error::{Result, SchedulerError};
use crate::health::HealthCheckManager;
use crate::leadership::Leadership;
use crate::ports::PortAllocator;
use crate::reconciliation::ReconciliationScheduler;
use crate::repository::{AppRepository, FrameworkIdStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Lifecycle state of a [`SchedulerService`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    ShuttingDown,
    /// Stopped after a shutdown; cannot be started again
    Terminated,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Collaborators supplied from outside the crate
pub(crate) struct Collaborators {
    pub driver_factory: Arc<dyn DriverFactory>,
    pub actor: Arc<dyn CommandActor>,
    pub repository: Arc<dyn AppRepository>,
    pub health: Arc<dyn HealthCheckManager>,
    pub framework_ids: Arc<dyn FrameworkIdStore>,
    pub backend: Option<Arc<dyn CoordinationBackend>>,
}

struct Components {
    elector: Arc<LeaderElector>,
    coordinator: Arc<DeploymentCoordinator>,
    reconciliation: ReconciliationScheduler,
}

/// Leader-elected scheduler control plane
pub struct SchedulerService {
    config: SchedulerConfig,
    collaborators: Collaborators,
    leadership: Arc<Leadership>,
    state: Mutex<ServiceState>,
    components: OnceLock<Components>,
    /// Cancelled when shutdown begins; stops re-offers
    shutdown: CancellationToken,
    /// Released once shutdown has finished
    gate: CancellationToken,
}

impl SchedulerService {
    pub(crate) fn new(config: SchedulerConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            leadership: Arc::new(Leadership::new()),
            state: Mutex::new(ServiceState::Stopped),
            components: OnceLock::new(),
            shutdown: CancellationToken::new(),
            gate: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_leader(&self) -> bool {
        self.leadership.is_leader()
    }

    pub fn coordinator(&self) -> Result<Arc<DeploymentCoordinator>> {
        Ok(self.components()?.coordinator.clone())
    }

    pub fn elector(&self) -> Result<Arc<LeaderElector>> {
        Ok(self.components()?.elector.clone())
    }

    /// Load the framework id and build the components
    #[instrument(skip(self))]
    pub async fn start_up(&self) -> Result<()> {
        self.transition(ServiceState::Stopped, ServiceState::Starting)?;

        let framework_id = match self.collaborators.framework_ids.fetch().await {
            Ok(id) => id,
            Err(e) => {
                self.set_state(ServiceState::Stopped);
                return Err(e.into());
            }
        };
        match &framework_id {
            Some(id) => info!(framework_id = %id, "Loaded framework id"),
            None => info!("No framework id stored, registering as a new framework"),
        }

        let c = &self.collaborators;
        let backend = if self.config.ha {
            c.backend.clone()
        } else {
            None
        };

        let driver = Arc::new(DriverLifecycleManager::new(
            c.driver_factory.clone(),
            framework_id,
        ));
        let elector = LeaderElector::new(
            &self.config,
            self.leadership.clone(),
            driver.clone(),
            backend,
            c.repository.clone(),
            c.health.clone(),
            self.shutdown.clone(),
        );
        let coordinator = Arc::new(DeploymentCoordinator::new(
            c.actor.clone(),
            driver,
            c.repository.clone(),
            PortAllocator::new(&self.config, c.repository.clone()),
            self.config.command_timeout(),
        ));
        let reconciliation = ReconciliationScheduler::new(
            self.config.reconciliation_initial_delay(),
            self.config.reconciliation_interval(),
            self.leadership.clone(),
            c.actor.clone(),
        );

        let components = Components {
            elector,
            coordinator,
            reconciliation,
        };
        if self.components.set(components).is_err() {
            warn!("Components already built");
        }

        info!("Scheduler service started up");
        Ok(())
    }

    /// Enter the election, start reconciliation and wait for shutdown
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<()> {
        self.transition(ServiceState::Starting, ServiceState::Running)?;
        let components = self.components()?;

        components.elector.offer_leadership().await;
        components.reconciliation.start();

        info!(address = %self.config.advertised_address(), "Scheduler service running");
        self.gate.cancelled().await;
        info!("Scheduler service finished");
        Ok(())
    }

    /// Drop leadership, stop the driver and the timer, then release `run`
    #[instrument(skip(self))]
    pub async fn trigger_shutdown(&self) -> Result<()> {
        self.transition(ServiceState::Running, ServiceState::ShuttingDown)?;
        info!("Shutdown triggered");

        self.shutdown.cancel();
        if let Ok(components) = self.components() {
            components.elector.relinquish().await;
            components.reconciliation.stop();
        }
        self.gate.cancel();

        self.set_state(ServiceState::Terminated);
        Ok(())
    }

    fn components(&self) -> Result<&Components> {
        self.components.get().ok_or(SchedulerError::NotInitialized)
    }

    fn transition(&self, from: ServiceState, to: ServiceState) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != from {
            return Err(SchedulerError::InvalidTransition { from: *state, to });
        }
        *state = to;
        Ok(())
    }

    fn set_state(&self, to: ServiceState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::MailboxActor;
    use crate::builder::SchedulerServiceBuilder;
    use crate::memory::{
        InMemoryAppRepository, InMemoryFrameworkIdStore, InMemoryHealthCheckManager,
        LocalDriverFactory,
    };
    use crate::repository::{RepositoryError, RepositoryResult};
    use async_trait::async_trait;
    use drover_types::FrameworkId;
    use std::time::Duration;

    struct BrokenStore;

    #[async_trait]
    impl FrameworkIdStore for BrokenStore {
        async fn fetch(&self) -> RepositoryResult<Option<FrameworkId>> {
            Err(RepositoryError::Storage("disk gone".into()))
        }
    }

    fn builder(factory: Arc<LocalDriverFactory>) -> SchedulerServiceBuilder {
        let (actor, _rx) = MailboxActor::channel(16);
        SchedulerServiceBuilder::new(SchedulerConfig::default())
            .with_driver_factory(factory)
            .with_command_actor(Arc::new(actor))
            .with_app_repository(Arc::new(InMemoryAppRepository::new()))
            .with_health_check_manager(Arc::new(InMemoryHealthCheckManager::new()))
            .with_framework_id_store(Arc::new(InMemoryFrameworkIdStore::with_id(
                FrameworkId::new("fw-1"),
            )))
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ServiceState::ShuttingDown.to_string(), "shutting_down");
    }

    #[tokio::test]
    async fn test_accessors_before_start_up() {
        let service = builder(Arc::new(LocalDriverFactory::new())).build().unwrap();

        assert!(matches!(
            service.coordinator(),
            Err(SchedulerError::NotInitialized)
        ));
        assert!(matches!(service.elector(), Err(SchedulerError::NotInitialized)));
        assert_eq!(service.state(), ServiceState::Stopped);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let service = builder(Arc::new(LocalDriverFactory::new())).build().unwrap();

        let err = service.run().await.unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidTransition {
                from: ServiceState::Stopped,
                to: ServiceState::Running
            }
        ));
        assert!(service.trigger_shutdown().await.is_err());

        service.start_up().await.unwrap();
        assert!(service.start_up().await.is_err());
        assert_eq!(service.state(), ServiceState::Starting);
    }

    #[tokio::test]
    async fn test_framework_id_reaches_driver_factory() {
        let factory = Arc::new(LocalDriverFactory::new());
        let service = builder(factory.clone()).build().unwrap();

        service.start_up().await.unwrap();

        let driver = factory.latest().unwrap();
        assert_eq!(driver.framework_id(), Some(&FrameworkId::new("fw-1")));
        assert!(service.coordinator().is_ok());
    }

    #[tokio::test]
    async fn test_failed_start_up_returns_to_stopped() {
        let service = builder(Arc::new(LocalDriverFactory::new()))
            .with_framework_id_store(Arc::new(BrokenStore))
            .build()
            .unwrap();

        let err = service.start_up().await.unwrap_err();
        assert!(matches!(err, SchedulerError::Repository(_)));
        assert_eq!(service.state(), ServiceState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_until_shutdown() {
        let factory = Arc::new(LocalDriverFactory::new());
        let service = Arc::new(builder(factory.clone()).build().unwrap());
        service.start_up().await.unwrap();

        let runner = {
            let service = service.clone();
            tokio::spawn(async move { service.run().await })
        };
        for _ in 0..200 {
            if service.is_leader() && service.state() == ServiceState::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(service.is_leader());

        service.trigger_shutdown().await.unwrap();
        runner.await.unwrap().unwrap();

        assert_eq!(service.state(), ServiceState::Terminated);
        assert!(!service.is_leader());
        assert!(service.start_up().await.is_err());
        assert!(factory.drivers().iter().all(|d| d.run_count() <= 1));
    }
}
