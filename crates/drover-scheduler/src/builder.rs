//! Builder for SchedulerService
//!
//! Every collaborator except the coordination backend is mandatory. Without
//! a backend the service runs as a single instance and elects itself.

use crate::actor::CommandActor;
use crate::backend::CoordinationBackend;
use crate::config::SchedulerConfig;
use crate::driver::DriverFactory;
use crate::error::{Result, SchedulerError};
use crate::health::HealthCheckManager;
use crate::repository::{AppRepository, FrameworkIdStore};
use crate::service::{Collaborators, SchedulerService};
use std::sync::Arc;

/// Builder for constructing a SchedulerService with all dependencies
pub struct SchedulerServiceBuilder {
    config: SchedulerConfig,
    driver_factory: Option<Arc<dyn DriverFactory>>,
    command_actor: Option<Arc<dyn CommandActor>>,
    app_repository: Option<Arc<dyn AppRepository>>,
    health_check_manager: Option<Arc<dyn HealthCheckManager>>,
    framework_id_store: Option<Arc<dyn FrameworkIdStore>>,
    coordination_backend: Option<Arc<dyn CoordinationBackend>>,
}

impl SchedulerServiceBuilder {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            driver_factory: None,
            command_actor: None,
            app_repository: None,
            health_check_manager: None,
            framework_id_store: None,
            coordination_backend: None,
        }
    }

    pub fn with_driver_factory(mut self, factory: Arc<dyn DriverFactory>) -> Self {
        self.driver_factory = Some(factory);
        self
    }

    /// Set the mailbox of the command-processing actor
    pub fn with_command_actor(mut self, actor: Arc<dyn CommandActor>) -> Self {
        self.command_actor = Some(actor);
        self
    }

    pub fn with_app_repository(mut self, repository: Arc<dyn AppRepository>) -> Self {
        self.app_repository = Some(repository);
        self
    }

    pub fn with_health_check_manager(mut self, manager: Arc<dyn HealthCheckManager>) -> Self {
        self.health_check_manager = Some(manager);
        self
    }

    pub fn with_framework_id_store(mut self, store: Arc<dyn FrameworkIdStore>) -> Self {
        self.framework_id_store = Some(store);
        self
    }

    /// Run leader election through a coordination service
    pub fn with_coordination_backend(mut self, backend: Arc<dyn CoordinationBackend>) -> Self {
        self.coordination_backend = Some(backend);
        self
    }

    /// Build the service; fails on invalid configuration or a missing
    /// collaborator
    pub fn build(self) -> Result<SchedulerService> {
        self.config.validate()?;

        let driver_factory = self
            .driver_factory
            .ok_or(SchedulerError::MissingCollaborator("driver_factory"))?;
        let actor = self
            .command_actor
            .ok_or(SchedulerError::MissingCollaborator("command_actor"))?;
        let repository = self
            .app_repository
            .ok_or(SchedulerError::MissingCollaborator("app_repository"))?;
        let health = self
            .health_check_manager
            .ok_or(SchedulerError::MissingCollaborator("health_check_manager"))?;
        let framework_ids = self
            .framework_id_store
            .ok_or(SchedulerError::MissingCollaborator("framework_id_store"))?;

        Ok(SchedulerService::new(
            self.config,
            Collaborators {
                driver_factory,
                actor,
                repository,
                health,
                framework_ids,
                backend: self.coordination_backend,
            },
        ))
    }
}

impl Default for SchedulerServiceBuilder {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}
