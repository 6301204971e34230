//! Daemon assembly and run loop

use crate::config::DaemonConfig;
use crate::dev::CommandProcessor;
use crate::error::{DaemonError, DaemonResult};
use drover_scheduler::memory::{
    InMemoryAppRepository, InMemoryCoordinator, InMemoryFrameworkIdStore,
    InMemoryHealthCheckManager, LocalDriverFactory,
};
use drover_scheduler::{CommandEnvelope, MailboxActor, SchedulerService, SchedulerServiceBuilder};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Drover daemon
pub struct Server {
    config: DaemonConfig,
    service: Arc<SchedulerService>,
    processor: CommandProcessor,
    mailbox: mpsc::Receiver<CommandEnvelope>,
}

impl Server {
    /// Wire the scheduler service with the in-process collaborators
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let repository = Arc::new(InMemoryAppRepository::new());
        let (actor, mailbox) = MailboxActor::channel(config.processor.mailbox_capacity);

        let mut builder = SchedulerServiceBuilder::new(config.scheduler.clone())
            .with_driver_factory(Arc::new(LocalDriverFactory::new()))
            .with_command_actor(Arc::new(actor))
            .with_app_repository(repository.clone())
            .with_health_check_manager(Arc::new(InMemoryHealthCheckManager::new()))
            .with_framework_id_store(Arc::new(InMemoryFrameworkIdStore::new()));
        if config.scheduler.ha {
            builder = builder.with_coordination_backend(Arc::new(InMemoryCoordinator::new()));
        }

        Ok(Self {
            service: Arc::new(builder.build()?),
            processor: CommandProcessor::new(repository),
            mailbox,
            config,
        })
    }

    pub fn service(&self) -> &Arc<SchedulerService> {
        &self.service
    }

    /// Run until `shutdown` resolves, then shut the service down
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> DaemonResult<()> {
        let processor = tokio::spawn(self.processor.run(self.mailbox));

        self.service.start_up().await?;
        tracing::info!(
            address = %self.config.scheduler.advertised_address(),
            ha = self.config.scheduler.ha,
            "Drover daemon started"
        );

        let runner = {
            let service = self.service.clone();
            tokio::spawn(async move { service.run().await })
        };

        shutdown.await;
        tracing::info!("Drover daemon shutting down");

        self.service.trigger_shutdown().await?;
        runner
            .await
            .map_err(|e| DaemonError::Task(e.to_string()))??;

        processor.abort();
        Ok(())
    }
}

/// Graceful shutdown signal handler
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
