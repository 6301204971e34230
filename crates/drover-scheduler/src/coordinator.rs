//! Deployment operations routed through the command actor
//!
//! Bounded operations wait for a single reply with a timeout. Long-running
//! operations hand back a [`PendingCompletion`] right away; it resolves when
//! the actor reports `Finished` or `Failed` on the registered channel.

use crate::actor::{CommandActor, CommandEnvelope};
use crate::driver::DriverLifecycleManager;
use crate::error::{Result, SchedulerError};
use crate::ports::PortAllocator;
use crate::repository::AppRepository;
use chrono::{DateTime, Utc};
use drover_types::{
    ActorMessage, AppDefinition, AppId, AppUpdate, DeploymentPlan, SchedulerCommand, TaskId,
    UpgradeStrategy,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

/// Front door for application changes
pub struct DeploymentCoordinator {
    actor: Arc<dyn CommandActor>,
    driver: Arc<DriverLifecycleManager>,
    repository: Arc<dyn AppRepository>,
    ports: PortAllocator,
    command_timeout: Duration,
}

impl DeploymentCoordinator {
    pub fn new(
        actor: Arc<dyn CommandActor>,
        driver: Arc<DriverLifecycleManager>,
        repository: Arc<dyn AppRepository>,
        ports: PortAllocator,
        command_timeout: Duration,
    ) -> Self {
        Self {
            actor,
            driver,
            repository,
            ports,
            command_timeout,
        }
    }

    pub fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    /// Assign auto ports and start a new application.
    ///
    /// When the actor does not answer in time the assigned ports stay
    /// reserved, since it may still record the application.
    #[instrument(skip(self, app), fields(app_id = %app.id))]
    pub async fn start_app(&self, app: AppDefinition) -> Result<AppDefinition> {
        app.validate()?;
        let lease = self.ports.allocate(app).await?;
        if !lease.assigned().is_empty() {
            info!(ports = ?lease.assigned(), "Replaced auto ports");
        }

        let app = lease.app().clone();
        match self.ask(SchedulerCommand::StartApp { app: app.clone() }).await {
            Ok(()) => Ok(app),
            Err(e @ SchedulerError::CommandTimeout { .. }) => {
                warn!(ports = ?lease.assigned(), "Start timed out, keeping port reservation");
                lease.keep();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    pub async fn stop_app(&self, app_id: &AppId) -> Result<()> {
        self.ask(SchedulerCommand::StopApp {
            app_id: app_id.clone(),
        })
        .await
    }

    /// Apply an update, then bring running tasks in line with it
    #[instrument(skip(self, update))]
    pub async fn update_app(&self, app_id: &AppId, update: AppUpdate) -> Result<()> {
        self.ask(SchedulerCommand::UpdateApp {
            app_id: app_id.clone(),
            update,
        })
        .await?;

        self.ask(SchedulerCommand::ScaleApp {
            app_id: app_id.clone(),
        })
        .await
    }

    /// Roll out a new version; the returned future resolves when the actor
    /// reports completion
    #[instrument(skip(self, app, strategy), fields(app_id = %app.id))]
    pub fn upgrade_app(
        &self,
        app: AppDefinition,
        strategy: UpgradeStrategy,
    ) -> Result<PendingCompletion> {
        self.tell(SchedulerCommand::UpgradeApp { app, strategy })
    }

    /// Roll out a deployment plan spanning several applications
    #[instrument(skip(self, plan), fields(deployment_id = %plan.id))]
    pub fn deploy(&self, plan: DeploymentPlan) -> Result<PendingCompletion> {
        self.tell(SchedulerCommand::Deploy { plan })
    }

    /// Kill tasks of an application, optionally lowering its instance count
    /// first so they are not replaced.
    ///
    /// Returns once every kill request was issued.
    #[instrument(skip(self, tasks), fields(task_count = tasks.len()))]
    pub async fn kill_tasks(&self, app_id: &AppId, tasks: &[TaskId], scale: bool) -> Result<()> {
        if scale {
            let app = self
                .repository
                .get_app(app_id)
                .await?
                .ok_or_else(|| SchedulerError::AppNotFound(app_id.clone()))?;
            let instances = app.instances.saturating_sub(tasks.len() as u32);
            info!(from = app.instances, to = instances, "Scaling down before kill");

            self.ask(SchedulerCommand::UpdateApp {
                app_id: app_id.clone(),
                update: AppUpdate::scale_to(instances),
            })
            .await?;
        }

        let mut first_error = None;
        for task in tasks {
            if let Err(e) = self.driver.kill_task(task).await {
                warn!(task_id = %task, error = %e, "Kill request failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub async fn list_apps(&self) -> Result<Vec<AppDefinition>> {
        Ok(self.repository.list_apps().await?)
    }

    pub async fn list_app_versions(&self, app_id: &AppId) -> Result<Vec<DateTime<Utc>>> {
        Ok(self.repository.list_versions(app_id).await?)
    }

    pub async fn get_app(&self, app_id: &AppId) -> Result<Option<AppDefinition>> {
        Ok(self.repository.get_app(app_id).await?)
    }

    pub async fn get_app_version(
        &self,
        app_id: &AppId,
        version: &DateTime<Utc>,
    ) -> Result<Option<AppDefinition>> {
        Ok(self.repository.get_app_version(app_id, version).await?)
    }

    /// Bounded round-trip: exactly one `Ack` or `Failed` within the timeout
    async fn ask(&self, command: SchedulerCommand) -> Result<()> {
        let name = command.to_string();
        let (envelope, reply) = CommandEnvelope::with_reply(command);
        debug!(command = %name, correlation_id = %envelope.id, "Sending bounded command");
        self.actor.submit(envelope)?;

        match tokio::time::timeout(self.command_timeout, reply).await {
            Err(_) => {
                warn!(
                    command = %name,
                    timeout_ms = self.command_timeout.as_millis() as u64,
                    "Command timed out"
                );
                Err(SchedulerError::CommandTimeout {
                    command: name,
                    timeout: self.command_timeout,
                })
            }
            Ok(Err(_)) => Err(SchedulerError::CompletionAbandoned(name)),
            Ok(Ok(ActorMessage::Ack)) => Ok(()),
            Ok(Ok(ActorMessage::Failed { reason })) => Err(SchedulerError::CommandRejected {
                command: name,
                reason,
            }),
            Ok(Ok(other)) => Err(SchedulerError::UnexpectedMessage {
                command: name,
                message: other.kind().to_string(),
            }),
        }
    }

    fn tell(&self, command: SchedulerCommand) -> Result<PendingCompletion> {
        let name = command.to_string();
        let (envelope, reply) = CommandEnvelope::with_reply(command);
        info!(command = %name, correlation_id = %envelope.id, "Submitting long-running command");
        self.actor.submit(envelope)?;
        Ok(PendingCompletion {
            command: name,
            reply,
        })
    }
}

/// Outcome of a long-running operation, resolved exactly once
#[derive(Debug)]
pub struct PendingCompletion {
    command: String,
    reply: oneshot::Receiver<ActorMessage>,
}

impl PendingCompletion {
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Future for PendingCompletion {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let message = match Pin::new(&mut self.reply).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(message) => message,
        };

        let command = std::mem::take(&mut self.command);
        Poll::Ready(match message {
            Ok(ActorMessage::Finished) => Ok(()),
            Ok(ActorMessage::Failed { reason }) => Err(SchedulerError::DeploymentFailed(reason)),
            Ok(other) => Err(SchedulerError::UnexpectedMessage {
                command,
                message: other.kind().to_string(),
            }),
            Err(_) => Err(SchedulerError::CompletionAbandoned(command)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::MailboxActor;
    use crate::config::SchedulerConfig;
    use crate::memory::{InMemoryAppRepository, LocalDriverFactory};
    use tokio::sync::mpsc;

    struct Fixture {
        coordinator: DeploymentCoordinator,
        mailbox: mpsc::Receiver<CommandEnvelope>,
        repository: Arc<InMemoryAppRepository>,
    }

    fn fixture(timeout_ms: u64) -> Fixture {
        let config = SchedulerConfig {
            local_port_min: 31000,
            local_port_max: 31010,
            command_timeout_ms: timeout_ms,
            ..Default::default()
        };
        let (actor, mailbox) = MailboxActor::channel(16);
        let repository = Arc::new(InMemoryAppRepository::new());
        let driver = Arc::new(DriverLifecycleManager::new(
            Arc::new(LocalDriverFactory::new()),
            None,
        ));
        let coordinator = DeploymentCoordinator::new(
            Arc::new(actor),
            driver,
            repository.clone(),
            PortAllocator::new(&config, repository.clone()),
            config.command_timeout(),
        );
        Fixture {
            coordinator,
            mailbox,
            repository,
        }
    }

    /// Answer the next envelopes in order, one reply each
    fn answer(
        mut mailbox: mpsc::Receiver<CommandEnvelope>,
        replies: Vec<ActorMessage>,
    ) -> tokio::task::JoinHandle<Vec<SchedulerCommand>> {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            for reply in replies {
                let Some(mut envelope) = mailbox.recv().await else {
                    break;
                };
                seen.push(envelope.command.clone());
                envelope.reply(reply);
            }
            seen
        })
    }

    fn web() -> AppDefinition {
        AppDefinition::new(AppId::new("/web").unwrap())
    }

    #[tokio::test]
    async fn test_start_app_assigns_ports_before_sending() {
        let f = fixture(1000);
        let actor = answer(f.mailbox, vec![ActorMessage::Ack]);

        let started = f
            .coordinator
            .start_app(web().with_ports(vec![0, 80]))
            .await
            .unwrap();

        assert!((31000..31010).contains(&started.ports[0]));
        assert_eq!(started.ports[1], 80);
        let seen = actor.await.unwrap();
        assert_eq!(seen, vec![SchedulerCommand::StartApp { app: started }]);
        // lease released after the round-trip
        assert!(f.coordinator.ports().reserved().is_empty());
    }

    #[tokio::test]
    async fn test_bounded_command_times_out() {
        let f = fixture(20);
        let _mailbox = f.mailbox;

        let err = f
            .coordinator
            .stop_app(&AppId::new("/web").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::CommandTimeout { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_bounded_failure_is_rejection() {
        let f = fixture(1000);
        let _actor = answer(f.mailbox, vec![ActorMessage::failed("unknown app")]);

        let err = f
            .coordinator
            .stop_app(&AppId::new("/web").unwrap())
            .await
            .unwrap_err();

        match err {
            SchedulerError::CommandRejected { command, reason } => {
                assert_eq!(command, "StopApp(/web)");
                assert_eq!(reason, "unknown app");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bounded_finished_is_protocol_violation() {
        let f = fixture(1000);
        let _actor = answer(f.mailbox, vec![ActorMessage::Finished]);

        let err = f
            .coordinator
            .stop_app(&AppId::new("/web").unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::UnexpectedMessage { .. }));
    }

    #[tokio::test]
    async fn test_update_chains_scale_only_on_success() {
        let f = fixture(1000);
        let actor = answer(f.mailbox, vec![ActorMessage::Ack, ActorMessage::Ack]);
        let id = AppId::new("/web").unwrap();

        f.coordinator
            .update_app(&id, AppUpdate::scale_to(4))
            .await
            .unwrap();

        let seen = actor.await.unwrap();
        assert_eq!(
            seen,
            vec![
                SchedulerCommand::UpdateApp {
                    app_id: id.clone(),
                    update: AppUpdate::scale_to(4)
                },
                SchedulerCommand::ScaleApp { app_id: id }
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_update_skips_scale() {
        let Fixture {
            coordinator,
            mut mailbox,
            ..
        } = fixture(1000);
        let id = AppId::new("/web").unwrap();

        let request = coordinator.update_app(&id, AppUpdate::scale_to(4));
        let actor = async {
            let mut envelope = mailbox.recv().await.unwrap();
            envelope.reply(ActorMessage::failed("locked"));
        };
        let (result, ()) = tokio::join!(request, actor);

        assert!(matches!(result, Err(SchedulerError::CommandRejected { .. })));
        assert!(mailbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deploy_resolves_on_finished() {
        let mut f = fixture(1000);
        let plan = DeploymentPlan::new(vec![web()]);

        let pending = f.coordinator.deploy(plan.clone()).unwrap();
        assert_eq!(pending.command(), "Deploy");

        let mut envelope = f.mailbox.recv().await.unwrap();
        assert_eq!(envelope.command, SchedulerCommand::Deploy { plan });
        envelope.reply(ActorMessage::Finished);

        pending.await.unwrap();
    }

    #[tokio::test]
    async fn test_unbounded_ack_is_protocol_violation() {
        let mut f = fixture(1000);

        let pending = f
            .coordinator
            .upgrade_app(web(), UpgradeStrategy::default())
            .unwrap();
        let mut envelope = f.mailbox.recv().await.unwrap();
        envelope.reply(ActorMessage::Ack);

        match pending.await {
            Err(SchedulerError::UnexpectedMessage { command, message }) => {
                assert_eq!(command, "UpgradeApp(/web)");
                assert_eq!(message, ActorMessage::Ack.kind());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_timeout_keeps_port_reservation() {
        let f = fixture(20);
        let _mailbox = f.mailbox;

        let err = f
            .coordinator
            .start_app(web().with_ports(vec![0]))
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::CommandTimeout { .. }));
        assert_eq!(f.coordinator.ports().reserved().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_start_releases_ports() {
        let f = fixture(1000);
        let _actor = answer(f.mailbox, vec![ActorMessage::failed("exists")]);

        let err = f
            .coordinator
            .start_app(web().with_ports(vec![0]))
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::CommandRejected { .. }));
        assert!(f.coordinator.ports().reserved().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_completion() {
        let mut f = fixture(1000);

        let pending = f
            .coordinator
            .upgrade_app(web(), UpgradeStrategy::default())
            .unwrap();
        drop(f.mailbox.recv().await.unwrap());

        assert!(matches!(
            pending.await,
            Err(SchedulerError::CompletionAbandoned(_))
        ));
    }

    #[tokio::test]
    async fn test_kill_unknown_app_with_scale() {
        let f = fixture(1000);
        let _mailbox = f.mailbox;
        let task = TaskId::parse("web.1").unwrap();

        let err = f
            .coordinator
            .kill_tasks(&AppId::new("/web").unwrap(), &[task], true)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::AppNotFound(_)));
    }

    #[tokio::test]
    async fn test_kill_without_running_driver_reports_error() {
        let f = fixture(1000);
        let _mailbox = f.mailbox;
        f.repository.store(web());
        let task = TaskId::parse("web.1").unwrap();

        let err = f
            .coordinator
            .kill_tasks(&AppId::new("/web").unwrap(), &[task], false)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Driver(_)));
    }

    #[tokio::test]
    async fn test_status_queries_pass_through() {
        let f = fixture(1000);
        let app = web();
        f.repository.store(app.clone());

        assert_eq!(f.coordinator.list_apps().await.unwrap(), vec![app.clone()]);
        assert_eq!(
            f.coordinator.list_app_versions(&app.id).await.unwrap(),
            vec![app.version]
        );
        assert_eq!(
            f.coordinator.get_app_version(&app.id, &app.version).await.unwrap(),
            Some(app.clone())
        );
        assert_eq!(f.coordinator.get_app(&app.id).await.unwrap(), Some(app));
    }
}
