//! Development command processor
//!
//! Stands in for the real command-processing actor: it applies commands to
//! the in-memory repository one at a time, acknowledges bounded commands
//! and finishes long-running ones immediately.

use drover_scheduler::memory::InMemoryAppRepository;
use drover_scheduler::{AppRepository, CommandEnvelope};
use drover_types::{ActorMessage, SchedulerCommand};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct CommandProcessor {
    repository: Arc<InMemoryAppRepository>,
}

impl CommandProcessor {
    pub fn new(repository: Arc<InMemoryAppRepository>) -> Self {
        Self { repository }
    }

    /// Drain the mailbox until every sender is gone
    pub async fn run(self, mut mailbox: mpsc::Receiver<CommandEnvelope>) {
        info!("Command processor started");
        while let Some(mut envelope) = mailbox.recv().await {
            debug!(correlation_id = %envelope.id, command = %envelope.command, "Processing command");
            let reply = self.process(&envelope.command).await;
            if let Some(message) = reply {
                if !envelope.reply(message) {
                    debug!(correlation_id = %envelope.id, "Requester no longer waiting");
                }
            }
        }
        info!("Command processor stopped");
    }

    async fn process(&self, command: &SchedulerCommand) -> Option<ActorMessage> {
        match command {
            SchedulerCommand::StartApp { app } => {
                self.repository.store(app.clone());
                Some(ActorMessage::Ack)
            }
            SchedulerCommand::StopApp { app_id } => Some(if self.repository.expunge(app_id) {
                ActorMessage::Ack
            } else {
                ActorMessage::failed(format!("unknown app {}", app_id))
            }),
            SchedulerCommand::UpdateApp { app_id, update } => {
                Some(match self.repository.get_app(app_id).await {
                    Ok(Some(app)) => {
                        self.repository.store(update.apply(&app));
                        ActorMessage::Ack
                    }
                    Ok(None) => ActorMessage::failed(format!("unknown app {}", app_id)),
                    Err(e) => ActorMessage::failed(e.to_string()),
                })
            }
            SchedulerCommand::ScaleApp { app_id } => {
                info!(app_id = %app_id, "Scale requested");
                Some(ActorMessage::Ack)
            }
            SchedulerCommand::UpgradeApp { app, .. } => {
                self.repository.store(app.clone());
                Some(ActorMessage::Finished)
            }
            SchedulerCommand::Deploy { plan } => {
                for app in &plan.target {
                    self.repository.store(app.clone());
                }
                info!(deployment_id = %plan.id, apps = plan.target.len(), "Deployment applied");
                Some(ActorMessage::Finished)
            }
            SchedulerCommand::ReconcileTasks => {
                match self.repository.list_ids().await {
                    Ok(ids) => info!(apps = ids.len(), "Reconciling tasks"),
                    Err(e) => warn!(error = %e, "Reconciliation could not list apps"),
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_scheduler::{CommandActor, MailboxActor};
    use drover_types::{AppDefinition, AppId, AppUpdate, DeploymentPlan};

    fn spawn_processor() -> (MailboxActor, Arc<InMemoryAppRepository>) {
        let repository = Arc::new(InMemoryAppRepository::new());
        let (actor, mailbox) = MailboxActor::channel(8);
        tokio::spawn(CommandProcessor::new(repository.clone()).run(mailbox));
        (actor, repository)
    }

    async fn ask(actor: &MailboxActor, command: SchedulerCommand) -> ActorMessage {
        let (envelope, reply) = CommandEnvelope::with_reply(command);
        actor.submit(envelope).unwrap();
        reply.await.unwrap()
    }

    #[tokio::test]
    async fn test_start_update_stop() {
        let (actor, repository) = spawn_processor();
        let id = AppId::new("/web").unwrap();
        let app = AppDefinition::new(id.clone());

        assert_eq!(
            ask(&actor, SchedulerCommand::StartApp { app }).await,
            ActorMessage::Ack
        );
        let update = SchedulerCommand::UpdateApp {
            app_id: id.clone(),
            update: AppUpdate::scale_to(3),
        };
        assert_eq!(ask(&actor, update).await, ActorMessage::Ack);
        assert_eq!(repository.get_app(&id).await.unwrap().unwrap().instances, 3);

        let stop = SchedulerCommand::StopApp { app_id: id.clone() };
        assert_eq!(ask(&actor, stop.clone()).await, ActorMessage::Ack);
        assert!(matches!(
            ask(&actor, stop).await,
            ActorMessage::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_deploy_finishes() {
        let (actor, repository) = spawn_processor();
        let plan = DeploymentPlan::new(vec![
            AppDefinition::new(AppId::new("/a").unwrap()),
            AppDefinition::new(AppId::new("/b").unwrap()),
        ]);

        assert_eq!(
            ask(&actor, SchedulerCommand::Deploy { plan }).await,
            ActorMessage::Finished
        );
        assert_eq!(repository.list_ids().await.unwrap().len(), 2);
    }
}
