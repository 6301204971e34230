//! Periodic task reconciliation
//!
//! The timer runs from service start until shutdown no matter who leads;
//! only the leader turns a tick into a `ReconcileTasks` command.

use crate::actor::{CommandActor, CommandEnvelope};
use crate::leadership::Leadership;
use drover_types::SchedulerCommand;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Long-lived reconciliation timer
pub struct ReconciliationScheduler {
    initial_delay: Duration,
    interval: Duration,
    leadership: Arc<Leadership>,
    actor: Arc<dyn CommandActor>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReconciliationScheduler {
    pub fn new(
        initial_delay: Duration,
        interval: Duration,
        leadership: Arc<Leadership>,
        actor: Arc<dyn CommandActor>,
    ) -> Self {
        Self {
            initial_delay,
            interval,
            leadership,
            actor,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Start ticking; a second call is ignored
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() || self.cancel.is_cancelled() {
            debug!("Reconciliation timer already started");
            return;
        }

        let leadership = self.leadership.clone();
        let actor = self.actor.clone();
        let cancel = self.cancel.clone();
        let mut ticker = interval_at(Instant::now() + self.initial_delay, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            initial_delay_ms = self.initial_delay.as_millis() as u64,
            interval_ms = self.interval.as_millis() as u64,
            "Reconciliation timer started"
        );

        *task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => tick(&leadership, actor.as_ref()),
                }
            }
            debug!("Reconciliation timer stopped");
        }));
    }

    /// Cancel the timer; a signal that was already sent stays sent
    pub fn stop(&self) {
        self.cancel.cancel();
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self
                .task
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
    }
}

fn tick(leadership: &Leadership, actor: &dyn CommandActor) {
    if !leadership.is_leader() {
        debug!("Not leader, skipping reconciliation");
        return;
    }

    match actor.submit(CommandEnvelope::fire_and_forget(SchedulerCommand::ReconcileTasks)) {
        Ok(()) => info!("Requested task reconciliation"),
        Err(e) => error!(error = %e, "Could not request task reconciliation"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::MailboxActor;
    use tokio::sync::mpsc::error::TryRecvError;

    #[tokio::test]
    async fn test_ticks_only_signal_while_leading() {
        let leadership = Arc::new(Leadership::new());
        let (actor, mut rx) = MailboxActor::channel(16);
        let timer = ReconciliationScheduler::new(
            Duration::from_millis(10),
            Duration::from_millis(10),
            leadership.clone(),
            Arc::new(actor),
        );
        timer.start();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);

        leadership.elect();
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.command, SchedulerCommand::ReconcileTasks);
        assert!(envelope.reply_to.is_none());

        timer.stop();
        assert!(!timer.is_running());
    }

    #[tokio::test]
    async fn test_stopped_timer_sends_nothing() {
        let leadership = Arc::new(Leadership::new());
        leadership.elect();
        let (actor, mut rx) = MailboxActor::channel(16);
        let timer = ReconciliationScheduler::new(
            Duration::from_millis(30),
            Duration::from_millis(10),
            leadership,
            Arc::new(actor),
        );
        timer.start();
        timer.stop();
        timer.start();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(rx.try_recv().is_err());
    }
}
