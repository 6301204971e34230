//! Hand-off to the command-processing actor
//!
//! The actor lives elsewhere; the control plane only posts envelopes into
//! its mailbox. Whether and how a command is answered depends on the
//! command: bounded ones get a single `Ack`/`Failed`, long-running ones a
//! single `Finished`/`Failed`, fire-and-forget ones nothing at all.

use crate::error::{Result, SchedulerError};
use drover_types::{ActorMessage, CorrelationId, SchedulerCommand};
use tokio::sync::{mpsc, oneshot};

/// A command together with the channel its answer goes to
#[derive(Debug)]
pub struct CommandEnvelope {
    pub id: CorrelationId,
    pub command: SchedulerCommand,
    pub reply_to: Option<oneshot::Sender<ActorMessage>>,
}

impl CommandEnvelope {
    /// Envelope for a command that expects exactly one reply
    pub fn with_reply(command: SchedulerCommand) -> (Self, oneshot::Receiver<ActorMessage>) {
        let (tx, rx) = oneshot::channel();
        let envelope = Self {
            id: CorrelationId::generate(),
            command,
            reply_to: Some(tx),
        };
        (envelope, rx)
    }

    /// Envelope for a fire-and-forget command
    pub fn fire_and_forget(command: SchedulerCommand) -> Self {
        Self {
            id: CorrelationId::generate(),
            command,
            reply_to: None,
        }
    }

    /// Send the answer, if anyone is still listening
    pub fn reply(&mut self, message: ActorMessage) -> bool {
        match self.reply_to.take() {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }
}

/// Mailbox of the command-processing actor
pub trait CommandActor: Send + Sync {
    /// Post an envelope without waiting for it to be processed
    fn submit(&self, envelope: CommandEnvelope) -> Result<()>;
}

/// [`CommandActor`] backed by a bounded tokio channel
#[derive(Debug, Clone)]
pub struct MailboxActor {
    tx: mpsc::Sender<CommandEnvelope>,
}

impl MailboxActor {
    /// Create a mailbox and the receiving end the actor drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CommandEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl CommandActor for MailboxActor {
    fn submit(&self, envelope: CommandEnvelope) -> Result<()> {
        self.tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(env) => {
                SchedulerError::ActorUnavailable(format!("mailbox full, dropped {}", env.command))
            }
            mpsc::error::TrySendError::Closed(env) => {
                SchedulerError::ActorUnavailable(format!("mailbox closed, dropped {}", env.command))
            }
        })
    }
}
