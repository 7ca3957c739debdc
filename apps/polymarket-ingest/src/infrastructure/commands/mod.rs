//! In-process Command Queue
//!
//! Bounded mpsc queue feeding the command intake. The health server's
//! `POST /commands` endpoint holds a [`CommandSender`]; the intake loop
//! owns the [`ChannelCommandSource`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::application::ports::{CommandEnvelope, CommandSource};

/// Default queue capacity.
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// Why a command could not be enqueued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    /// The body named no command.
    #[error("body does not name a command")]
    InvalidBody,
    /// The queue is full.
    #[error("command queue is full")]
    Full,
    /// The intake loop has stopped.
    #[error("command queue is closed")]
    Closed,
}

/// Create a connected sender and source.
#[must_use]
pub fn command_queue(capacity: usize) -> (CommandSender, ChannelCommandSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (CommandSender { tx }, ChannelCommandSource { rx })
}

/// Producer side of the queue.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<CommandEnvelope>,
}

impl CommandSender {
    /// Enqueue an envelope without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue is full or closed.
    pub fn enqueue(&self, envelope: CommandEnvelope) -> Result<(), EnqueueError> {
        self.tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Parse a raw body and enqueue it.
    ///
    /// # Errors
    ///
    /// Returns an error if the body names no command or the queue rejects it.
    pub fn enqueue_body(&self, body: &str) -> Result<CommandEnvelope, EnqueueError> {
        let envelope = CommandEnvelope::parse(body).ok_or(EnqueueError::InvalidBody)?;
        self.enqueue(envelope.clone())?;
        Ok(envelope)
    }
}

/// Consumer side of the queue.
#[derive(Debug)]
pub struct ChannelCommandSource {
    rx: mpsc::Receiver<CommandEnvelope>,
}

#[async_trait]
impl CommandSource for ChannelCommandSource {
    async fn next_command(&mut self) -> Option<CommandEnvelope> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bodies_arrive_in_order() {
        let (sender, mut source) = command_queue(4);
        sender.enqueue_body("restart").unwrap();
        sender.enqueue_body(r#"{"command":"reconcile"}"#).unwrap();

        assert_eq!(source.next_command().await.unwrap().command, "restart");
        assert_eq!(source.next_command().await.unwrap().command, "reconcile");
    }

    #[tokio::test]
    async fn full_and_closed_queues_reject() {
        let (sender, source) = command_queue(1);
        sender.enqueue_body("restart").unwrap();
        assert_eq!(sender.enqueue_body("restart"), Err(EnqueueError::Full));

        drop(source);
        assert_eq!(sender.enqueue_body("restart"), Err(EnqueueError::Closed));
    }

    #[test]
    fn empty_body_is_invalid() {
        let (sender, _source) = command_queue(1);
        assert_eq!(sender.enqueue_body("  "), Err(EnqueueError::InvalidBody));
    }

    #[tokio::test]
    async fn source_ends_when_senders_drop() {
        let (sender, mut source) = command_queue(1);
        drop(sender);
        assert!(source.next_command().await.is_none());
    }
}
