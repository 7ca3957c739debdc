//! Command Intake
//!
//! Pulls operator commands from a [`CommandSource`] and runs the handler
//! registered under the command name. Commands are handled one at a time
//! in queue order on the intake task, which is separate from the ingestion
//! path. Unknown commands are logged and ignored.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{CommandEnvelope, CommandSource, ControlError, IngestionControl};
use crate::infrastructure::metrics::{self, CommandOutcome};

/// Command handler failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The supervisor could not be reached.
    #[error(transparent)]
    Control(#[from] ControlError),
}

/// A named operator command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Execute the command.
    async fn handle(&self, envelope: &CommandEnvelope) -> Result<(), CommandError>;
}

/// `restart`: tear down and rebuild ingestion from the watch-list.
pub struct RestartCommand {
    control: Arc<dyn IngestionControl>,
}

impl RestartCommand {
    /// Create the handler.
    #[must_use]
    pub fn new(control: Arc<dyn IngestionControl>) -> Self {
        Self { control }
    }
}

#[async_trait]
impl CommandHandler for RestartCommand {
    async fn handle(&self, _envelope: &CommandEnvelope) -> Result<(), CommandError> {
        self.control.restart().await?;
        Ok(())
    }
}

/// `reconcile`: run a reconciliation tick now.
pub struct ReconcileCommand {
    trigger: Arc<Notify>,
}

impl ReconcileCommand {
    /// Create the handler from the reconciler's trigger.
    #[must_use]
    pub const fn new(trigger: Arc<Notify>) -> Self {
        Self { trigger }
    }
}

#[async_trait]
impl CommandHandler for ReconcileCommand {
    async fn handle(&self, _envelope: &CommandEnvelope) -> Result<(), CommandError> {
        self.trigger.notify_one();
        Ok(())
    }
}

/// Registry of handlers keyed by command name.
#[derive(Default, Clone)]
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous one.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    /// Look up a handler.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered command names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Consume loop over the command queue.
pub struct CommandIntake<S> {
    source: S,
    registry: CommandRegistry,
}

impl<S: CommandSource> CommandIntake<S> {
    /// Create an intake over `source`.
    #[must_use]
    pub const fn new(source: S, registry: CommandRegistry) -> Self {
        Self { source, registry }
    }

    /// Consume commands until the queue closes or `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(commands = ?self.registry.names(), "Command intake started");

        loop {
            let envelope = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = self.source.next_command() => match next {
                    Some(envelope) => envelope,
                    None => {
                        tracing::info!("Command queue closed");
                        break;
                    }
                },
            };
            self.dispatch(envelope).await;
        }

        tracing::info!("Command intake stopped");
    }

    /// Run the handler for `envelope` to completion.
    pub async fn dispatch(&self, envelope: CommandEnvelope) -> CommandOutcome {
        let Some(handler) = self.registry.get(&envelope.command) else {
            tracing::warn!(
                command = %envelope.command,
                command_id = %envelope.id,
                "Ignoring unknown command"
            );
            metrics::record_command(&envelope.command, CommandOutcome::Unknown);
            return CommandOutcome::Unknown;
        };

        tracing::info!(
            command = %envelope.command,
            command_id = %envelope.id,
            "Handling command"
        );
        let outcome = match handler.handle(&envelope).await {
            Ok(()) => {
                tracing::info!(command = %envelope.command, command_id = %envelope.id, "Command handled");
                CommandOutcome::Handled
            }
            Err(e) => {
                tracing::error!(
                    command = %envelope.command,
                    command_id = %envelope.id,
                    error = %e,
                    "Command failed"
                );
                CommandOutcome::Failed
            }
        };
        metrics::record_command(&envelope.command, outcome);
        outcome
    }
}
