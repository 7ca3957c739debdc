//! Command Queue Port (Driver Port)
//!
//! Interface through which operator commands reach the ingestion
//! pipeline, plus the envelope they travel in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operator command with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Correlation id assigned on intake.
    pub id: String,
    /// Command name, e.g. `restart`.
    pub command: String,
    /// Remaining fields of the incoming object.
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
    /// When the command was received.
    pub received_at: DateTime<Utc>,
}

impl CommandEnvelope {
    /// Create an envelope for a bare command name.
    #[must_use]
    pub fn named(command: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            command: command.into(),
            args: serde_json::Map::new(),
            received_at: Utc::now(),
        }
    }

    /// Parse a raw command body.
    ///
    /// Accepts a JSON object with a string `command` field (other fields
    /// become `args`), a JSON string, or bare text naming the command.
    /// Returns `None` for empty bodies and for JSON that carries no
    /// command name.
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        let body = body.trim();
        if body.is_empty() {
            return None;
        }

        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(serde_json::Value::Object(mut fields)) => {
                let command = match fields.remove("command") {
                    Some(serde_json::Value::String(name)) => name,
                    _ => return None,
                };
                let command = command.trim();
                if command.is_empty() {
                    return None;
                }
                let mut envelope = Self::named(command);
                envelope.args = fields;
                Some(envelope)
            }
            Ok(serde_json::Value::String(name)) => {
                let name = name.trim();
                (!name.is_empty()).then(|| Self::named(name))
            }
            Ok(_) => None,
            Err(_) => Some(Self::named(body)),
        }
    }
}

/// Port for the operator command queue.
#[async_trait]
pub trait CommandSource: Send {
    /// Wait for the next command. `None` once the queue is closed.
    async fn next_command(&mut self) -> Option<CommandEnvelope>;
}
