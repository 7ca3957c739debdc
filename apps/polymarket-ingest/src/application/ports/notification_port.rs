//! Notification Port (Driven Port)
//!
//! Interface for publishing derivative book events to downstream listeners.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::book::{BookEvent, InstrumentId};

/// Body of a published notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Instrument the event belongs to.
    pub instrument_id: InstrumentId,
    /// Wire name of the event kind.
    pub event_type: String,
    /// The serialized event.
    pub data: serde_json::Value,
}

impl NotificationPayload {
    /// Build the payload for a book event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized.
    pub fn from_event(event: &BookEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            instrument_id: event.instrument_id.clone(),
            event_type: event.kind.as_str().to_string(),
            data: serde_json::to_value(event)?,
        })
    }
}

/// Topic a market's notifications are published on.
#[must_use]
pub fn market_topic(instrument_id: &InstrumentId) -> String {
    format!("markets.{instrument_id}")
}

/// Port for notification publishing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationPort: Send + Sync {
    /// Publish `payload` on `topic`. Returns whether it was accepted.
    async fn publish(&self, topic: &str, payload: NotificationPayload) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_is_prefixed_by_markets() {
        assert_eq!(market_topic(&InstrumentId::from("123")), "markets.123");
    }
}
