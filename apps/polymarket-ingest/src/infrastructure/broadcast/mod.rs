//! Broadcast Notification Adapter
//!
//! Implements the notification port with a tokio broadcast channel for
//! fan-out to any number of in-process listeners (the health server's
//! SSE stream among them).
//!
//! A notification published while nobody is listening is still accepted:
//! delivery is best-effort and lagging receivers skip ahead.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::application::ports::{NotificationPayload, NotificationPort};

// =============================================================================
// Notification Envelope
// =============================================================================

/// A published notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Topic, e.g. `markets.<instrument_id>`.
    pub topic: String,
    /// Event body.
    #[serde(flatten)]
    pub payload: NotificationPayload,
    /// When the notification was published.
    pub published_at: DateTime<Utc>,
}

// =============================================================================
// Notification Hub
// =============================================================================

/// Configuration for the notification channel.
#[derive(Debug, Clone, Copy)]
pub struct NotificationConfig {
    /// Buffered notifications per receiver before it lags.
    pub capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

/// Fan-out hub for notifications.
///
/// # Example
///
/// ```rust
/// use polymarket_ingest::infrastructure::broadcast::{NotificationConfig, NotificationHub};
///
/// let hub = NotificationHub::new(NotificationConfig::default());
/// let rx = hub.subscribe();
/// assert_eq!(hub.receiver_count(), 1);
/// # drop(rx);
/// ```
#[derive(Debug)]
pub struct NotificationHub {
    tx: broadcast::Sender<Notification>,
}

impl NotificationHub {
    /// Create a hub with the given configuration.
    #[must_use]
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            tx: broadcast::channel(config.capacity.max(1)).0,
        }
    }

    /// Create a hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(NotificationConfig::default())
    }

    /// Send a notification to all receivers.
    ///
    /// Returns the number of receivers, or `None` if there are none.
    #[must_use]
    pub fn send(&self, notification: Notification) -> Option<usize> {
        self.tx.send(notification).ok()
    }

    /// Get a new receiver.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Shared notification hub reference.
pub type SharedNotificationHub = Arc<NotificationHub>;

#[async_trait]
impl NotificationPort for NotificationHub {
    async fn publish(&self, topic: &str, payload: NotificationPayload) -> bool {
        let notification = Notification {
            topic: topic.to_string(),
            payload,
            published_at: Utc::now(),
        };
        match self.send(notification) {
            Some(receivers) => tracing::trace!(topic, receivers, "Notification published"),
            None => tracing::trace!(topic, "Notification published with no listeners"),
        }
        true
    }
}

// =============================================================================
// Tests
// =============================================================================
