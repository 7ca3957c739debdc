//! Event Dispatcher
//!
//! Drains the supervisor's feed in order. Every book event is persisted;
//! derivative events (`price_change`, `tick_size_change`, `last_trade`)
//! are also published on `markets.<instrument_id>`. Consumer failures are
//! logged and counted, never propagated back to ingestion.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BookStorePort, NotificationPayload, NotificationPort, market_topic};
use crate::domain::book::BookEvent;
use crate::domain::streaming::FeedEvent;
use crate::infrastructure::metrics;

/// Counters for one dispatcher run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Book events received.
    pub events: u64,
    /// Events the store rejected.
    pub store_failures: u64,
    /// Notifications published.
    pub published: u64,
    /// Notifications that could not be published.
    pub publish_failures: u64,
}

/// Fans book events out to the store and the notification port.
pub struct EventDispatcher {
    store: Arc<dyn BookStorePort>,
    notifier: Arc<dyn NotificationPort>,
    stats: DispatchStats,
}

impl EventDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(store: Arc<dyn BookStorePort>, notifier: Arc<dyn NotificationPort>) -> Self {
        Self {
            store,
            notifier,
            stats: DispatchStats::default(),
        }
    }

    /// Drain `feed` until it closes or `cancel` fires.
    pub async fn run(
        mut self,
        mut feed: mpsc::Receiver<FeedEvent>,
        cancel: CancellationToken,
    ) -> DispatchStats {
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = feed.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.on_feed_event(event).await;
        }

        tracing::info!(
            events = self.stats.events,
            store_failures = self.stats.store_failures,
            published = self.stats.published,
            publish_failures = self.stats.publish_failures,
            "Event dispatcher stopped"
        );
        self.stats
    }

    async fn on_feed_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Book(event) => self.dispatch(&event).await,
            FeedEvent::StateChanged(state) => {
                tracing::debug!(state = %state, "Feed state changed");
            }
            FeedEvent::Reconnecting { attempt, delay } => {
                tracing::debug!(attempt, delay_secs = delay.as_secs(), "Feed reconnecting");
            }
            FeedEvent::RetriesExhausted { attempts } => {
                tracing::warn!(attempts, "Feed idle after exhausting retries");
            }
        }
    }

    /// Store and, for derivative kinds, publish one event.
    pub async fn dispatch(&mut self, event: &BookEvent) {
        self.stats.events += 1;

        if let Err(e) = self.store.store_book_event(&event.instrument_id, event).await {
            self.stats.store_failures += 1;
            metrics::record_store_failure();
            tracing::warn!(
                instrument_id = %event.instrument_id,
                kind = %event.kind,
                error = %e,
                "Failed to store book event"
            );
        }

        if !event.kind.is_derivative() {
            return;
        }

        let payload = match NotificationPayload::from_event(event) {
            Ok(payload) => payload,
            Err(e) => {
                self.publish_failed(event, &e.to_string());
                return;
            }
        };

        if self
            .notifier
            .publish(&market_topic(&event.instrument_id), payload)
            .await
        {
            self.stats.published += 1;
        } else {
            self.publish_failed(event, "notifier rejected payload");
        }
    }

    fn publish_failed(&mut self, event: &BookEvent, reason: &str) {
        self.stats.publish_failures += 1;
        metrics::record_publish_failure();
        tracing::warn!(
            instrument_id = %event.instrument_id,
            kind = %event.kind,
            reason,
            "Failed to publish notification"
        );
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> DispatchStats {
        self.stats
    }
}
