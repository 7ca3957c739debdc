//! Subscription Reconciler
//!
//! Periodically compares the watch-list against the live subscription and
//! asks the supervisor to activate or replace it. The first tick fires
//! immediately; `trigger()` forces an extra tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{IngestionControl, WatchListError, WatchListPort};
use crate::domain::subscription::{DesiredSet, ReconcileAction, reconcile};

/// Build the desired set from the watch-list.
///
/// # Errors
///
/// Returns the watch-list error unchanged.
pub async fn load_desired_set(watch_list: &dyn WatchListPort) -> Result<DesiredSet, WatchListError> {
    let entries = watch_list.list_monitored_instruments().await?;
    Ok(DesiredSet::from_watched(entries))
}

/// Reconciler configuration.
#[derive(Debug, Clone, Copy)]
pub struct ReconcilerConfig {
    /// Time between ticks.
    pub interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

/// What a tick did, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to change.
    Unchanged,
    /// Activation requested.
    Activated,
    /// Full resubscribe requested.
    Resubscribed,
    /// Watch-list or supervisor unavailable; tick skipped.
    Skipped,
}

/// Periodic watch-list reconciliation.
pub struct SubscriptionReconciler {
    watch_list: Arc<dyn WatchListPort>,
    control: Arc<dyn IngestionControl>,
    config: ReconcilerConfig,
    trigger: Arc<Notify>,
}

impl SubscriptionReconciler {
    /// Create a reconciler.
    #[must_use]
    pub fn new(
        watch_list: Arc<dyn WatchListPort>,
        control: Arc<dyn IngestionControl>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            watch_list,
            control,
            config,
            trigger: Arc::new(Notify::new()),
        }
    }

    /// Handle for forcing an immediate tick.
    #[must_use]
    pub fn trigger(&self) -> Arc<Notify> {
        Arc::clone(&self.trigger)
    }

    /// Run ticks until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            "Subscription reconciler started"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
                () = self.trigger.notified() => {
                    tracing::info!("Reconciliation requested");
                }
            }
            self.tick().await;
        }

        tracing::info!("Subscription reconciler stopped");
    }

    /// Run one reconciliation pass.
    pub async fn tick(&self) -> TickOutcome {
        let desired = match load_desired_set(self.watch_list.as_ref()).await {
            Ok(desired) => desired,
            Err(e) => {
                tracing::warn!(error = %e, "Watch-list unavailable, skipping reconciliation");
                return TickOutcome::Skipped;
            }
        };

        let live = self.control.live_subscription();
        let (result, outcome) = match reconcile(&live, desired) {
            ReconcileAction::None => {
                tracing::debug!(live = live.len(), "Subscription up to date");
                return TickOutcome::Unchanged;
            }
            ReconcileAction::Activate(desired) => {
                tracing::info!(instruments = desired.len(), "Activating market ingestion");
                (self.control.activate(desired).await, TickOutcome::Activated)
            }
            ReconcileAction::Resubscribe { desired, changes } => {
                tracing::info!(
                    added = changes.added.len(),
                    removed = changes.removed.len(),
                    instruments = desired.len(),
                    "Watch-list changed, resubscribing"
                );
                (self.control.resubscribe(desired).await, TickOutcome::Resubscribed)
            }
        };

        match result {
            Ok(()) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Could not reach supervisor");
                TickOutcome::Skipped
            }
        }
    }
}
