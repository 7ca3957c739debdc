//! Retention Cleanup
//!
//! Periodically removes stored book events older than the retention window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BookStorePort, StoreError};
use crate::infrastructure::metrics;

/// Retention configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    /// Time between cleanup passes.
    pub interval: Duration,
    /// How long stored events are kept.
    pub retention: chrono::Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            retention: chrono::Duration::days(7),
        }
    }
}

/// Periodic purge of old book events.
pub struct RetentionCleanup {
    store: Arc<dyn BookStorePort>,
    config: RetentionConfig,
}

impl RetentionCleanup {
    /// Create the cleanup task.
    #[must_use]
    pub fn new(store: Arc<dyn BookStorePort>, config: RetentionConfig) -> Self {
        Self { store, config }
    }

    /// Run cleanup passes until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            if let Err(e) = self.purge(Utc::now()).await {
                tracing::warn!(error = %e, "Retention cleanup failed");
            }
        }
        tracing::info!("Retention cleanup stopped");
    }

    /// Purge everything stored before `now - retention`.
    ///
    /// A window reaching past the earliest representable time purges nothing.
    ///
    /// # Errors
    ///
    /// Returns the store error unchanged.
    pub async fn purge(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let Some(cutoff) = now.checked_sub_signed(self.config.retention) else {
            tracing::debug!(
                retention_days = self.config.retention.num_days(),
                "Retention window predates all timestamps, nothing to purge"
            );
            return Ok(0);
        };
        let removed = self.store.purge_older_than(cutoff).await?;
        metrics::record_records_purged(removed);
        if removed > 0 {
            tracing::info!(removed, cutoff = %cutoff, "Purged old book events");
        } else {
            tracing::debug!(cutoff = %cutoff, "No book events to purge");
        }
        Ok(removed)
    }
}
