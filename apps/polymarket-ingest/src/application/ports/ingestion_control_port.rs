//! Ingestion Control Port (Driver Port)
//!
//! Interface through which the reconciler and command handlers ask the
//! reconnection supervisor to act. Requests are queued and applied in
//! order by the supervisor task.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::domain::book::InstrumentId;
use crate::domain::subscription::DesiredSet;

/// Control request error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// The supervisor task has exited.
    #[error("supervisor is not running")]
    SupervisorStopped,
}

/// Port for requesting supervisor actions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IngestionControl: Send + Sync {
    /// Snapshot of the live subscription.
    fn live_subscription(&self) -> BTreeSet<InstrumentId>;

    /// Begin ingestion with `desired` if nothing is running.
    async fn activate(&self, desired: DesiredSet) -> Result<(), ControlError>;

    /// Replace the live subscription with `desired`.
    async fn resubscribe(&self, desired: DesiredSet) -> Result<(), ControlError>;

    /// Tear down and rebuild the session from a fresh watch-list read.
    async fn restart(&self) -> Result<(), ControlError>;
}
