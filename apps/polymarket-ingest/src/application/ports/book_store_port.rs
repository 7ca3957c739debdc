//! Book Store Port (Driven Port)
//!
//! Interface for persisting normalized book events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::book::{BookEvent, InstrumentId, MarketId};

/// Persistence error. Callers log these and keep ingesting.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Writing to the backing store failed.
    #[error("store write failed: {message}")]
    Write {
        /// Error details.
        message: String,
    },

    /// Reading from the backing store failed.
    #[error("store read failed: {message}")]
    Read {
        /// Error details.
        message: String,
    },

    /// A record could not be (de)serialized.
    #[error("store serialization failed: {message}")]
    Serialization {
        /// Error details.
        message: String,
    },
}

/// One persisted book event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBookRecord {
    /// Market the event belongs to, if known.
    pub market_id: Option<MarketId>,
    /// Instrument the event belongs to.
    pub instrument_id: InstrumentId,
    /// Midpoint of best bid and ask at the time of the event.
    pub mid_price: Option<Decimal>,
    /// When the record was written.
    pub stored_at: DateTime<Utc>,
    /// The event itself.
    pub event: BookEvent,
}

impl StoredBookRecord {
    /// Build a record for `event`, stamped now.
    #[must_use]
    pub fn new(instrument_id: &InstrumentId, event: &BookEvent) -> Self {
        Self {
            market_id: event.market.clone(),
            instrument_id: instrument_id.clone(),
            mid_price: event.mid_price(),
            stored_at: Utc::now(),
            event: event.clone(),
        }
    }

    /// Whether the record was stored strictly before `cutoff`.
    #[must_use]
    pub fn is_older_than(&self, cutoff: DateTime<Utc>) -> bool {
        self.stored_at < cutoff
    }
}

/// Port for book event persistence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookStorePort: Send + Sync {
    /// Persist one event.
    async fn store_book_event(
        &self,
        instrument_id: &InstrumentId,
        event: &BookEvent,
    ) -> Result<(), StoreError>;

    /// Delete records stored before `cutoff`, returning how many went.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
