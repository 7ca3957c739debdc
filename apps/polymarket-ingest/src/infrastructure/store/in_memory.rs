//! In-memory book store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::application::ports::{BookStorePort, StoreError, StoredBookRecord};
use crate::domain::book::{BookEvent, InstrumentId};

/// In-memory implementation of [`BookStorePort`].
///
/// Used when no store path is configured, and in tests.
#[derive(Debug, Default)]
pub struct InMemoryBookStore {
    records: RwLock<Vec<StoredBookRecord>>,
}

impl InMemoryBookStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Copy of every record, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<StoredBookRecord> {
        self.records.read().clone()
    }

    /// Insert a prepared record (for test setup).
    pub fn insert(&self, record: StoredBookRecord) {
        self.records.write().push(record);
    }
}

#[async_trait]
impl BookStorePort for InMemoryBookStore {
    async fn store_book_event(
        &self,
        instrument_id: &InstrumentId,
        event: &BookEvent,
    ) -> Result<(), StoreError> {
        self.insert(StoredBookRecord::new(instrument_id, event));
        Ok(())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|record| !record.is_older_than(cutoff));
        Ok(u64::try_from(before - records.len()).unwrap_or(u64::MAX))
    }
}
