//! Watch-list Port (Driven Port)
//!
//! Interface for reading the set of instruments operators want monitored.

use async_trait::async_trait;

use crate::domain::subscription::WatchedInstrument;

/// Watch-list read error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WatchListError {
    /// The backing source could not be read.
    #[error("watch-list unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },

    /// The source was read but is not a list of watched markets.
    #[error("watch-list malformed: {message}")]
    Malformed {
        /// Error details.
        message: String,
    },
}

/// Port for the monitored-markets watch-list.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WatchListPort: Send + Sync {
    /// Every instrument of every market whose monitoring flag is not false.
    async fn list_monitored_instruments(&self) -> Result<Vec<WatchedInstrument>, WatchListError>;
}

/// Watch-list with a fixed set of entries.
#[derive(Debug, Clone, Default)]
pub struct StaticWatchList {
    entries: Vec<WatchedInstrument>,
}

impl StaticWatchList {
    /// Create a watch-list that always returns `entries`.
    #[must_use]
    pub const fn new(entries: Vec<WatchedInstrument>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl WatchListPort for StaticWatchList {
    async fn list_monitored_instruments(&self) -> Result<Vec<WatchedInstrument>, WatchListError> {
        Ok(self.entries.clone())
    }
}
