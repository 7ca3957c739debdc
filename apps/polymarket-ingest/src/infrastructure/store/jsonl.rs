//! JSON-lines book store.
//!
//! One [`StoredBookRecord`] per line, appended as events arrive. Purging
//! rewrites the file through a sibling temp file and an atomic rename.
//! Lines that no longer parse are kept as-is.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::application::ports::{BookStorePort, StoreError, StoredBookRecord};
use crate::domain::book::{BookEvent, InstrumentId};

/// Append-only JSON-lines implementation of [`BookStorePort`].
#[derive(Debug)]
pub struct JsonlBookStore {
    path: PathBuf,
    // Serializes appends against purge rewrites.
    lock: Mutex<()>,
}

impl JsonlBookStore {
    /// Create a store writing to `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every parsable record, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn read_all(&self) -> Result<Vec<StoredBookRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let contents = self.read_contents().await?;
        Ok(contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    async fn read_contents(&self) -> Result<String, StoreError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(StoreError::Read {
                message: format!("{}: {e}", self.path.display()),
            }),
        }
    }

    fn write_error(&self, e: &std::io::Error) -> StoreError {
        StoreError::Write {
            message: format!("{}: {e}", self.path.display()),
        }
    }
}

#[async_trait]
impl BookStorePort for JsonlBookStore {
    async fn store_book_event(
        &self,
        instrument_id: &InstrumentId,
        event: &BookEvent,
    ) -> Result<(), StoreError> {
        let record = StoredBookRecord::new(instrument_id, event);
        let mut line = serde_json::to_string(&record).map_err(|e| StoreError::Serialization {
            message: e.to_string(),
        })?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.write_error(&e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.write_error(&e))?;
        file.flush().await.map_err(|e| self.write_error(&e))
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let _guard = self.lock.lock().await;
        let contents = self.read_contents().await?;

        let mut kept = String::with_capacity(contents.len());
        let mut removed = 0_u64;
        for line in contents.lines().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<StoredBookRecord>(line) {
                Ok(record) if record.is_older_than(cutoff) => removed += 1,
                Ok(_) => {
                    kept.push_str(line);
                    kept.push('\n');
                }
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "Keeping unparsable store line");
                    kept.push_str(line);
                    kept.push('\n');
                }
            }
        }

        if removed == 0 {
            return Ok(0);
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        fs::write(&tmp, kept.as_bytes())
            .await
            .map_err(|e| self.write_error(&e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.write_error(&e))?;
        Ok(removed)
    }
}
