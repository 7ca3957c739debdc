//! Watch-list File Adapter
//!
//! Reads the monitored-markets list from a JSON file. The file holds an
//! array of market objects (or `{"markets": [...]}`), shaped like the
//! Gamma markets API:
//!
//! ```json
//! [{"id": "512340", "conditionId": "0xabc", "monitored": true,
//!   "clobTokenIds": "[\"7101…\", \"7102…\"]"}]
//! ```
//!
//! `clobTokenIds` may be a JSON array or a JSON-encoded string of one.
//! Markets with `monitored: false` are skipped; entries that cannot be
//! read are skipped with a warning. The file is re-read on every call so
//! edits take effect on the next reconciliation tick.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::application::ports::{WatchListError, WatchListPort};
use crate::domain::book::InstrumentId;
use crate::domain::subscription::WatchedInstrument;

/// JSON file implementation of [`WatchListPort`].
#[derive(Debug, Clone)]
pub struct JsonFileWatchList {
    path: PathBuf,
}

impl JsonFileWatchList {
    /// Create an adapter over `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl WatchListPort for JsonFileWatchList {
    async fn list_monitored_instruments(&self) -> Result<Vec<WatchedInstrument>, WatchListError> {
        let contents =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| WatchListError::Unavailable {
                    message: format!("{}: {e}", self.path.display()),
                })?;
        let document: Value =
            serde_json::from_str(&contents).map_err(|e| WatchListError::Malformed {
                message: format!("{}: {e}", self.path.display()),
            })?;
        parse_watch_list(&document)
    }
}

/// Flatten a watch-list document into watched instruments.
///
/// # Errors
///
/// Returns [`WatchListError::Malformed`] if the document is neither an
/// array nor an object with a `markets` array.
pub fn parse_watch_list(document: &Value) -> Result<Vec<WatchedInstrument>, WatchListError> {
    let markets = match document {
        Value::Array(markets) => markets,
        Value::Object(fields) => match fields.get("markets") {
            Some(Value::Array(markets)) => markets,
            _ => {
                return Err(WatchListError::Malformed {
                    message: "expected a `markets` array".to_string(),
                });
            }
        },
        _ => {
            return Err(WatchListError::Malformed {
                message: "expected an array of markets".to_string(),
            });
        }
    };

    let mut watched = Vec::new();
    for (index, market) in markets.iter().enumerate() {
        match market_entries(market) {
            Ok(entries) => watched.extend(entries),
            Err(reason) => {
                tracing::warn!(index, reason, "Skipping malformed watch-list entry");
            }
        }
    }
    Ok(watched)
}

fn market_entries(market: &Value) -> Result<Vec<WatchedInstrument>, &'static str> {
    let Value::Object(fields) = market else {
        return Err("entry is not an object");
    };

    if fields.get("monitored").and_then(Value::as_bool) == Some(false) {
        return Ok(Vec::new());
    }

    // The condition id is what the venue sends as `market` on the wire.
    let market_id = ["conditionId", "id", "_id"]
        .iter()
        .find_map(|key| match fields.get(*key) {
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        });

    let token_ids = match fields.get("clobTokenIds") {
        Some(value) => token_ids(value)?,
        None => reward_asset_ids(fields.get("clobRewards")),
    };
    if token_ids.is_empty() {
        return Err("no token ids");
    }

    Ok(token_ids
        .into_iter()
        .map(|id| WatchedInstrument {
            instrument_id: InstrumentId::new(id),
            market_id: market_id.clone(),
        })
        .collect())
}

fn token_ids(value: &Value) -> Result<Vec<String>, &'static str> {
    let decoded;
    let array = match value {
        Value::Array(items) => items,
        Value::String(encoded) => {
            decoded = serde_json::from_str::<Value>(encoded)
                .map_err(|_| "clobTokenIds string is not JSON")?;
            match &decoded {
                Value::Array(items) => items,
                _ => return Err("clobTokenIds string is not an array"),
            }
        }
        _ => return Err("clobTokenIds is not an array"),
    };

    array
        .iter()
        .map(|item| match item {
            Value::String(id) if !id.is_empty() => Ok(id.clone()),
            _ => Err("clobTokenIds holds a non-string id"),
        })
        .collect()
}

fn reward_asset_ids(rewards: Option<&Value>) -> Vec<String> {
    rewards
        .and_then(Value::as_array)
        .map(|rewards| {
            rewards
                .iter()
                .filter_map(|reward| reward.get("asset_id").and_then(Value::as_str))
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ids(watched: &[WatchedInstrument]) -> Vec<&str> {
        watched.iter().map(|w| w.instrument_id.as_str()).collect()
    }

    #[test]
    fn accepts_array_and_encoded_string() {
        let doc = json!([
            {"id": "m1", "clobTokenIds": ["A", "B"]},
            {"conditionId": "0xc2", "clobTokenIds": "[\"C\"]"}
        ]);
        let watched = parse_watch_list(&doc).unwrap();
        assert_eq!(ids(&watched), vec!["A", "B", "C"]);
        assert_eq!(watched[0].market_id.as_deref(), Some("m1"));
        assert_eq!(watched[2].market_id.as_deref(), Some("0xc2"));
    }

    #[test]
    fn condition_id_wins_over_gamma_id() {
        let doc = json!([{"id": "512340", "conditionId": "0xabc", "clobTokenIds": "[\"T\"]"}]);
        let watched = parse_watch_list(&doc).unwrap();
        assert_eq!(watched[0].market_id.as_deref(), Some("0xabc"));
    }

    #[test]
    fn unmonitored_and_malformed_entries_are_skipped() {
        let doc = json!({"markets": [
            {"id": "m1", "monitored": false, "clobTokenIds": ["A"]},
            {"id": "m2", "clobTokenIds": "not json"},
            {"id": "m3", "clobTokenIds": [1, 2]},
            "garbage",
            {"id": "m4", "monitored": true, "clobTokenIds": ["D"]}
        ]});
        let watched = parse_watch_list(&doc).unwrap();
        assert_eq!(ids(&watched), vec!["D"]);
    }

    #[test]
    fn falls_back_to_reward_asset_ids() {
        let doc = json!([{"id": 7, "clobRewards": [{"asset_id": "R1"}, {"rate": 1}]}]);
        let watched = parse_watch_list(&doc).unwrap();
        assert_eq!(ids(&watched), vec!["R1"]);
        assert_eq!(watched[0].market_id.as_deref(), Some("7"));
    }

    #[test]
    fn rejects_non_list_documents() {
        assert!(matches!(
            parse_watch_list(&json!("nope")),
            Err(WatchListError::Malformed { .. })
        ));
        assert!(matches!(
            parse_watch_list(&json!({"items": []})),
            Err(WatchListError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn reads_file_on_each_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchlist.json");
        std::fs::write(&path, r#"[{"id":"m1","clobTokenIds":["A"]}]"#).unwrap();

        let adapter = JsonFileWatchList::new(&path);
        assert_eq!(adapter.list_monitored_instruments().await.unwrap().len(), 1);

        std::fs::write(&path, "[]").unwrap();
        assert!(adapter.list_monitored_instruments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = JsonFileWatchList::new(dir.path().join("absent.json"));
        assert!(matches!(
            adapter.list_monitored_instruments().await,
            Err(WatchListError::Unavailable { .. })
        ));
    }
}
