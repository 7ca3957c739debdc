//! Event Router
//!
//! Classifies decoded market-channel payloads and normalizes every
//! market-update item into a [`BookEvent`].
//!
//! | kind               | levels                        | spread        |
//! |--------------------|-------------------------------|---------------|
//! | `book`             | `bids`/`asks` verbatim        | best ask-bid  |
//! | `price_change`     | changes bucketed by side      | none          |
//! | `tick_size_change` | empty                         | none          |
//! | `last_trade`       | empty                         | none          |
//!
//! Routing never fails as a whole: bad items are logged, counted and
//! dropped, and the rest of the frame is still delivered.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::messages::{ControlMessage, MarketItem, parse_timestamp_millis};
use crate::domain::book::{
    BookEvent, BookSide, EventKind, EventPayload, InstrumentId, MarketId, PriceLevel, spread,
};
use crate::infrastructure::metrics;

/// Result of routing one payload.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Routed {
    /// Book events in wire order.
    pub events: Vec<BookEvent>,
    /// Control frame, when the payload was one.
    pub control: Option<ControlMessage>,
    /// Items dropped from this payload.
    pub dropped: usize,
}

/// Router holding the instrument-to-market catalog used when the wire
/// omits `market`.
#[derive(Debug, Default, Clone)]
pub struct EventRouter {
    catalog: HashMap<InstrumentId, MarketId>,
}

impl EventRouter {
    /// Create a router with an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a router with a market catalog.
    #[must_use]
    pub const fn with_catalog(catalog: HashMap<InstrumentId, MarketId>) -> Self {
        Self { catalog }
    }

    /// Replace the market catalog.
    pub fn set_catalog(&mut self, catalog: HashMap<InstrumentId, MarketId>) {
        self.catalog = catalog;
    }

    /// Route one decoded payload.
    ///
    /// Arrays are lists of market-update items. A single object is an item
    /// when it carries `event_type`, otherwise a control frame.
    #[must_use]
    pub fn route(&self, payload: serde_json::Value, received_at: DateTime<Utc>) -> Routed {
        let mut routed = Routed::default();
        let is_item = payload
            .as_object()
            .is_some_and(|fields| fields.contains_key("event_type"));

        match payload {
            serde_json::Value::Array(items) => {
                routed.events.reserve(items.len());
                for item in items {
                    match self.route_item(item, received_at) {
                        Some(event) => routed.events.push(event),
                        None => routed.dropped += 1,
                    }
                }
            }
            item if is_item => {
                match self.route_item(item, received_at) {
                    Some(event) => routed.events.push(event),
                    None => routed.dropped += 1,
                }
            }
            other => {
                let control = ControlMessage::from_value(&other);
                tracing::debug!(control = control.name(), "Control frame received");
                routed.control = Some(control);
            }
        }

        routed
    }

    fn route_item(&self, value: serde_json::Value, received_at: DateTime<Utc>) -> Option<BookEvent> {
        let item = match MarketItem::from_value(value) {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(reason = e.reason(), error = %e, "Dropping market item");
                metrics::record_item_dropped(e.reason());
                return None;
            }
        };

        let Some(asset_id) = item.asset_id() else {
            tracing::warn!(kind = %item.kind(), "Dropping market item without asset_id");
            metrics::record_item_dropped("missing_asset_id");
            return None;
        };

        let instrument_id = InstrumentId::new(asset_id);
        let market = item
            .market()
            .map(ToString::to_string)
            .or_else(|| self.catalog.get(&instrument_id).cloned());
        let timestamp = item
            .timestamp()
            .and_then(parse_timestamp_millis)
            .unwrap_or(received_at);

        let event = normalize(item, instrument_id, market, timestamp);
        metrics::record_book_event(event.kind);
        Some(event)
    }
}

fn normalize(
    item: MarketItem,
    instrument_id: InstrumentId,
    market: Option<MarketId>,
    timestamp: DateTime<Utc>,
) -> BookEvent {
    let kind = item.kind();
    let (bids, asks, payload) = match item {
        MarketItem::Book(book) => (
            book.bids.into_iter().map(PriceLevel::from).collect(),
            book.asks.into_iter().map(PriceLevel::from).collect(),
            EventPayload::Snapshot { hash: book.hash },
        ),
        MarketItem::PriceChange(change) => {
            let (bids, asks) = bucket_changes(&change.changes);
            (
                bids,
                asks,
                EventPayload::Changes {
                    changes: change.changes,
                },
            )
        }
        MarketItem::TickSizeChange(tick) => (
            Vec::new(),
            Vec::new(),
            EventPayload::TickSize {
                old_tick_size: tick.old_tick_size,
                new_tick_size: tick.new_tick_size,
            },
        ),
        MarketItem::LastTrade(trade) => (
            Vec::new(),
            Vec::new(),
            EventPayload::Trade {
                price: trade.price,
                side: trade.side,
                size: trade.size,
            },
        ),
    };

    let spread = match kind {
        EventKind::Book => spread(&bids, &asks),
        _ => None,
    };

    BookEvent {
        instrument_id,
        market,
        kind,
        bids,
        asks,
        spread,
        payload,
        timestamp,
    }
}

#[derive(Deserialize)]
struct ChangeEntry {
    #[serde(default)]
    side: Option<String>,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default)]
    size: Option<Decimal>,
}

/// Split raw change entries into bid and ask levels, preserving order.
///
/// Entries with an unrecognized side, or without a parsable price and
/// size, are left out.
#[must_use]
pub fn bucket_changes(changes: &[serde_json::Value]) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
    let mut bids = Vec::new();
    let mut asks = Vec::new();

    for raw in changes {
        let Ok(entry) = ChangeEntry::deserialize(raw) else {
            continue;
        };
        let (Some(side), Some(price), Some(size)) = (entry.side, entry.price, entry.size) else {
            continue;
        };
        match BookSide::parse(&side) {
            Some(BookSide::Bid) => bids.push(PriceLevel::new(price, size)),
            Some(BookSide::Ask) => asks.push(PriceLevel::new(price, size)),
            None => {}
        }
    }

    (bids, asks)
}
