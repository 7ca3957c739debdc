//! Book Event Types
//!
//! Canonical representation of order book updates emitted by the event
//! router. Every market-update item from the venue, whatever its kind, is
//! normalized into a single [`BookEvent`] before it reaches consumers.
//!
//! # Level Ordering
//!
//! Bid and ask levels are kept exactly in the order the venue delivered
//! them (best price first by venue convention). Nothing in this module
//! sorts or deduplicates levels.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

/// Opaque token identifying one tradable asset leg (a CLOB token id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    /// Create a new instrument id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for InstrumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Market (condition) identifier an instrument belongs to.
pub type MarketId = String;

// =============================================================================
// Levels
// =============================================================================

/// Side of the book a level belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    /// Resting buy interest.
    Bid,
    /// Resting sell interest.
    Ask,
}

impl BookSide {
    /// Parse a venue side token.
    ///
    /// `buy`/`bid` map to [`BookSide::Bid`], `sell`/`ask` to
    /// [`BookSide::Ask`], ignoring case. Anything else is `None`.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "buy" | "bid" => Some(Self::Bid),
            "sell" | "ask" => Some(Self::Ask),
            _ => None,
        }
    }
}

/// A single price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Level price.
    pub price: Decimal,
    /// Aggregate size resting at the price.
    pub size: Decimal,
}

impl PriceLevel {
    /// Create a new level.
    #[must_use]
    pub const fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Best ask minus best bid, or `None` if either side is empty.
#[must_use]
pub fn spread(bids: &[PriceLevel], asks: &[PriceLevel]) -> Option<Decimal> {
    let best_bid = bids.first()?;
    let best_ask = asks.first()?;
    Some(best_ask.price - best_bid.price)
}

// =============================================================================
// Book Event
// =============================================================================

/// Kind of market update a [`BookEvent`] was normalized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Full book snapshot.
    Book,
    /// Incremental level changes.
    PriceChange,
    /// Minimum tick size changed.
    TickSizeChange,
    /// An execution printed.
    LastTrade,
}

impl EventKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::PriceChange => "price_change",
            Self::TickSizeChange => "tick_size_change",
            Self::LastTrade => "last_trade",
        }
    }

    /// Whether events of this kind are derivative (delta) events that get
    /// published as notifications.
    #[must_use]
    pub const fn is_derivative(self) -> bool {
        !matches!(self, Self::Book)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific data carried alongside the derived levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Full snapshot; `hash` is the venue's book hash when provided.
    Snapshot {
        /// Venue book hash.
        hash: Option<String>,
    },
    /// The change entries exactly as received, including ones that were
    /// excluded from the derived levels.
    Changes {
        /// Raw change objects.
        changes: Vec<serde_json::Value>,
    },
    /// Tick size transition.
    TickSize {
        /// Previous tick size.
        old_tick_size: Decimal,
        /// New tick size.
        new_tick_size: Decimal,
    },
    /// Execution print.
    Trade {
        /// Execution price.
        price: Decimal,
        /// Aggressor side token as sent by the venue.
        side: String,
        /// Executed size.
        size: Decimal,
    },
}

/// Normalized book update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookEvent {
    /// Instrument the update applies to.
    pub instrument_id: InstrumentId,
    /// Market the instrument belongs to, if known.
    pub market: Option<MarketId>,
    /// Event kind.
    pub kind: EventKind,
    /// Bid levels in delivery order.
    pub bids: Vec<PriceLevel>,
    /// Ask levels in delivery order.
    pub asks: Vec<PriceLevel>,
    /// Best ask minus best bid, when computable.
    pub spread: Option<Decimal>,
    /// Kind-specific payload.
    pub payload: EventPayload,
    /// Venue timestamp, or receive time when the venue omitted it.
    pub timestamp: DateTime<Utc>,
}

impl BookEvent {
    /// Midpoint of the best bid and best ask.
    ///
    /// Falls back to whichever side is present when the book is one-sided.
    #[must_use]
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.bids.first(), self.asks.first()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            (Some(level), None) | (None, Some(level)) => Some(level.price),
            (None, None) => None,
        }
    }
}
