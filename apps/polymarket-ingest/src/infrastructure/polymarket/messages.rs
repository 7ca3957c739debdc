//! Polymarket Market Channel Message Types
//!
//! Wire-level types for the CLOB market WebSocket channel.
//!
//! # Message Shapes
//!
//! Market-update items share an envelope and are tagged by `event_type`:
//!
//! ```json
//! {"asset_id":"7132...","market":"0xabc...","event_type":"book",
//!  "timestamp":"1718000000000","bids":[{"price":"0.40","size":"10"}],"asks":[...]}
//! ```
//!
//! Control frames are tagged by `type` and carry no market data:
//!
//! ```json
//! {"type":"subscription_error","channel":"market","error":"unknown asset"}
//! ```

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::book::{EventKind, PriceLevel};

// =============================================================================
// Outbound Frames
// =============================================================================

/// Plain-text keep-alive token sent by either side.
pub const PING_TOKEN: &str = "PING";

/// Plain-text keep-alive reply.
pub const PONG_TOKEN: &str = "PONG";

/// Subscribe request. Replaces the whole interest set on the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Instrument tokens to receive.
    pub assets_ids: Vec<String>,
    /// Channel type, always `market`.
    #[serde(rename = "type")]
    pub channel: String,
}

impl SubscribeRequest {
    /// Create a market-channel subscribe request.
    #[must_use]
    pub fn market(assets_ids: Vec<String>) -> Self {
        Self {
            assets_ids,
            channel: "market".to_string(),
        }
    }
}

/// Auth request sent when credentials are configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Always `auth`.
    #[serde(rename = "type")]
    pub msg_type: String,
    /// API key.
    #[serde(rename = "apiKey")]
    pub api_key: String,
    /// API secret.
    pub secret: String,
    /// API passphrase.
    pub passphrase: String,
    /// Unix seconds, as a string.
    pub timestamp: String,
}

// =============================================================================
// Control Frames
// =============================================================================

/// Raw control frame.
#[derive(Debug, Clone, Deserialize)]
struct RawControl {
    #[serde(rename = "type")]
    msg_type: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// A control frame the venue sent as a JSON object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// JSON ping; answered like the plain-text token.
    Ping,
    /// JSON pong.
    Pong,
    /// Credentials accepted.
    AuthSuccess,
    /// Credentials rejected. Ingestion continues unauthenticated.
    AuthError {
        /// Venue error text.
        error: String,
    },
    /// Subscribe accepted.
    SubscriptionSuccess {
        /// Channel name.
        channel: Option<String>,
    },
    /// Subscribe rejected. Fails the session.
    SubscriptionError {
        /// Channel name.
        channel: Option<String>,
        /// Venue error text.
        error: String,
    },
    /// Any other object.
    Unrecognized {
        /// The `type` field, if any.
        msg_type: Option<String>,
    },
}

impl ControlMessage {
    /// Classify a JSON object that is not a market-update item.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Self {
        let Ok(raw) = RawControl::deserialize(value) else {
            return Self::Unrecognized { msg_type: None };
        };
        let error = raw.error.map(|e| match e {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

        match raw.msg_type.as_deref() {
            Some("ping") => Self::Ping,
            Some("pong") => Self::Pong,
            Some("auth_success") => Self::AuthSuccess,
            Some("auth_error") => Self::AuthError {
                error: error.unwrap_or_default(),
            },
            Some("subscription_success") => Self::SubscriptionSuccess {
                channel: raw.channel,
            },
            Some("subscription_error") => Self::SubscriptionError {
                channel: raw.channel,
                error: error.unwrap_or_default(),
            },
            _ => Self::Unrecognized {
                msg_type: raw.msg_type,
            },
        }
    }

    /// Wire name, for logging.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::AuthSuccess => "auth_success",
            Self::AuthError { .. } => "auth_error",
            Self::SubscriptionSuccess { .. } => "subscription_success",
            Self::SubscriptionError { .. } => "subscription_error",
            Self::Unrecognized { msg_type } => msg_type.as_deref().unwrap_or("unknown"),
        }
    }
}

// =============================================================================
// Market-update Items
// =============================================================================

/// Price level as sent by the venue. Numbers may arrive as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WireLevel {
    /// Level price.
    pub price: Decimal,
    /// Level size.
    pub size: Decimal,
}

impl From<WireLevel> for PriceLevel {
    fn from(level: WireLevel) -> Self {
        Self::new(level.price, level.size)
    }
}

/// Full book snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BookMessage {
    /// Instrument token.
    #[serde(default)]
    pub asset_id: Option<String>,
    /// Market id.
    #[serde(default)]
    pub market: Option<String>,
    /// Bid levels.
    #[serde(default, alias = "buys")]
    pub bids: Vec<WireLevel>,
    /// Ask levels.
    #[serde(default, alias = "sells")]
    pub asks: Vec<WireLevel>,
    /// Venue book hash.
    #[serde(default)]
    pub hash: Option<String>,
    /// Epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

/// Incremental level changes.
///
/// Change entries stay raw so that entries with unknown sides or missing
/// fields can be excluded from the levels yet retained in the payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceChangeMessage {
    /// Instrument token.
    #[serde(default)]
    pub asset_id: Option<String>,
    /// Market id.
    #[serde(default)]
    pub market: Option<String>,
    /// Raw change entries `{side, price, size}`.
    #[serde(default, alias = "price_changes")]
    pub changes: Vec<serde_json::Value>,
    /// Epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

/// Tick size transition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TickSizeChangeMessage {
    /// Instrument token.
    #[serde(default)]
    pub asset_id: Option<String>,
    /// Market id.
    #[serde(default)]
    pub market: Option<String>,
    /// Previous tick size.
    pub old_tick_size: Decimal,
    /// New tick size.
    pub new_tick_size: Decimal,
    /// Epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

/// Execution print.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LastTradeMessage {
    /// Instrument token.
    #[serde(default)]
    pub asset_id: Option<String>,
    /// Market id.
    #[serde(default)]
    pub market: Option<String>,
    /// Execution price.
    pub price: Decimal,
    /// Aggressor side token.
    #[serde(default)]
    pub side: String,
    /// Executed size.
    pub size: Decimal,
    /// Epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

/// Typed market-update item.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketItem {
    /// `book`.
    Book(BookMessage),
    /// `price_change`.
    PriceChange(PriceChangeMessage),
    /// `tick_size_change`.
    TickSizeChange(TickSizeChangeMessage),
    /// `last_trade` / `last_trade_price`.
    LastTrade(LastTradeMessage),
}

/// Why an item could not be turned into a [`MarketItem`].
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    /// Not a JSON object.
    #[error("market item is not a JSON object")]
    NotAnObject,

    /// No `event_type` field.
    #[error("market item has no event_type")]
    MissingEventType,

    /// An `event_type` this service does not handle.
    #[error("unknown event_type: {0}")]
    UnknownEventType(String),

    /// Known kind, but fields failed to parse.
    #[error("malformed {kind} item: {source}")]
    Malformed {
        /// Item kind.
        kind: EventKind,
        /// Parse failure.
        #[source]
        source: serde_json::Error,
    },
}

impl ItemError {
    /// Metric label for the drop reason.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::NotAnObject => "not_an_object",
            Self::MissingEventType => "missing_event_type",
            Self::UnknownEventType(_) => "unknown_kind",
            Self::Malformed { .. } => "malformed",
        }
    }
}

/// Map a wire `event_type` to its kind.
#[must_use]
pub fn event_kind(event_type: &str) -> Option<EventKind> {
    match event_type {
        "book" => Some(EventKind::Book),
        "price_change" => Some(EventKind::PriceChange),
        "tick_size_change" => Some(EventKind::TickSizeChange),
        "last_trade" | "last_trade_price" => Some(EventKind::LastTrade),
        _ => None,
    }
}

impl MarketItem {
    /// Parse one market-update item.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not an object, carries no or an
    /// unknown `event_type`, or its fields do not parse.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ItemError> {
        let event_type = value
            .as_object()
            .ok_or(ItemError::NotAnObject)?
            .get("event_type")
            .and_then(serde_json::Value::as_str)
            .ok_or(ItemError::MissingEventType)?;

        let kind = event_kind(event_type)
            .ok_or_else(|| ItemError::UnknownEventType(event_type.to_string()))?;

        let malformed = |source| ItemError::Malformed { kind, source };
        let item = match kind {
            EventKind::Book => Self::Book(serde_json::from_value(value).map_err(malformed)?),
            EventKind::PriceChange => {
                Self::PriceChange(serde_json::from_value(value).map_err(malformed)?)
            }
            EventKind::TickSizeChange => {
                Self::TickSizeChange(serde_json::from_value(value).map_err(malformed)?)
            }
            EventKind::LastTrade => {
                Self::LastTrade(serde_json::from_value(value).map_err(malformed)?)
            }
        };
        Ok(item)
    }

    /// Kind of the item.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Book(_) => EventKind::Book,
            Self::PriceChange(_) => EventKind::PriceChange,
            Self::TickSizeChange(_) => EventKind::TickSizeChange,
            Self::LastTrade(_) => EventKind::LastTrade,
        }
    }

    /// Instrument token, if present and non-empty.
    #[must_use]
    pub fn asset_id(&self) -> Option<&str> {
        let id = match self {
            Self::Book(m) => m.asset_id.as_deref(),
            Self::PriceChange(m) => m.asset_id.as_deref(),
            Self::TickSizeChange(m) => m.asset_id.as_deref(),
            Self::LastTrade(m) => m.asset_id.as_deref(),
        };
        id.filter(|id| !id.is_empty())
    }

    /// Market id, if present and non-empty.
    #[must_use]
    pub fn market(&self) -> Option<&str> {
        let market = match self {
            Self::Book(m) => m.market.as_deref(),
            Self::PriceChange(m) => m.market.as_deref(),
            Self::TickSizeChange(m) => m.market.as_deref(),
            Self::LastTrade(m) => m.market.as_deref(),
        };
        market.filter(|m| !m.is_empty())
    }

    /// Raw timestamp field.
    #[must_use]
    pub const fn timestamp(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Book(m) => m.timestamp.as_ref(),
            Self::PriceChange(m) => m.timestamp.as_ref(),
            Self::TickSizeChange(m) => m.timestamp.as_ref(),
            Self::LastTrade(m) => m.timestamp.as_ref(),
        }
    }
}

/// Parse an epoch-milliseconds timestamp sent as a string or a number.
#[must_use]
pub fn parse_timestamp_millis(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    let millis = match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    Utc.timestamp_millis_opt(millis).single()
}
