//! Connection Lifecycle Types
//!
//! States of the single upstream venue session and the frames the
//! transport hands upward. These types are codec-agnostic.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::domain::book::BookEvent;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of the venue session.
///
/// Transitions form a strict cycle:
/// `Disconnected → Connecting → Authenticating → Subscribing → Listening`,
/// with any state able to fall to `Closing → Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket.
    #[default]
    Disconnected,
    /// Socket handshake in progress.
    Connecting,
    /// Optional credential exchange in progress.
    Authenticating,
    /// Subscribe frame being sent.
    Subscribing,
    /// Receiving market data.
    Listening,
    /// Socket being torn down.
    Closing,
}

impl ConnectionState {
    /// Lowercase label for logs and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Subscribing => "subscribing",
            Self::Listening => "listening",
            Self::Closing => "closing",
        }
    }

    /// Numeric encoding for the state gauge.
    #[must_use]
    pub const fn as_gauge(self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Authenticating => 2.0,
            Self::Subscribing => 3.0,
            Self::Listening => 4.0,
            Self::Closing => 5.0,
        }
    }

    /// Whether market data is flowing.
    #[must_use]
    pub const fn is_listening(self) -> bool {
        matches!(self, Self::Listening)
    }

    /// Whether a socket exists or is being established.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Frames
// =============================================================================

/// Plain-text keep-alive tokens exchanged outside the JSON payload stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlToken {
    /// Venue asks for a liveness reply.
    Ping,
    /// Venue answered our keep-alive.
    Pong,
}

/// One inbound message, already separated into control and data.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Keep-alive token.
    Control(ControlToken),
    /// Decoded JSON payload.
    Payload(serde_json::Value),
}

// =============================================================================
// Feed Events
// =============================================================================

/// Everything the supervisor reports downstream, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// The session moved to a new state.
    StateChanged(ConnectionState),
    /// A normalized book event, in wire order.
    Book(BookEvent),
    /// A failed session will be retried after `delay`.
    Reconnecting {
        /// Consecutive failures so far.
        attempt: u32,
        /// Wait before the next attempt.
        delay: Duration,
    },
    /// The retry budget is spent; ingestion is idle.
    RetriesExhausted {
        /// Consecutive failures recorded.
        attempts: u32,
    },
}
