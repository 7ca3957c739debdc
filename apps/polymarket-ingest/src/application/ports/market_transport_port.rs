//! Market Transport Port (Driven Port)
//!
//! Interface for the single streaming connection to the venue's market
//! channel. The supervisor drives the whole session lifecycle through this
//! trait, so tests can substitute a scripted transport.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::book::InstrumentId;
use crate::domain::streaming::Frame;

/// Venue API credentials used for the optional auth frame.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    secret: String,
    passphrase: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String, secret: String, passphrase: String) -> Self {
        Self {
            api_key,
            secret,
            passphrase,
        }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the API secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Get the API passphrase.
    #[must_use]
    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("secret", &"[REDACTED]")
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

/// Transport error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Network or handshake failure while opening.
    #[error("connect to {url} failed: {message}")]
    Connect {
        /// Endpoint that was dialed.
        url: String,
        /// Error details.
        message: String,
    },

    /// Handshake did not finish in time.
    #[error("connect to {url} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Endpoint that was dialed.
        url: String,
        /// Configured connect timeout.
        timeout: Duration,
    },

    /// Outbound frame could not be written.
    #[error("send failed: {message}")]
    Send {
        /// Error details.
        message: String,
    },

    /// The stream ended or the venue sent a close frame.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Close reason.
        reason: String,
    },

    /// An inbound frame could not be decoded. Callers skip it.
    #[error("decode failed: {message}")]
    Decode {
        /// Error details.
        message: String,
    },
}

impl TransportError {
    /// Whether the error concerns a single frame rather than the session.
    #[must_use]
    pub const fn is_frame_local(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    /// Error for operations attempted without an open socket.
    #[must_use]
    pub fn not_open() -> Self {
        Self::Send {
            message: "transport not open".to_string(),
        }
    }
}

/// Port for the venue streaming connection.
///
/// At most one connection is held at a time. `close` must be idempotent and
/// safe to call from any state.
#[async_trait]
pub trait MarketTransport: Send {
    /// Open the connection.
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Send the auth frame when credentials are present; no-op otherwise.
    async fn authenticate(&mut self, credentials: Option<&Credentials>)
    -> Result<(), TransportError>;

    /// Send one subscribe frame carrying the full instrument list.
    async fn subscribe(&mut self, instruments: &[InstrumentId]) -> Result<(), TransportError>;

    /// Send the plain-text keep-alive token.
    async fn send_keep_alive(&mut self) -> Result<(), TransportError>;

    /// Answer a venue keep-alive token.
    async fn send_pong(&mut self) -> Result<(), TransportError>;

    /// Wait for the next inbound frame.
    async fn receive(&mut self) -> Result<Frame, TransportError>;

    /// Release the connection.
    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_redacted_debug() {
        let creds = Credentials::new(
            "key123".to_string(),
            "secret456".to_string(),
            "phrase789".to_string(),
        );
        let debug = format!("{creds:?}");
        assert!(!debug.contains("key123"));
        assert!(!debug.contains("secret456"));
        assert!(!debug.contains("phrase789"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn only_decode_errors_are_frame_local() {
        let decode = TransportError::Decode {
            message: "bad".to_string(),
        };
        assert!(decode.is_frame_local());
        assert!(!TransportError::not_open().is_frame_local());
        assert!(
            !TransportError::ConnectionClosed {
                reason: "eof".to_string()
            }
            .is_frame_local()
        );
    }
}
