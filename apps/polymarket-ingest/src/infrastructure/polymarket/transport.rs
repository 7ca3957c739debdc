//! Market Channel WebSocket Transport
//!
//! Owns at most one WebSocket connection to the CLOB market channel.
//!
//! # Stream URL
//!
//! - Production: `wss://ws-subscriptions-clob.polymarket.com/ws/market`
//!
//! # Protocol
//!
//! Keep-alives are plain-text `PING`/`PONG` frames. Everything else is
//! JSON text: either an array of market-update items or a single object.
//! WebSocket-level ping frames are answered here and never surface.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::codec::FrameCodec;
use super::messages::{PING_TOKEN, PONG_TOKEN};
use crate::application::ports::{Credentials, MarketTransport, TransportError};
use crate::domain::book::InstrumentId;
use crate::domain::streaming::Frame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default market channel endpoint.
pub const DEFAULT_MARKET_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

/// Configuration for the WebSocket transport.
#[derive(Debug, Clone)]
pub struct WsTransportConfig {
    /// WebSocket URL.
    pub url: String,
    /// Upper bound on the connect handshake.
    pub connect_timeout: Duration,
}

impl Default for WsTransportConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_MARKET_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// WebSocket implementation of [`MarketTransport`].
pub struct WsTransport {
    config: WsTransportConfig,
    codec: FrameCodec,
    stream: Option<WsStream>,
}

impl WsTransport {
    /// Create a transport. No connection is made until `open`.
    #[must_use]
    pub const fn new(config: WsTransportConfig) -> Self {
        Self {
            config,
            codec: FrameCodec::new(),
            stream: None,
        }
    }

    /// Whether a connection is currently held.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or_else(TransportError::not_open)?;
        stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send {
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl MarketTransport for WsTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        self.close().await;

        let url = self.config.url.clone();
        let timeout = self.config.connect_timeout;
        tracing::info!(url = %url, "Connecting to market channel");

        match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url.as_str())).await {
            Err(_) => Err(TransportError::ConnectTimeout { url, timeout }),
            Ok(Err(e)) => Err(TransportError::Connect {
                url,
                message: e.to_string(),
            }),
            Ok(Ok((stream, _response))) => {
                self.stream = Some(stream);
                Ok(())
            }
        }
    }

    async fn authenticate(
        &mut self,
        credentials: Option<&Credentials>,
    ) -> Result<(), TransportError> {
        let Some(credentials) = credentials else {
            tracing::debug!("No API credentials configured, skipping auth frame");
            return Ok(());
        };
        let frame = self
            .codec
            .encode_auth(credentials)
            .map_err(|e| TransportError::Send {
                message: e.to_string(),
            })?;
        self.send_text(frame).await
    }

    async fn subscribe(&mut self, instruments: &[InstrumentId]) -> Result<(), TransportError> {
        let frame = self
            .codec
            .encode_subscribe(instruments)
            .map_err(|e| TransportError::Send {
                message: e.to_string(),
            })?;
        self.send_text(frame).await
    }

    async fn send_keep_alive(&mut self) -> Result<(), TransportError> {
        self.send_text(PING_TOKEN.to_string()).await
    }

    async fn send_pong(&mut self) -> Result<(), TransportError> {
        self.send_text(PONG_TOKEN.to_string()).await
    }

    async fn receive(&mut self) -> Result<Frame, TransportError> {
        loop {
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| TransportError::ConnectionClosed {
                    reason: "transport not open".to_string(),
                })?;

            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return self.codec.decode(&text).map_err(|e| TransportError::Decode {
                        message: e.to_string(),
                    });
                }
                Some(Ok(Message::Binary(data))) => {
                    return Err(TransportError::Decode {
                        message: super::codec::CodecError::UnexpectedBinary(data.len())
                            .to_string(),
                    });
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map_or_else(
                        || "close frame".to_string(),
                        |f| format!("{} {}", u16::from(f.code), f.reason.as_str()),
                    );
                    return Err(TransportError::ConnectionClosed { reason });
                }
                // tungstenite queues the reply to a protocol ping itself.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => {
                    return Err(TransportError::ConnectionClosed {
                        reason: e.to_string(),
                    });
                }
                None => {
                    return Err(TransportError::ConnectionClosed {
                        reason: "stream ended".to_string(),
                    });
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                tracing::debug!(error = %e, "Error closing market channel socket");
            }
            tracing::info!("Market channel connection closed");
        }
    }
}
