//! Polymarket Market Channel Adapters
//!
//! Everything that speaks the CLOB market channel protocol:
//!
//! - **Transport**: one WebSocket connection, text frames in and out
//! - **Codec / Messages**: keep-alive tokens, subscribe and auth frames, item shapes
//! - **Router**: turns decoded payloads into normalized book events
//! - **Supervisor**: session lifecycle, keep-alive and capped exponential backoff

pub mod codec;
pub mod keepalive;
pub mod messages;
pub mod reconnect;
pub mod router;
pub mod supervisor;
pub mod transport;

pub use codec::{CodecError, FrameCodec};
pub use keepalive::{KeepAliveConfig, KeepAliveEvent, KeepAliveManager, LivenessState};
pub use messages::{ControlMessage, ItemError, MarketItem};
pub use reconnect::{ReconnectConfig, ReconnectPolicy, RetryDecision};
pub use router::{EventRouter, Routed, bucket_changes};
pub use supervisor::{
    SessionError, Supervisor, SupervisorConfig, SupervisorHandle, SupervisorStatus,
};
pub use transport::{DEFAULT_MARKET_URL, WsTransport, WsTransportConfig};
