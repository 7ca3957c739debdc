#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Polymarket Ingest - Live Order Book Ingestion
//!
//! Maintains one WebSocket session against Polymarket's CLOB market
//! channel, normalizes the book events it carries, and keeps the session's
//! subscription in step with a watch-list of monitored markets.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Venue-agnostic types and decisions
//!   - `book`: Normalized book events, price levels, derived spread
//!   - `streaming`: Connection lifecycle states and inbound frames
//!   - `subscription`: Desired/live sets and the reconcile decision
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Transport, watch-list, store, notification, command seams
//!   - `services`: Reconciler, command intake, dispatcher, retention
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `polymarket`: WebSocket transport, frame codec, event router,
//!     keep-alive and the reconnection supervisor
//!   - `store`: In-memory and JSON-lines book stores
//!   - `watchlist`: Watch-list file adapter
//!   - `broadcast`: Notification fan-out
//!   - `commands`: Operator command queue
//!   - `config`: Configuration loading
//!   - `health`: Health, metrics and command HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                   ┌──────────────┐  FeedEvent  ┌────────────┐──► Book store
//! Polymarket WS ───►│  Supervisor  │────────────►│ Dispatcher │
//!                   └──────────────┘             └────────────┘──► Notifications
//!                      ▲        ▲
//!          activate /  │        │ restart
//!          resubscribe │        │
//!                ┌────────────┐ ┌────────────────┐
//! Watch-list ───►│ Reconciler │ │ Command intake │◄── POST /commands
//!                └────────────┘ └────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core book types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::book::{BookEvent, EventKind, InstrumentId, PriceLevel};
pub use domain::streaming::{ConnectionState, FeedEvent};
pub use domain::subscription::{DesiredSet, ReconcileAction, reconcile};

// Application services
pub use application::services::{
    CommandIntake, CommandRegistry, EventDispatcher, ReconcileCommand, RestartCommand,
    RetentionCleanup, SubscriptionReconciler,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, IngestConfig};

// Market channel
pub use infrastructure::polymarket::{
    Supervisor, SupervisorConfig, SupervisorHandle, SupervisorStatus, WsTransport,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Notification hub
pub use infrastructure::broadcast::{NotificationConfig, NotificationHub, SharedNotificationHub};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
