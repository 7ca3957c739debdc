//! Prometheus Metrics Module
//!
//! Exposes ingestion metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Inbound frames, decode failures, routed and dropped items
//! - **Connection**: Session state, reconnect attempts, live subscription size
//! - **Consumers**: Store and publish failures, purged records
//! - **Commands**: Operator commands handled by outcome
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::book::EventKind;
use crate::domain::streaming::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "polymarket_ingest_frames_received_total",
        "Total frames received from the market channel"
    );
    describe_counter!(
        "polymarket_ingest_decode_errors_total",
        "Total inbound frames that could not be decoded"
    );
    describe_counter!(
        "polymarket_ingest_book_events_total",
        "Total book events routed by kind"
    );
    describe_counter!(
        "polymarket_ingest_items_dropped_total",
        "Total market-update items dropped by reason"
    );

    describe_gauge!(
        "polymarket_ingest_connection_state",
        "Session state (0 disconnected .. 4 listening, 5 closing)"
    );
    describe_counter!(
        "polymarket_ingest_reconnects_total",
        "Total reconnection attempts scheduled"
    );
    describe_gauge!(
        "polymarket_ingest_live_subscription_size",
        "Instruments in the live subscription"
    );

    describe_counter!(
        "polymarket_ingest_store_failures_total",
        "Total book events the store rejected"
    );
    describe_counter!(
        "polymarket_ingest_publish_failures_total",
        "Total notifications that could not be published"
    );
    describe_counter!(
        "polymarket_ingest_records_purged_total",
        "Total stored records removed by retention cleanup"
    );
    describe_counter!(
        "polymarket_ingest_commands_total",
        "Total operator commands by name and outcome"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for operator commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Handler ran and succeeded.
    Handled,
    /// Handler ran and failed.
    Failed,
    /// No handler registered.
    Unknown,
}

impl CommandOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

/// Record an inbound frame.
pub fn record_frame_received() {
    counter!("polymarket_ingest_frames_received_total").increment(1);
}

/// Record an undecodable frame.
pub fn record_decode_error() {
    counter!("polymarket_ingest_decode_errors_total").increment(1);
}

/// Record a routed book event.
pub fn record_book_event(kind: EventKind) {
    counter!(
        "polymarket_ingest_book_events_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a dropped market-update item.
pub fn record_item_dropped(reason: &'static str) {
    counter!(
        "polymarket_ingest_items_dropped_total",
        "reason" => reason
    )
    .increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("polymarket_ingest_connection_state").set(state.as_gauge());
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect() {
    counter!("polymarket_ingest_reconnects_total").increment(1);
}

/// Update the live subscription size.
#[allow(clippy::cast_precision_loss)]
pub fn set_live_subscription_size(size: usize) {
    gauge!("polymarket_ingest_live_subscription_size").set(size as f64);
}

/// Record a store failure.
pub fn record_store_failure() {
    counter!("polymarket_ingest_store_failures_total").increment(1);
}

/// Record a publish failure.
pub fn record_publish_failure() {
    counter!("polymarket_ingest_publish_failures_total").increment(1);
}

/// Record records removed by retention cleanup.
pub fn record_records_purged(count: u64) {
    counter!("polymarket_ingest_records_purged_total").increment(count);
}

/// Record an operator command.
pub fn record_command(command: &str, outcome: CommandOutcome) {
    counter!(
        "polymarket_ingest_commands_total",
        "command" => command.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
