//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Polymarket market channel: transport, codec, router and supervisor.
pub mod polymarket;

/// Broadcast fan-out adapter for notifications.
pub mod broadcast;

/// In-process operator command queue.
pub mod commands;

/// Configuration loading.
pub mod config;

/// Health, metrics and operator HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Book event persistence adapters.
pub mod store;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;

/// Watch-list file adapter.
pub mod watchlist;
