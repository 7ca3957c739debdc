//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (market channel, store, notifications, commands).
pub mod ports;

/// Long-running services: reconciliation, command intake, dispatch and retention.
pub mod services;
