//! Domain Layer - Core book ingestion types and decisions.
//!
//! This layer contains the venue-agnostic types for book events,
//! connection lifecycle and subscription sets. Nothing here performs I/O.

/// Normalized book events and their building blocks.
pub mod book;

/// Connection lifecycle states and inbound frames.
pub mod streaming;

/// Desired/live subscription sets and the reconcile decision.
pub mod subscription;
