//! Domain Layer - Core record types and window logic.
//!
//! This layer contains the canonical data types flowing through the
//! pipeline and the tumbling-window aggregation logic. All types here
//! are pure Rust with serialization support.

/// Canonical trade event and relay payload types.
pub mod trade;

/// Tumbling aggregation window and emitted signals.
pub mod signal;
