//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete adapters the application services
//! are wired to: the websocket feed client, the partitioned log, and
//! process-level concerns.

/// Coinbase websocket feed adapters (client, dedup cache, normalizer).
pub mod coinbase;

/// Partitioned log adapters (broker, producer, group consumer).
pub mod log;

/// Configuration loaded from environment variables.
pub mod config;

/// Structured logging setup.
pub mod telemetry;
