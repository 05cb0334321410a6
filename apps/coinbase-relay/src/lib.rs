#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Coinbase Stream Relay - Market Data Pipeline
//!
//! Ingests the Coinbase websocket feed over a persistent connection,
//! deduplicates and normalizes individual trade records, republishes
//! them onto a partitioned log, and runs a second-stage consumer that
//! aggregates the republished stream into rolling average-price signals.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core record types and window logic
//!   - `trade`: Canonical trade event and relay payload types
//!   - `signal`: Tumbling aggregation window and emitted signals
//!
//! - **Application**: Pipeline orchestration
//!   - `ingest`: Feed read loop, bounded relay queue, relay loop
//!   - `signal`: Log consumption, windowing, backoff polling
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `coinbase`: WebSocket feed client, dedup cache, normalizer
//!   - `log`: Partitioned log, producer, group consumer
//!   - `config`: Environment-driven configuration
//!   - `telemetry`: Structured logging setup
//!
//! # Data Flow
//!
//! ```text
//! Coinbase WS ──► dedup ──► normalize ──► bounded queue ──► trade log
//!                                                               │
//!                           signal log ◄── window(10) ◄── consumer group
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core record and window types.
pub mod domain;

/// Application layer - Pipeline orchestration services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::signal::{PricePoint, Signal, SignalWindow};
pub use domain::trade::{RelayMessage, TradeEvent};

// Application services
pub use application::ingest::{IngestService, IngestSettings, RelayMode};
pub use application::signal::{
    BackoffConfig, BackoffPoller, SignalError, SignalService, SignalSettings,
};

// Feed client (for integration tests)
pub use infrastructure::coinbase::client::{FeedClient, FeedClientError};
pub use infrastructure::coinbase::dedup::SequenceCache;
pub use infrastructure::coinbase::messages::{ChannelSpec, SubscribeRequest};
pub use infrastructure::coinbase::normalizer::{NormalizeError, NormalizedBatch, TradeNormalizer};

// Log adapters (for integration tests)
pub use infrastructure::log::broker::{MemoryLog, Placement};
pub use infrastructure::log::consumer::{ConsumerConfig, GroupConsumer, HandlerError, RecordHandler};
pub use infrastructure::log::producer::{LogProducer, PublishError};

// Configuration
pub use infrastructure::config::{ConfigError, FeedChannel, RelayConfig};
