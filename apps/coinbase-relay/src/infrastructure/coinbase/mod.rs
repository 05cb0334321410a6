//! Coinbase Feed Adapters
//!
//! Implements the websocket side of the pipeline:
//!
//! - **client**: Connection lifecycle and the framed read loop
//! - **dedup**: Time-windowed sequence-number cache
//! - **messages**: Subscribe control message shapes
//! - **normalizer**: `market_trades` frame normalization

pub mod client;
pub mod dedup;
pub mod messages;
pub mod normalizer;

pub use client::{FeedClient, FeedClientError};
pub use dedup::SequenceCache;
pub use messages::{ChannelSpec, SubscribeRequest};
pub use normalizer::{NormalizeError, NormalizedBatch, TradeNormalizer};
