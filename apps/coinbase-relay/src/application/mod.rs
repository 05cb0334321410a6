//! Application Layer - Pipeline orchestration.
//!
//! The two stages of the pipeline, each owning its loops and shutdown:
//!
//! - `ingest`: feed read loop, bounded relay queue, publish loop
//! - `signal`: consumer group, tumbling window, idle-poll backoff

/// Ingest stage: websocket feed into the partitioned log.
pub mod ingest;

/// Signal stage: republished trades into average-price signals.
pub mod signal;
