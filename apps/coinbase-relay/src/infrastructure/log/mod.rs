//! Partitioned Log Adapters
//!
//! The durable broker the pipeline publishes to is an external
//! collaborator; this module implements its assumed interface
//! (partitioned, ordered-within-partition, at-least-once delivery
//! with per-group committed offsets and acknowledged appends) as an
//! in-process log so producer and consumer semantics are real and
//! testable. Swapping in an external broker client is a deployment
//! concern.
//!
//! - **broker**: The partitioned log itself
//! - **producer**: Synchronous acknowledged publish with placement
//! - **consumer**: Group consumption with manual offset commit

pub mod broker;
pub mod consumer;
pub mod producer;

pub use broker::{AppendError, MemoryLog, Placement};
pub use consumer::{ConsumerConfig, GroupConsumer, HandlerError, RecordHandler};
pub use producer::{LogProducer, PublishError};
