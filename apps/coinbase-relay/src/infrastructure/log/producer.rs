//! Log Producer
//!
//! Adapts the relay pipeline onto the partitioned log. Publishes block
//! until the log acknowledges placement; nothing is dropped on the
//! producer side.

use std::sync::Arc;

use tracing::debug;

use crate::domain::trade::RelayMessage;
use crate::infrastructure::log::broker::{AppendError, MemoryLog, Placement};

/// Publish failure.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The log rejected the append.
    #[error("append failed: {0}")]
    Append(#[from] AppendError),
}

/// Producer handle over a shared [`MemoryLog`].
#[derive(Debug, Clone)]
pub struct LogProducer {
    log: Arc<MemoryLog>,
}

impl LogProducer {
    /// Create a producer over the given log.
    #[must_use]
    pub fn new(log: Arc<MemoryLog>) -> Self {
        Self { log }
    }

    /// Publish a message and wait for its acknowledged placement.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Append`] when the log has been closed.
    pub fn publish(&self, message: &RelayMessage) -> Result<Placement, PublishError> {
        let placement = self.log.append(&message.topic, message.payload.clone())?;
        debug!(
            topic = %message.topic,
            partition = placement.partition,
            offset = placement.offset,
            "message published"
        );
        Ok(placement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_reports_placement() {
        let log = Arc::new(MemoryLog::new(2));
        let producer = LogProducer::new(Arc::clone(&log));

        let message = RelayMessage::new("btc-usd", b"{}".to_vec());
        let placement = producer.publish(&message).unwrap();

        assert_eq!(placement, Placement { partition: 0, offset: 0 });
        assert_eq!(&*log.fetch("btc-usd", 0, 0).unwrap(), b"{}");
    }

    #[test]
    fn publish_fails_after_close() {
        let log = Arc::new(MemoryLog::new(1));
        let producer = LogProducer::new(Arc::clone(&log));
        log.close();

        let message = RelayMessage::new("btc-usd", b"{}".to_vec());
        assert!(producer.publish(&message).is_err());
    }
}
