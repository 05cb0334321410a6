//! Group Consumer
//!
//! Pulls records from every partition of a topic and hands them to a
//! [`RecordHandler`]. Offsets are committed manually, and only after
//! the handler returns success, so a record whose handling fails or
//! times out is delivered again on the next session (at-least-once).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::infrastructure::log::broker::MemoryLog;

/// Default wall-clock budget for a single record handler call.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Handler
// =============================================================================

/// Handler failure.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The handler did not return within its budget.
    #[error("handler timed out after {0:?}")]
    Timeout(Duration),
    /// The handler reported a processing failure.
    #[error("handler failed: {0}")]
    Failed(String),
}

/// Processes one record from the log.
#[async_trait]
pub trait RecordHandler: Send + Sync {
    /// Handle a single record payload.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the record could not be
    /// processed; its offset is then left uncommitted.
    async fn handle(&self, record: &[u8]) -> Result<(), HandlerError>;
}

// =============================================================================
// Consumer
// =============================================================================

/// Consumer session settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Topic to consume.
    pub topic: String,
    /// Consumer group whose committed offsets anchor the session.
    pub group: String,
    /// Per-record handler budget.
    pub handler_timeout: Duration,
}

impl ConsumerConfig {
    /// Settings for a topic and group with the default handler budget.
    #[must_use]
    pub fn new(topic: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            group: group.into(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }
}

/// Consumer group session over a shared [`MemoryLog`].
pub struct GroupConsumer {
    log: Arc<MemoryLog>,
    config: ConsumerConfig,
    cancel: CancellationToken,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl GroupConsumer {
    /// Create a consumer session; call [`Self::start`] to begin delivery.
    #[must_use]
    pub fn new(log: Arc<MemoryLog>, config: ConsumerConfig) -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        Self {
            log,
            config,
            cancel: CancellationToken::new(),
            ready_tx,
            ready_rx,
            tasks: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Spawn one delivery loop per partition, each resuming from the
    /// group's committed offset.
    pub fn start(&self, handler: Arc<dyn RecordHandler>) {
        let partitions = self.log.partitions();
        let mut tasks = self.tasks.lock();

        for partition in 0..partitions {
            let log = Arc::clone(&self.log);
            let handler = Arc::clone(&handler);
            let config = self.config.clone();
            let cancel = self.cancel.clone();

            tasks.push(tokio::spawn(async move {
                deliver_partition(log, handler, config, partition, cancel).await;
            }));
        }

        let _ = self.ready_tx.send(true);
        info!(
            topic = %self.config.topic,
            group = %self.config.group,
            partitions,
            "consumer session started"
        );
    }

    /// Wait until the delivery loops have been spawned.
    pub async fn ready(&self) {
        let mut rx = self.ready_rx.clone();
        // Ignores a dropped sender; the session owns it for its lifetime.
        let _ = rx.wait_for(|started| *started).await;
    }

    /// Stop delivery and wait for the loops to wind down.
    pub async fn close(&self) {
        self.cancel.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        info!(topic = %self.config.topic, group = %self.config.group, "consumer session closed");
    }
}

async fn deliver_partition(
    log: Arc<MemoryLog>,
    handler: Arc<dyn RecordHandler>,
    config: ConsumerConfig,
    partition: usize,
    cancel: CancellationToken,
) {
    let mut position = log.committed(&config.group, &config.topic, partition);
    // Lowest offset whose handling failed this session. Commits never
    // pass it, so the next session replays it and everything after.
    let mut failed_floor: Option<u64> = None;
    debug!(
        topic = %config.topic,
        group = %config.group,
        partition,
        start_offset = position,
        "delivery loop started"
    );

    while !cancel.is_cancelled() {
        let Some(record) = log.fetch_wait(&config.topic, partition, position, &cancel).await
        else {
            break;
        };

        let outcome = match timeout(config.handler_timeout, handler.handle(&record)).await {
            Ok(result) => result,
            Err(_) => Err(HandlerError::Timeout(config.handler_timeout)),
        };

        match outcome {
            Ok(()) if failed_floor.is_none() => {
                log.commit(&config.group, &config.topic, partition, position + 1);
            }
            Ok(()) => {}
            Err(error) => {
                if failed_floor.is_none() {
                    failed_floor = Some(position);
                }
                warn!(
                    topic = %config.topic,
                    partition,
                    offset = position,
                    %error,
                    "record handling failed; offset left uncommitted"
                );
            }
        }

        // The session keeps reading either way, but once an offset has
        // failed the commit stays behind it and the next session
        // redelivers from there.
        position += 1;
    }
}
