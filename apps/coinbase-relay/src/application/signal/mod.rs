//! Signal Stage
//!
//! The second half of the pipeline: consume the republished trade
//! stream from the log, fill a tumbling price window, and publish an
//! average-price signal each time the window turns over. The
//! aggregation loop polls a hand-off channel fed by the consumer
//! group; empty polls back off exponentially and a fully silent
//! upstream eventually terminates the stage.

pub mod backoff;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::signal::{PricePoint, SignalWindow};
use crate::domain::trade::RelayMessage;
use crate::infrastructure::log::broker::MemoryLog;
use crate::infrastructure::log::consumer::{ConsumerConfig, GroupConsumer, HandlerError, RecordHandler};
use crate::infrastructure::log::producer::LogProducer;
pub use backoff::{BackoffConfig, BackoffPoller};

/// Records buffered between the consumer group and the window loop.
const HANDOFF_CAPACITY: usize = 1_000;

/// Signal stage failure.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// The upstream stayed silent through the whole backoff budget.
    #[error("no records after {retries} polls; upstream presumed dead")]
    BackoffExhausted {
        /// Empty polls consumed before giving up.
        retries: u32,
    },
}

/// Signal stage settings.
#[derive(Debug, Clone)]
pub struct SignalSettings {
    /// Topic carrying the republished trade stream.
    pub source_topic: String,
    /// Topic the emitted signals are published to.
    pub signal_topic: String,
    /// Consumer group anchoring committed offsets.
    pub consumer_group: String,
    /// Price points per tumbling window.
    pub window_size: usize,
    /// Idle-poll backoff schedule.
    pub backoff: BackoffConfig,
    /// Wall-clock budget for handling one consumed record.
    pub handler_timeout: Duration,
}

/// Hands consumed records to the aggregation loop over a channel.
///
/// The send blocks when the loop falls behind, which holds off the
/// consumer's commit until the record is actually buffered.
struct ChannelHandler {
    tx: mpsc::Sender<Vec<u8>>,
}

#[async_trait]
impl RecordHandler for ChannelHandler {
    async fn handle(&self, record: &[u8]) -> Result<(), HandlerError> {
        self.tx
            .send(record.to_vec())
            .await
            .map_err(|_| HandlerError::Failed("aggregation loop gone".to_string()))
    }
}

/// Second-stage service: trade log in, signal log out.
pub struct SignalService {
    consumer: GroupConsumer,
    producer: LogProducer,
    settings: SignalSettings,
}

impl SignalService {
    /// Create the stage over a shared log.
    #[must_use]
    pub fn new(log: Arc<MemoryLog>, settings: SignalSettings) -> Self {
        let mut config = ConsumerConfig::new(&settings.source_topic, &settings.consumer_group);
        config.handler_timeout = settings.handler_timeout;

        Self {
            consumer: GroupConsumer::new(Arc::clone(&log), config),
            producer: LogProducer::new(log),
            settings,
        }
    }

    /// Start consuming and spawn the aggregation loop.
    ///
    /// The returned handle resolves with `Ok` on orderly shutdown, or
    /// [`SignalError::BackoffExhausted`] when the upstream never
    /// produces within the backoff budget.
    pub async fn start(&self) -> JoinHandle<Result<(), SignalError>> {
        let (tx, rx) = mpsc::channel(HANDOFF_CAPACITY);
        self.consumer.start(Arc::new(ChannelHandler { tx }));
        self.consumer.ready().await;

        let producer = self.producer.clone();
        let window = SignalWindow::with_capacity(self.settings.window_size);
        let poller = BackoffPoller::new(self.settings.backoff.clone());
        let signal_topic = self.settings.signal_topic.clone();

        info!(
            source = %self.settings.source_topic,
            sink = %signal_topic,
            window = self.settings.window_size,
            "signal stage started"
        );
        tokio::spawn(aggregate(rx, producer, window, poller, signal_topic))
    }

    /// Stop consuming; the aggregation loop drains and exits cleanly.
    pub async fn stop(&self) {
        self.consumer.close().await;
        info!("signal stage stopped");
    }
}

/// Poll the hand-off channel into the window until it disconnects or
/// the backoff budget runs out.
async fn aggregate(
    mut rx: mpsc::Receiver<Vec<u8>>,
    producer: LogProducer,
    mut window: SignalWindow,
    mut poller: BackoffPoller,
    signal_topic: String,
) -> Result<(), SignalError> {
    loop {
        match rx.try_recv() {
            Ok(record) => {
                poller.reset();

                // An undecodable record still takes up a window slot;
                // its price just fails to parse.
                let value = serde_json::from_slice(&record)
                    .unwrap_or(serde_json::Value::Null);
                let point = PricePoint::from_record(&value);
                if point.price.is_none() {
                    warn!("record with unparseable price entered the window");
                }

                if let Some(signal) = window.push(point) {
                    // Fire-and-forget: the loop never waits on a
                    // publish, so signals may land out of emission
                    // order. They carry no sequence, so that is fine.
                    let producer = producer.clone();
                    let topic = signal_topic.clone();
                    tokio::spawn(async move {
                        publish_signal(&producer, &topic, &signal);
                    });
                }
            }
            Err(mpsc::error::TryRecvError::Empty) => match poller.next_delay() {
                Some(delay) => {
                    debug!(?delay, polls = poller.attempt_count(), "no records; backing off");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    let retries = poller.attempt_count();
                    error!(retries, "backoff budget exhausted");
                    return Err(SignalError::BackoffExhausted { retries });
                }
            },
            Err(mpsc::error::TryRecvError::Disconnected) => {
                info!("hand-off channel closed; aggregation loop exiting");
                return Ok(());
            }
        }
    }
}

fn publish_signal(producer: &LogProducer, topic: &str, signal: &crate::domain::signal::Signal) {
    match serde_json::to_vec(signal) {
        Ok(payload) => {
            let message = RelayMessage::new(topic, payload);
            match producer.publish(&message) {
                Ok(placement) => info!(
                    topic,
                    partition = placement.partition,
                    offset = placement.offset,
                    avg_price = signal.avg_price,
                    "signal published"
                ),
                Err(error) => error!(%error, "signal publish failed"),
            }
        }
        Err(error) => error!(%error, "unserializable signal dropped"),
    }
}
