//! Ingest Stage
//!
//! Orchestrates the first half of the pipeline: connect and subscribe
//! to the feed, run the read loop into a bounded relay queue, and
//! drain that queue into the partitioned log. Trade channels are
//! normalized per record before publish; ticker channels relay raw
//! frames with the leading subscription ack discarded.

pub mod queue;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::trade::RelayMessage;
use crate::infrastructure::coinbase::client::{FeedClient, FeedClientError};
use crate::infrastructure::coinbase::messages::ChannelSpec;
use crate::infrastructure::coinbase::normalizer::TradeNormalizer;
use crate::infrastructure::log::producer::LogProducer;
use queue::RelayReceiver;

/// How the relay loop treats dequeued frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Normalize each trade record out of the frame before publish.
    Trades,
    /// Publish frames as received; the first frame is the subscription
    /// ack and is discarded.
    Passthrough,
}

/// Ingest stage settings.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Products to subscribe.
    pub product_ids: Vec<String>,
    /// Channel selection for the subscribe request.
    pub channel: ChannelSpec,
    /// Topic to publish onto.
    pub topic: String,
    /// Relay queue capacity.
    pub queue_capacity: usize,
    /// Frame treatment in the relay loop.
    pub mode: RelayMode,
}

/// First-stage service: feed in, partitioned log out.
pub struct IngestService {
    client: Arc<FeedClient>,
    producer: LogProducer,
    settings: IngestSettings,
    cancel: CancellationToken,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl IngestService {
    /// Create the stage; call [`Self::start`] to begin relaying.
    #[must_use]
    pub fn new(client: Arc<FeedClient>, producer: LogProducer, settings: IngestSettings) -> Self {
        Self {
            client,
            producer,
            settings,
            cancel: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Connect, subscribe, and spawn the read and relay loops.
    ///
    /// # Errors
    ///
    /// Returns a [`FeedClientError`] when the connection or the
    /// subscribe handshake fails.
    pub async fn start(&self) -> Result<(), FeedClientError> {
        self.client.connect().await?;
        self.client
            .subscribe(&self.settings.product_ids, self.settings.channel.clone())
            .await?;

        let (tx, rx) = queue::bounded(self.settings.queue_capacity);

        let reader = {
            let client = Arc::clone(&self.client);
            let stop = self.cancel.clone();
            tokio::spawn(async move {
                match client.read_loop(tx, stop).await {
                    Ok(()) => info!("feed read loop exited"),
                    Err(FeedClientError::QueueClosed) => {
                        info!("relay queue closed; read loop exited");
                    }
                    Err(error) => error!(%error, "feed read loop failed"),
                }
            })
        };

        let relayer = {
            let producer = self.producer.clone();
            let topic = self.settings.topic.clone();
            let mode = self.settings.mode;
            tokio::spawn(async move {
                relay_frames(rx, &producer, mode, &topic).await;
            })
        };

        let mut tasks = self.tasks.lock();
        tasks.push(reader);
        tasks.push(relayer);

        info!(
            topic = %self.settings.topic,
            mode = ?self.settings.mode,
            queue_capacity = self.settings.queue_capacity,
            "ingest stage started"
        );
        Ok(())
    }

    /// Stop the loops, close the feed session, and wait for drain.
    pub async fn stop(&self) {
        self.cancel.cancel();

        // Closing the transport unblocks an in-flight read; the stop
        // token alone only takes effect between frames.
        if let Err(error) = self.client.disconnect().await {
            warn!(%error, "feed disconnect failed");
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        info!("ingest stage stopped");
    }
}

/// Drain the relay queue into the log until the queue closes.
///
/// Publish failures are logged and the frame dropped; the loop only
/// ends when the queue does.
async fn relay_frames(
    mut rx: RelayReceiver<String>,
    producer: &LogProducer,
    mode: RelayMode,
    topic: &str,
) {
    let normalizer = TradeNormalizer::new();
    let mut first_frame = true;

    while let Some(frame) = rx.recv().await {
        match mode {
            RelayMode::Passthrough => {
                if first_frame {
                    first_frame = false;
                    debug!("discarding subscription ack frame");
                    continue;
                }
                let message = RelayMessage::new(topic, frame.into_bytes());
                if let Err(error) = producer.publish(&message) {
                    error!(%error, "frame publish failed");
                }
            }
            RelayMode::Trades => match normalizer.normalize(&frame) {
                Ok(batch) => {
                    for event in batch.events {
                        match event.into_relay_message(topic) {
                            Ok(message) => {
                                if let Err(error) = producer.publish(&message) {
                                    error!(%error, "trade publish failed");
                                }
                            }
                            Err(error) => warn!(%error, "unserializable trade dropped"),
                        }
                    }
                }
                Err(error) => warn!(%error, "malformed frame dropped"),
            },
        }
    }
    info!("relay loop drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::log::broker::MemoryLog;

    fn trade_frame(prices: &[&str]) -> String {
        let trades: Vec<String> = prices
            .iter()
            .map(|p| {
                format!(
                    r#"{{"product_id":"BTC-USD","price":"{p}","size":"0.5",
                        "trade_id":"7","time":"2024-01-15T10:00:00Z","side":"BUY"}}"#
                )
            })
            .collect();
        format!(
            r#"{{"channel":"market_trades","events":[{{"type":"snapshot","trades":[{}]}}]}}"#,
            trades.join(",")
        )
    }

    #[tokio::test]
    async fn trades_mode_publishes_one_record_per_trade() {
        let log = Arc::new(MemoryLog::new(1));
        let producer = LogProducer::new(Arc::clone(&log));
        let (tx, rx) = queue::bounded(8);

        tx.send(trade_frame(&["100.0", "101.0"])).await.unwrap();
        tx.send("not json".to_string()).await.unwrap();
        tx.send(trade_frame(&["102.0"])).await.unwrap();
        drop(tx);

        relay_frames(rx, &producer, RelayMode::Trades, "btc-usd").await;

        assert_eq!(log.end_offset("btc-usd", 0), 3);
        let first: serde_json::Value =
            serde_json::from_slice(&log.fetch("btc-usd", 0, 0).unwrap()).unwrap();
        assert_eq!(first["price"], serde_json::json!(100.0));
        assert_eq!(first["time"], serde_json::json!(1_705_312_800_000_i64));
    }

    #[tokio::test]
    async fn passthrough_mode_discards_only_the_first_frame() {
        let log = Arc::new(MemoryLog::new(1));
        let producer = LogProducer::new(Arc::clone(&log));
        let (tx, rx) = queue::bounded(8);

        tx.send(r#"{"type":"subscriptions"}"#.to_string()).await.unwrap();
        tx.send(r#"{"type":"ticker","price":"5"}"#.to_string()).await.unwrap();
        tx.send(r#"{"type":"ticker","price":"6"}"#.to_string()).await.unwrap();
        drop(tx);

        relay_frames(rx, &producer, RelayMode::Passthrough, "btc-usd").await;

        assert_eq!(log.end_offset("btc-usd", 0), 2);
        assert_eq!(
            &*log.fetch("btc-usd", 0, 0).unwrap(),
            br#"{"type":"ticker","price":"5"}"#
        );
    }
}
