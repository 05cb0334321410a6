//! Coinbase Feed Client
//!
//! Owns the websocket session to a Coinbase feed endpoint:
//! `connect → subscribe → read loop → disconnect`. The read loop is
//! the sole writer to the sequence cache and the sole producer into
//! the relay queue; duplicate frames never leave this module.
//!
//! A transport-level read error is fatal: the loop terminates and the
//! error propagates to the caller. There is no automatic reconnect.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::dedup::SequenceCache;
use super::messages::{ChannelSpec, SubscribeRequest};
use crate::application::ingest::queue::RelaySender;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the feed client.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// Dial or handshake failure; fatal to startup.
    #[error("feed connection failed: {0}")]
    Connection(String),

    /// Control message sent out of order, e.g. subscribe before
    /// connect.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Mid-stream websocket failure; terminates the read loop.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The server closed the connection.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// The relay queue's receiver went away.
    #[error("relay queue closed")]
    QueueClosed,
}

// =============================================================================
// Feed Client
// =============================================================================

/// Websocket client for a Coinbase feed.
///
/// State progression is `Disconnected → Connected → Subscribed →
/// Reading → Disconnected`, terminal on explicit stop or on an
/// unrecoverable read error. Calling [`Self::disconnect`] twice after
/// a failure is undefined and should be avoided by callers.
pub struct FeedClient {
    url: String,
    dedup: Arc<SequenceCache>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    source: parking_lot::Mutex<Option<WsSource>>,
}

impl FeedClient {
    /// Create a client for the given feed URL.
    #[must_use]
    pub fn new(url: impl Into<String>, dedup: Arc<SequenceCache>) -> Self {
        Self {
            url: url.into(),
            dedup,
            sink: tokio::sync::Mutex::new(None),
            source: parking_lot::Mutex::new(None),
        }
    }

    /// Open the websocket session.
    ///
    /// # Errors
    ///
    /// Returns [`FeedClientError::Connection`] on dial or handshake
    /// failure.
    pub async fn connect(&self) -> Result<(), FeedClientError> {
        tracing::info!(url = %self.url, "connecting to feed");

        let (stream, response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| FeedClientError::Connection(e.to_string()))?;

        tracing::info!(status = %response.status(), "feed connected");

        let (sink, source) = stream.split();
        *self.sink.lock().await = Some(sink);
        *self.source.lock() = Some(source);
        Ok(())
    }

    /// Send the subscription control message.
    ///
    /// # Errors
    ///
    /// Returns [`FeedClientError::Protocol`] if the session is not yet
    /// connected, or a websocket error if the send fails.
    pub async fn subscribe(
        &self,
        product_ids: &[String],
        channel: ChannelSpec,
    ) -> Result<(), FeedClientError> {
        let request = SubscribeRequest::new(product_ids, channel);
        let json = serde_json::to_string(&request)
            .map_err(|e| FeedClientError::Protocol(format!("unserializable subscribe: {e}")))?;

        let mut sink = self.sink.lock().await;
        let sink = sink
            .as_mut()
            .ok_or_else(|| FeedClientError::Protocol("subscribe before connect".to_string()))?;

        tracing::info!(message = %json, "sending subscribe");
        sink.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Run the framed read loop until stopped or the transport fails.
    ///
    /// Each successfully read text frame passes through the sequence
    /// cache; unexpired duplicates are dropped without forwarding.
    /// The stop token is observed between reads only; an in-flight
    /// blocking read is not interrupted; [`Self::disconnect`] closes
    /// the transport, which unblocks it. A close or transport error
    /// seen after the token was cancelled is an orderly exit, not a
    /// failure.
    ///
    /// The sender is dropped on every exit path, closing the relay
    /// queue.
    ///
    /// # Errors
    ///
    /// Returns [`FeedClientError::Protocol`] if called before
    /// [`Self::connect`], or the transport error that terminated the
    /// loop.
    pub async fn read_loop(
        &self,
        frames: RelaySender<String>,
        stop: CancellationToken,
    ) -> Result<(), FeedClientError> {
        let mut source = self
            .source
            .lock()
            .take()
            .ok_or_else(|| FeedClientError::Protocol("read before connect".to_string()))?;

        loop {
            if stop.is_cancelled() {
                tracing::info!("feed read loop stopped");
                return Ok(());
            }

            match source.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Some(sequence) = frame_sequence(text.as_str())
                        && self.dedup.seen_or_record(sequence)
                    {
                        tracing::debug!(sequence, "skipping duplicate sequence");
                        continue;
                    }

                    if frames.send(text.to_string()).await.is_err() {
                        return Err(FeedClientError::QueueClosed);
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let mut sink = self.sink.lock().await;
                    if let Some(sink) = sink.as_mut() {
                        sink.send(Message::Pong(payload)).await?;
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    if stop.is_cancelled() {
                        tracing::info!("feed read loop stopped");
                        return Ok(());
                    }
                    tracing::info!("server sent close frame");
                    return Err(FeedClientError::ConnectionClosed);
                }
                Some(Ok(_)) => {
                    // Binary and pong frames are not part of the feed
                    // protocol; ignore them.
                }
                Some(Err(e)) => {
                    if stop.is_cancelled() {
                        tracing::info!("feed read loop stopped");
                        return Ok(());
                    }
                    tracing::error!(error = %e, "feed read failed");
                    return Err(e.into());
                }
                None => {
                    if stop.is_cancelled() {
                        tracing::info!("feed read loop stopped");
                        return Ok(());
                    }
                    tracing::info!("feed stream ended");
                    return Err(FeedClientError::ConnectionClosed);
                }
            }
        }
    }

    /// Send a close frame best-effort and tear down the transport.
    ///
    /// # Errors
    ///
    /// Returns a websocket error if closing the sink fails; the close
    /// frame itself is sent with errors ignored.
    pub async fn disconnect(&self) -> Result<(), FeedClientError> {
        tracing::info!("disconnecting from feed");

        let mut sink = self.sink.lock().await;
        if let Some(mut sink) = sink.take() {
            let _ = sink.send(Message::Close(None)).await;
            sink.close().await?;
        }

        tracing::info!("feed disconnected");
        Ok(())
    }
}

/// Extract the feed sequence number from a frame, if it carries one.
///
/// Frames without a sequence (or that are not JSON objects) bypass
/// deduplication entirely.
fn frame_sequence(text: &str) -> Option<i64> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    #[allow(clippy::cast_possible_truncation)]
    value.get("sequence").and_then(serde_json::Value::as_f64).map(|s| s as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ingest::queue;

    #[test]
    fn frame_sequence_extraction() {
        assert_eq!(frame_sequence(r#"{"sequence": 42, "type": "ticker"}"#), Some(42));
        assert_eq!(frame_sequence(r#"{"sequence": 42.0}"#), Some(42));
        assert_eq!(frame_sequence(r#"{"type": "ticker"}"#), None);
        assert_eq!(frame_sequence("not json"), None);
    }

    #[tokio::test]
    async fn subscribe_before_connect_is_a_protocol_error() {
        let client = FeedClient::new("wss://example.invalid", Arc::new(SequenceCache::with_defaults()));

        let result = client
            .subscribe(
                &["BTC-USD".to_string()],
                ChannelSpec::Single("market_trades".to_string()),
            )
            .await;

        assert!(matches!(result, Err(FeedClientError::Protocol(_))));
    }

    #[tokio::test]
    async fn read_before_connect_is_a_protocol_error() {
        let client = FeedClient::new("wss://example.invalid", Arc::new(SequenceCache::with_defaults()));
        let (tx, _rx) = queue::bounded::<String>(4);

        let result = client.read_loop(tx, CancellationToken::new()).await;
        assert!(matches!(result, Err(FeedClientError::Protocol(_))));
    }
}
