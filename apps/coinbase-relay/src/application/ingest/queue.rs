//! Bounded Relay Queue
//!
//! The decoupling buffer between the feed read loop and the publish
//! loop. The queue is bounded; when the publisher falls behind, sends
//! block until space frees up. Nothing is dropped from the producer
//! side.

use tokio::sync::mpsc;

/// Error returned when the receiving half of the queue is gone.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("relay queue receiver dropped")]
pub struct QueueClosed;

/// Sending half of a relay queue.
#[derive(Debug)]
pub struct RelaySender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for RelaySender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> RelaySender<T> {
    /// Enqueue an item, waiting for capacity when the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] when the receiver has been dropped.
    pub async fn send(&self, item: T) -> Result<(), QueueClosed> {
        self.tx.send(item).await.map_err(|_| QueueClosed)
    }

    /// Whether the receiving half is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of a relay queue.
#[derive(Debug)]
pub struct RelayReceiver<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> RelayReceiver<T> {
    /// Dequeue the next item, waiting until one arrives.
    ///
    /// Returns `None` once every sender is dropped and the queue has
    /// drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Close the queue; in-flight items can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Create a bounded relay queue.
///
/// # Panics
///
/// Panics if `capacity` is zero, matching the underlying channel.
#[must_use]
pub fn bounded<T>(capacity: usize) -> (RelaySender<T>, RelayReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (RelaySender { tx }, RelayReceiver { rx })
}
