//! In-Process Partitioned Log
//!
//! A named, ordered, appendable stream store. Topics are created on
//! first append with a fixed partition count; appends are placed
//! round-robin and acknowledged with `(partition, offset)`. Committed
//! offsets are tracked per consumer group so a new session resumes
//! where the last successful handler left off.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Default partition count for newly-created topics.
pub const DEFAULT_PARTITIONS: usize = 3;

// =============================================================================
// Placement
// =============================================================================

/// Where an acknowledged append landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Partition the record was appended to.
    pub partition: usize,
    /// Offset of the record within that partition.
    pub offset: u64,
}

/// Append failure.
#[derive(Debug, thiserror::Error)]
pub enum AppendError {
    /// The log was closed; no further appends are accepted.
    #[error("log is closed")]
    Closed,
}

// =============================================================================
// Memory Log
// =============================================================================

#[derive(Debug, Default)]
struct TopicState {
    partitions: Vec<Vec<Arc<[u8]>>>,
    next_partition: usize,
    /// Committed next-offset per (group, partition).
    committed: HashMap<(String, usize), u64>,
}

/// In-process partitioned log.
#[derive(Debug)]
pub struct MemoryLog {
    partitions: usize,
    topics: parking_lot::Mutex<HashMap<String, TopicState>>,
    data: Notify,
    closed: AtomicBool,
}

impl MemoryLog {
    /// Create a log whose topics carry the given partition count.
    #[must_use]
    pub fn new(partitions: usize) -> Self {
        Self {
            partitions: partitions.max(1),
            topics: parking_lot::Mutex::new(HashMap::new()),
            data: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a log with the default partition count.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_PARTITIONS)
    }

    /// Partition count applied to every topic.
    #[must_use]
    pub const fn partitions(&self) -> usize {
        self.partitions
    }

    /// Append a record to a topic, creating the topic on first use.
    ///
    /// Placement is round-robin across partitions. Waiting consumers
    /// are woken.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Closed`] once the log has been closed.
    pub fn append(&self, topic: &str, payload: Vec<u8>) -> Result<Placement, AppendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AppendError::Closed);
        }

        let placement = {
            let mut topics = self.topics.lock();
            let state = topics
                .entry(topic.to_string())
                .or_insert_with(|| TopicState {
                    partitions: vec![Vec::new(); self.partitions],
                    ..TopicState::default()
                });

            let partition = state.next_partition;
            state.next_partition = (state.next_partition + 1) % self.partitions;

            state.partitions[partition].push(Arc::from(payload));
            Placement {
                partition,
                offset: (state.partitions[partition].len() - 1) as u64,
            }
        };

        self.data.notify_waiters();
        Ok(placement)
    }

    /// Fetch the record at `offset` in a topic partition, if present.
    #[must_use]
    pub fn fetch(&self, topic: &str, partition: usize, offset: u64) -> Option<Arc<[u8]>> {
        let topics = self.topics.lock();
        let state = topics.get(topic)?;
        let records = state.partitions.get(partition)?;
        records.get(usize::try_from(offset).ok()?).cloned()
    }

    /// Fetch the record at `offset`, waiting until it is appended.
    ///
    /// Returns `None` when cancelled, or when the log is closed and
    /// the record will never exist.
    pub async fn fetch_wait(
        &self,
        topic: &str,
        partition: usize,
        offset: u64,
        cancel: &CancellationToken,
    ) -> Option<Arc<[u8]>> {
        loop {
            // Register for wakeup before the check to avoid losing a
            // notification between the check and the await.
            let notified = self.data.notified();

            if let Some(record) = self.fetch(topic, partition, offset) {
                return Some(record);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }

            tokio::select! {
                () = cancel.cancelled() => return None,
                () = notified => {}
            }
        }
    }

    /// Number of records appended to a topic partition.
    #[must_use]
    pub fn end_offset(&self, topic: &str, partition: usize) -> u64 {
        let topics = self.topics.lock();
        topics
            .get(topic)
            .and_then(|state| state.partitions.get(partition))
            .map_or(0, |records| records.len() as u64)
    }

    /// Mark records below `next_offset` as processed for a group.
    ///
    /// Commits only move forward; a lower commit is ignored.
    pub fn commit(&self, group: &str, topic: &str, partition: usize, next_offset: u64) {
        let mut topics = self.topics.lock();
        if let Some(state) = topics.get_mut(topic) {
            let entry = state
                .committed
                .entry((group.to_string(), partition))
                .or_insert(0);
            *entry = (*entry).max(next_offset);
        }
    }

    /// The committed next-offset for a group on a topic partition.
    #[must_use]
    pub fn committed(&self, group: &str, topic: &str, partition: usize) -> u64 {
        let topics = self.topics.lock();
        topics
            .get(topic)
            .and_then(|state| state.committed.get(&(group.to_string(), partition)))
            .copied()
            .unwrap_or(0)
    }

    /// Close the log: appends fail and blocked fetches drain out.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.data.notify_waiters();
    }

    /// Whether the log has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_round_robin_across_partitions() {
        let log = MemoryLog::new(3);

        let p0 = log.append("t", b"a".to_vec()).unwrap();
        let p1 = log.append("t", b"b".to_vec()).unwrap();
        let p2 = log.append("t", b"c".to_vec()).unwrap();
        let p3 = log.append("t", b"d".to_vec()).unwrap();

        assert_eq!(p0, Placement { partition: 0, offset: 0 });
        assert_eq!(p1, Placement { partition: 1, offset: 0 });
        assert_eq!(p2, Placement { partition: 2, offset: 0 });
        assert_eq!(p3, Placement { partition: 0, offset: 1 });
    }

    #[test]
    fn fetch_returns_appended_payloads_in_order() {
        let log = MemoryLog::new(1);
        let _ = log.append("t", b"first".to_vec()).unwrap();
        let _ = log.append("t", b"second".to_vec()).unwrap();

        assert_eq!(&*log.fetch("t", 0, 0).unwrap(), b"first");
        assert_eq!(&*log.fetch("t", 0, 1).unwrap(), b"second");
        assert!(log.fetch("t", 0, 2).is_none());
        assert!(log.fetch("missing", 0, 0).is_none());
    }

    #[test]
    fn commits_are_per_group_and_only_move_forward() {
        let log = MemoryLog::new(1);
        let _ = log.append("t", b"a".to_vec()).unwrap();

        log.commit("g1", "t", 0, 5);
        log.commit("g1", "t", 0, 3);
        log.commit("g2", "t", 0, 1);

        assert_eq!(log.committed("g1", "t", 0), 5);
        assert_eq!(log.committed("g2", "t", 0), 1);
        assert_eq!(log.committed("g3", "t", 0), 0);
    }

    #[tokio::test]
    async fn fetch_wait_wakes_on_append() {
        let log = Arc::new(MemoryLog::new(1));
        let cancel = CancellationToken::new();

        let waiter = {
            let log = Arc::clone(&log);
            let cancel = cancel.clone();
            tokio::spawn(async move { log.fetch_wait("t", 0, 0, &cancel).await })
        };

        tokio::task::yield_now().await;
        let _ = log.append("t", b"hello".to_vec()).unwrap();

        let record = waiter.await.unwrap().unwrap();
        assert_eq!(&*record, b"hello");
    }

    #[tokio::test]
    async fn fetch_wait_drains_out_on_close() {
        let log = Arc::new(MemoryLog::new(1));
        let cancel = CancellationToken::new();

        let waiter = {
            let log = Arc::clone(&log);
            let cancel = cancel.clone();
            tokio::spawn(async move { log.fetch_wait("t", 0, 0, &cancel).await })
        };

        tokio::task::yield_now().await;
        log.close();

        assert!(waiter.await.unwrap().is_none());
        assert!(matches!(log.append("t", vec![]), Err(AppendError::Closed)));
    }
}
