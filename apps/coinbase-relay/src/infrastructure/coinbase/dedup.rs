//! Sequence Deduplication Cache
//!
//! A time-windowed set of previously-seen feed sequence numbers. The
//! read loop asks "seen before?" for every frame that carries a
//! sequence; entries expire after a fixed time-to-live so memory stays
//! bounded to recently-seen identifiers. Expired entries are removed
//! by a periodic janitor sweep that runs independently of lookups.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How long a recorded sequence number is considered "seen".
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// How often the janitor sweeps expired entries.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(120);

/// Time-windowed cache of seen sequence numbers.
///
/// Lookups and inserts go through a single mutex; only the feed read
/// loop and the janitor touch it, so contention is negligible.
#[derive(Debug)]
pub struct SequenceCache {
    ttl: Duration,
    sweep_interval: Duration,
    entries: parking_lot::Mutex<HashMap<i64, Instant>>,
}

impl SequenceCache {
    /// Create a cache with explicit TTL and sweep interval.
    #[must_use]
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            ttl,
            sweep_interval,
            entries: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Create a cache with the reference TTL (1 minute) and sweep
    /// interval (2 minutes).
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_SWEEP_INTERVAL)
    }

    /// Check whether `sequence` was seen within the TTL, recording it
    /// if not.
    ///
    /// Returns `true` (state unchanged) for an unexpired duplicate;
    /// otherwise records the sequence with a fresh TTL and returns
    /// `false`.
    pub fn seen_or_record(&self, sequence: i64) -> bool {
        self.seen_or_record_at(sequence, Instant::now())
    }

    /// Clock-injected variant of [`Self::seen_or_record`] for
    /// deterministic expiry testing.
    pub fn seen_or_record_at(&self, sequence: i64, now: Instant) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(&sequence) {
            Some(first_seen) if now.duration_since(*first_seen) < self.ttl => true,
            _ => {
                entries.insert(sequence, now);
                false
            }
        }
    }

    /// Remove all entries whose TTL has elapsed.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    /// Clock-injected variant of [`Self::sweep`].
    pub fn sweep_at(&self, now: Instant) {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, first_seen| now.duration_since(*first_seen) < self.ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = entries.len(), "swept expired sequences");
        }
    }

    /// Number of currently-tracked sequences, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Run the eviction janitor until cancelled.
    ///
    /// Sweeps every configured interval regardless of lookup traffic.
    pub async fn run_janitor(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.sweep_interval);
        // The first tick completes immediately; skip it so the first
        // sweep happens one full interval after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("sequence cache janitor stopped");
                    return;
                }
                _ = ticker.tick() => self.sweep(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_sighting_within_ttl_is_seen() {
        let cache = SequenceCache::with_defaults();
        let now = Instant::now();

        assert!(!cache.seen_or_record_at(42, now));
        assert!(cache.seen_or_record_at(42, now + Duration::from_secs(30)));
    }

    #[test]
    fn expired_sequence_is_treated_as_new() {
        let cache = SequenceCache::new(Duration::from_secs(60), Duration::from_secs(120));
        let now = Instant::now();

        assert!(!cache.seen_or_record_at(7, now));
        // One full TTL later the entry no longer counts as seen and is
        // re-recorded with a fresh TTL.
        assert!(!cache.seen_or_record_at(7, now + Duration::from_secs(60)));
        assert!(cache.seen_or_record_at(7, now + Duration::from_secs(90)));
    }

    #[test]
    fn distinct_sequences_are_independent() {
        let cache = SequenceCache::with_defaults();
        let now = Instant::now();

        assert!(!cache.seen_or_record_at(1, now));
        assert!(!cache.seen_or_record_at(2, now));
        assert!(cache.seen_or_record_at(1, now));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn sweep_evicts_only_expired_entries() {
        let cache = SequenceCache::new(Duration::from_secs(60), Duration::from_secs(120));
        let now = Instant::now();

        let _ = cache.seen_or_record_at(1, now);
        let _ = cache.seen_or_record_at(2, now + Duration::from_secs(45));
        assert_eq!(cache.len(), 2);

        cache.sweep_at(now + Duration::from_secs(70));
        assert_eq!(cache.len(), 1);
        assert!(cache.seen_or_record_at(2, now + Duration::from_secs(70)));
    }

    #[tokio::test(start_paused = true)]
    async fn janitor_sweeps_on_interval() {
        let cache = Arc::new(SequenceCache::new(
            Duration::from_millis(50),
            Duration::from_millis(100),
        ));
        let cancel = CancellationToken::new();
        let janitor = tokio::spawn(Arc::clone(&cache).run_janitor(cancel.clone()));

        assert!(!cache.seen_or_record(9));
        assert_eq!(cache.len(), 1);

        // Advance past the entry's TTL and one sweep interval.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.is_empty());

        cancel.cancel();
        janitor.await.unwrap();
    }
}
