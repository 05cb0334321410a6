//! Idle-Poll Backoff
//!
//! Exponential backoff for the aggregation loop's empty polls. Each
//! consecutive empty poll doubles the sleep; any consumed record
//! resets the schedule. The retry budget bounds how long the stage
//! tolerates a silent upstream before treating it as dead.

use std::time::Duration;

/// Configuration for idle-poll backoff.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Consecutive empty polls tolerated before giving up.
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(5),
            max_retries: 100,
        }
    }
}

/// Doubling backoff schedule with a retry budget.
#[derive(Debug)]
pub struct BackoffPoller {
    config: BackoffConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl BackoffPoller {
    /// Create a poller at the start of its schedule.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        let base_delay = config.base_delay;
        Self {
            config,
            current_delay: base_delay,
            attempt_count: 0,
        }
    }

    /// Get the next delay, doubling for subsequent calls.
    ///
    /// Returns `None` once the retry budget is spent.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt_count >= self.config.max_retries {
            return None;
        }
        self.attempt_count += 1;

        let delay = self.current_delay;
        // Doubling 100 times from any base overflows; saturate.
        self.current_delay = self.current_delay.saturating_mul(2);
        Some(delay)
    }

    /// Reset the schedule after a successful poll.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.base_delay;
        self.attempt_count = 0;
    }

    /// Get the consecutive empty-poll count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check whether the budget still allows another retry.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.attempt_count < self.config.max_retries
    }
}

impl Default for BackoffPoller {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
