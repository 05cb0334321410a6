//! Relay Configuration Settings
//!
//! Configuration types for the relay pipeline, loaded from environment
//! variables.

use std::time::Duration;

use crate::domain::signal::{DEFAULT_WINDOW_CAPACITY, TIMESTAMP_SLOT};

/// Market data feed channel on the exchange websocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedChannel {
    /// Normalized trade prints from the Advanced Trade feed.
    #[default]
    MarketTrades,
    /// Raw ticker frames from the Exchange feed, relayed as-is.
    Ticker,
}

impl FeedChannel {
    /// Parse a channel from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "ticker" => Self::Ticker,
            _ => Self::MarketTrades,
        }
    }

    /// Get the channel name used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MarketTrades => "market_trades",
            Self::Ticker => "ticker",
        }
    }

    /// Get the websocket endpoint that carries this channel.
    #[must_use]
    pub const fn default_url(&self) -> &'static str {
        match self {
            Self::MarketTrades => "wss://advanced-trade-ws.coinbase.com",
            Self::Ticker => "wss://ws-feed.exchange.coinbase.com",
        }
    }

    /// Default relay queue capacity for this channel.
    ///
    /// Trade prints arrive in bursts and are buffered deep; ticker
    /// frames are low-volume and get a shallow queue.
    #[must_use]
    pub const fn default_queue_capacity(&self) -> usize {
        match self {
            Self::MarketTrades => 1_000_000,
            Self::Ticker => 1_000,
        }
    }
}

/// Websocket feed settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Websocket endpoint URL.
    pub url: String,
    /// Channel to subscribe.
    pub channel: FeedChannel,
    /// Products to subscribe.
    pub product_ids: Vec<String>,
    /// Relay queue capacity between reader and publisher.
    pub queue_capacity: usize,
}

/// Sequence deduplication settings.
#[derive(Debug, Clone)]
pub struct DedupSettings {
    /// How long a seen sequence number stays remembered.
    pub ttl: Duration,
    /// Interval between janitor sweeps of expired entries.
    pub sweep_interval: Duration,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(120),
        }
    }
}

/// Signal stage settings.
#[derive(Debug, Clone)]
pub struct SignalTuning {
    /// Price points per rolling window.
    pub window_size: usize,
    /// Initial idle-poll backoff delay.
    pub backoff_base: Duration,
    /// Consecutive empty polls tolerated before the stage gives up.
    pub backoff_max_retries: u32,
    /// Wall-clock budget for handling one consumed record.
    pub handler_timeout: Duration,
}

impl Default for SignalTuning {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_CAPACITY,
            backoff_base: Duration::from_millis(5),
            backoff_max_retries: 100,
            handler_timeout: Duration::from_secs(10),
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Websocket feed settings.
    pub feed: FeedSettings,
    /// Topic the ingest stage publishes trades to.
    pub trade_topic: String,
    /// Topic the signal stage publishes averages to.
    pub signal_topic: String,
    /// Consumer group for the signal stage.
    pub consumer_group: String,
    /// Partition count for log topics.
    pub log_partitions: usize,
    /// Sequence deduplication settings.
    pub dedup: DedupSettings,
    /// Signal stage settings.
    pub signal: SignalTuning,
    /// Optional bounded run duration, mostly for soak runs.
    pub run_for: Option<Duration>,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value fails validation, such as a window
    /// size too small to hold the timestamp slot.
    pub fn from_env() -> Result<Self, ConfigError> {
        let channel = std::env::var("RELAY_CHANNEL")
            .map(|s| FeedChannel::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let url = std::env::var("RELAY_FEED_URL")
            .unwrap_or_else(|_| channel.default_url().to_string());
        if url.is_empty() {
            return Err(ConfigError::EmptyValue("RELAY_FEED_URL".to_string()));
        }

        let product_ids: Vec<String> = std::env::var("RELAY_PRODUCT_IDS")
            .unwrap_or_else(|_| "BTC-USD".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if product_ids.is_empty() {
            return Err(ConfigError::EmptyValue("RELAY_PRODUCT_IDS".to_string()));
        }

        let feed = FeedSettings {
            url,
            channel,
            product_ids,
            queue_capacity: parse_env_usize(
                "RELAY_QUEUE_CAPACITY",
                channel.default_queue_capacity(),
            ),
        };

        let dedup = DedupSettings {
            ttl: parse_env_duration_secs("RELAY_DEDUP_TTL_SECS", DedupSettings::default().ttl),
            sweep_interval: parse_env_duration_secs(
                "RELAY_DEDUP_SWEEP_SECS",
                DedupSettings::default().sweep_interval,
            ),
        };

        let signal = SignalTuning {
            window_size: parse_env_usize(
                "RELAY_WINDOW_SIZE",
                SignalTuning::default().window_size,
            ),
            backoff_base: parse_env_duration_millis(
                "RELAY_BACKOFF_BASE_MS",
                SignalTuning::default().backoff_base,
            ),
            backoff_max_retries: parse_env_u32(
                "RELAY_BACKOFF_MAX_RETRIES",
                SignalTuning::default().backoff_max_retries,
            ),
            handler_timeout: parse_env_duration_secs(
                "RELAY_HANDLER_TIMEOUT_SECS",
                SignalTuning::default().handler_timeout,
            ),
        };

        if signal.window_size <= TIMESTAMP_SLOT {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_WINDOW_SIZE".to_string(),
                reason: format!(
                    "must be greater than {TIMESTAMP_SLOT} to carry a timestamp slot"
                ),
            });
        }

        let run_for = std::env::var("RELAY_RUN_FOR_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);

        Ok(Self {
            feed,
            trade_topic: std::env::var("RELAY_TRADE_TOPIC")
                .unwrap_or_else(|_| "btc-usd".to_string()),
            signal_topic: std::env::var("RELAY_SIGNAL_TOPIC")
                .unwrap_or_else(|_| "btc-usd-signals".to_string()),
            consumer_group: std::env::var("RELAY_CONSUMER_GROUP")
                .unwrap_or_else(|_| "bot-consumer-group".to_string()),
            log_partitions: parse_env_usize("RELAY_LOG_PARTITIONS", 3),
            dedup,
            signal,
            run_for,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an out-of-range or malformed value.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
