//! Coinbase Stream Relay Binary
//!
//! Starts both pipeline stages over a shared partitioned log.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin coinbase-relay
//! ```
//!
//! # Environment Variables
//!
//! All optional; defaults target the BTC-USD trade feed.
//! - `RELAY_CHANNEL`: "market_trades" | "ticker" (default: market_trades)
//! - `RELAY_FEED_URL`: Websocket endpoint (default: per channel)
//! - `RELAY_PRODUCT_IDS`: Comma-separated products (default: BTC-USD)
//! - `RELAY_TRADE_TOPIC`: Trade topic (default: btc-usd)
//! - `RELAY_SIGNAL_TOPIC`: Signal topic (default: btc-usd-signals)
//! - `RELAY_CONSUMER_GROUP`: Consumer group (default: bot-consumer-group)
//! - `RELAY_LOG_PARTITIONS`: Partitions per topic (default: 3)
//! - `RELAY_QUEUE_CAPACITY`: Relay queue depth (default: per channel)
//! - `RELAY_WINDOW_SIZE`: Price points per signal (default: 10)
//! - `RELAY_BACKOFF_BASE_MS`: First idle-poll delay (default: 5)
//! - `RELAY_BACKOFF_MAX_RETRIES`: Idle-poll budget (default: 100)
//! - `RELAY_HANDLER_TIMEOUT_SECS`: Per-record budget (default: 10)
//! - `RELAY_DEDUP_TTL_SECS`: Sequence memory (default: 60)
//! - `RELAY_DEDUP_SWEEP_SECS`: Janitor interval (default: 120)
//! - `RELAY_RUN_FOR_SECS`: Bounded run duration (default: unbounded)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use coinbase_relay::application::ingest::{IngestService, IngestSettings, RelayMode};
use coinbase_relay::application::signal::{BackoffConfig, SignalService, SignalSettings};
use coinbase_relay::infrastructure::coinbase::client::FeedClient;
use coinbase_relay::infrastructure::coinbase::dedup::SequenceCache;
use coinbase_relay::infrastructure::coinbase::messages::ChannelSpec;
use coinbase_relay::infrastructure::log::broker::MemoryLog;
use coinbase_relay::infrastructure::log::producer::LogProducer;
use coinbase_relay::infrastructure::telemetry;
use coinbase_relay::{FeedChannel, RelayConfig};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();
    telemetry::init();

    tracing::info!("Starting Coinbase Stream Relay");

    let config = RelayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Shared partitioned log carrying both topics.
    let log = Arc::new(MemoryLog::new(config.log_partitions));

    // Sequence cache with its background janitor.
    let dedup = Arc::new(SequenceCache::new(
        config.dedup.ttl,
        config.dedup.sweep_interval,
    ));
    {
        let dedup = Arc::clone(&dedup);
        let cancel = shutdown_token.clone();
        tokio::spawn(async move {
            dedup.run_janitor(cancel).await;
        });
    }

    // Stage one: feed into the trade topic.
    let client = Arc::new(FeedClient::new(config.feed.url.clone(), dedup));
    let (channel, mode) = match config.feed.channel {
        FeedChannel::MarketTrades => (
            ChannelSpec::Single(config.feed.channel.as_str().to_string()),
            RelayMode::Trades,
        ),
        FeedChannel::Ticker => (
            ChannelSpec::Multiple(vec![config.feed.channel.as_str().to_string()]),
            RelayMode::Passthrough,
        ),
    };
    let ingest = IngestService::new(
        client,
        LogProducer::new(Arc::clone(&log)),
        IngestSettings {
            product_ids: config.feed.product_ids.clone(),
            channel,
            topic: config.trade_topic.clone(),
            queue_capacity: config.feed.queue_capacity,
            mode,
        },
    );
    ingest.start().await?;

    // Stage two: trade topic into the signal topic.
    let signal_service = SignalService::new(
        Arc::clone(&log),
        SignalSettings {
            source_topic: config.trade_topic.clone(),
            signal_topic: config.signal_topic.clone(),
            consumer_group: config.consumer_group.clone(),
            window_size: config.signal.window_size,
            backoff: BackoffConfig {
                base_delay: config.signal.backoff_base,
                max_retries: config.signal.backoff_max_retries,
            },
            handler_timeout: config.signal.handler_timeout,
        },
    );
    let mut aggregation = signal_service.start().await;

    tracing::info!("Relay pipeline ready");

    let mut aggregation_done = false;
    let mut fatal: Option<Box<dyn std::error::Error>> = None;

    tokio::select! {
        () = await_signal() => {}
        () = bounded_run(config.run_for) => {
            tracing::info!("Configured run duration elapsed, initiating shutdown");
        }
        result = &mut aggregation => {
            aggregation_done = true;
            match result {
                Ok(Ok(())) => tracing::info!("Aggregation loop exited"),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Aggregation loop failed");
                    fatal = Some(e.into());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Aggregation task panicked");
                    fatal = Some(e.into());
                }
            }
        }
    }

    shutdown_token.cancel();
    ingest.stop().await;
    signal_service.stop().await;
    if !aggregation_done {
        let _ = aggregation.await;
    }

    tracing::info!("Relay stopped");
    match fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        url = %config.feed.url,
        channel = config.feed.channel.as_str(),
        products = ?config.feed.product_ids,
        trade_topic = %config.trade_topic,
        signal_topic = %config.signal_topic,
        group = %config.consumer_group,
        partitions = config.log_partitions,
        window = config.signal.window_size,
        "Configuration loaded"
    );
}

/// Sleep for the configured bounded run, or forever when unbounded.
async fn bounded_run(run_for: Option<Duration>) {
    match run_for {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
