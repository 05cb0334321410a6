//! Tracing Setup
//!
//! Structured logging for the relay pipeline.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Standard `EnvFilter` directives; the defaults below
//!   apply when a crate is not named.
//!
//! # Usage
//!
//! ```ignore
//! use coinbase_relay::infrastructure::telemetry;
//!
//! // Initialize once at startup.
//! telemetry::init();
//!
//! tracing::info!("relay starting");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the tracing subscriber.
///
/// Safe to call once per process; a second call is a no-op because the
/// global subscriber is already set.
#[allow(clippy::expect_used)]
pub fn init() {
    let env_filter = EnvFilter::from_default_env()
        .add_directive(
            "coinbase_relay=info"
                .parse()
                .expect("static directive 'coinbase_relay=info' is valid"),
        )
        .add_directive(
            "tungstenite=warn"
                .parse()
                .expect("static directive 'tungstenite=warn' is valid"),
        );

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
