//! Configuration Module
//!
//! Configuration loading for the relay pipeline.

mod settings;

pub use settings::{
    ConfigError, DedupSettings, FeedChannel, FeedSettings, RelayConfig, SignalTuning,
};
