//! Pipeline Integration Tests
//!
//! Drives raw feed frames through the normalizer, the log, and the
//! signal stage, and checks what comes out the other end.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use coinbase_relay::application::signal::{BackoffConfig, SignalService, SignalSettings};
use coinbase_relay::{LogProducer, MemoryLog, TradeNormalizer};

fn snapshot_frame(count: u32) -> String {
    let trades: Vec<String> = (1..=count)
        .map(|i| {
            format!(
                r#"{{"product_id":"BTC-USD","price":"{i}.0","size":"0.5",
                    "trade_id":"{i}","time":"2024-01-15T10:00:{:02}Z","side":"BUY"}}"#,
                i % 60
            )
        })
        .collect();
    format!(
        r#"{{"channel":"market_trades","events":[{{"type":"snapshot","trades":[{}]}}]}}"#,
        trades.join(",")
    )
}

fn signal_settings() -> SignalSettings {
    SignalSettings {
        source_topic: "btc-usd".to_string(),
        signal_topic: "btc-usd-signals".to_string(),
        consumer_group: "bot-consumer-group".to_string(),
        window_size: 10,
        backoff: BackoffConfig::default(),
        handler_timeout: Duration::from_secs(10),
    }
}

fn publish_frame(producer: &LogProducer, frame: &str) -> usize {
    let batch = TradeNormalizer::new().normalize(frame).unwrap();
    let count = batch.events.len();
    for event in batch.events {
        let message = event.into_relay_message("btc-usd").unwrap();
        let _ = producer.publish(&message).unwrap();
    }
    count
}

#[tokio::test(start_paused = true)]
async fn ten_trades_become_one_signal() {
    let log = Arc::new(MemoryLog::new(1));
    let producer = LogProducer::new(Arc::clone(&log));

    assert_eq!(publish_frame(&producer, &snapshot_frame(10)), 10);

    let service = SignalService::new(Arc::clone(&log), signal_settings());
    let handle = service.start().await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    service.stop().await;
    handle.await.unwrap().unwrap();

    assert_eq!(log.end_offset("btc-usd-signals", 0), 1);

    let signal: serde_json::Value =
        serde_json::from_slice(&log.fetch("btc-usd-signals", 0, 0).unwrap()).unwrap();
    assert_eq!(signal["avgPrice"], serde_json::json!(5.5));
    // Timestamp rides on the window's fifth record: 10:00:05 UTC.
    assert_eq!(signal["timestamp"], serde_json::json!(1_705_312_805_000_i64));

    // The group committed everything it handled.
    assert_eq!(log.committed("bot-consumer-group", "btc-usd", 0), 10);
}

#[tokio::test(start_paused = true)]
async fn each_full_window_emits_its_own_signal() {
    let log = Arc::new(MemoryLog::new(1));
    let producer = LogProducer::new(Arc::clone(&log));

    assert_eq!(publish_frame(&producer, &snapshot_frame(25)), 25);

    let service = SignalService::new(Arc::clone(&log), signal_settings());
    let handle = service.start().await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    service.stop().await;
    handle.await.unwrap().unwrap();

    // Two full windows; the trailing five trades stay buffered.
    assert_eq!(log.end_offset("btc-usd-signals", 0), 2);

    let first: serde_json::Value =
        serde_json::from_slice(&log.fetch("btc-usd-signals", 0, 0).unwrap()).unwrap();
    let second: serde_json::Value =
        serde_json::from_slice(&log.fetch("btc-usd-signals", 0, 1).unwrap()).unwrap();
    assert_eq!(first["avgPrice"], serde_json::json!(5.5));
    assert_eq!(second["avgPrice"], serde_json::json!(15.5));
}

#[tokio::test(start_paused = true)]
async fn a_new_session_resumes_where_the_last_committed() {
    let log = Arc::new(MemoryLog::new(1));
    let producer = LogProducer::new(Arc::clone(&log));

    assert_eq!(publish_frame(&producer, &snapshot_frame(10)), 10);

    let first = SignalService::new(Arc::clone(&log), signal_settings());
    let handle = first.start().await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    first.stop().await;
    handle.await.unwrap().unwrap();
    assert_eq!(log.end_offset("btc-usd-signals", 0), 1);

    // A fresh session over the same group sees nothing new and emits
    // nothing; its window starts empty.
    let second = SignalService::new(Arc::clone(&log), signal_settings());
    let handle = second.start().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    second.stop().await;
    handle.await.unwrap().unwrap();

    assert_eq!(log.end_offset("btc-usd-signals", 0), 1);
}
