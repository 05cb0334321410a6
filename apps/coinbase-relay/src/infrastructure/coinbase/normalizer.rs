//! Trade Frame Normalizer
//!
//! Converts one raw `market_trades` frame into canonical
//! [`TradeEvent`]s. Decoding policy, in order:
//!
//! 1. Malformed JSON rejects the whole frame.
//! 2. Frames for other channels are silently ignored.
//! 3. Event envelopes must carry `type ∈ {snapshot, update}` and a
//!    `trades` array; envelopes failing the shape check are skipped
//!    individually.
//! 4. Per trade, `time` (RFC 3339 text) becomes epoch milliseconds and
//!    `price`/`size`/`trade_id` text becomes 64-bit floats, in place.
//!    A single failed conversion drops that trade only; its siblings
//!    in the same batch still normalize.
//!
//! Fields that are already numeric pass through untouched, so feeding
//! an already-normalized event back through is a no-op.

use serde_json::{Map, Value};

use crate::domain::trade::TradeEvent;

/// The feed channel this normalizer accepts.
pub const MARKET_TRADES_CHANNEL: &str = "market_trades";

// =============================================================================
// Errors
// =============================================================================

/// Whole-frame normalization failure.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The frame was not valid JSON; no partial output is produced.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Per-trade conversion failure; drops that trade only.
#[derive(Debug, thiserror::Error)]
pub enum FieldConversionError {
    /// A numeric field held text that did not parse as a float.
    #[error("field `{field}` is not numeric text")]
    Numeric {
        /// The offending field name.
        field: &'static str,
    },
    /// A numeric field parsed to a non-finite value.
    #[error("field `{field}` is not a finite number")]
    NonFinite {
        /// The offending field name.
        field: &'static str,
    },
    /// The `time` field held text that was not an RFC 3339 timestamp.
    #[error("field `time` is not an RFC 3339 timestamp")]
    Timestamp,
    /// The converted record did not fit the canonical trade shape.
    #[error("trade record shape: {0}")]
    Shape(#[source] serde_json::Error),
}

// =============================================================================
// Normalizer
// =============================================================================

/// Result of normalizing one frame.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    /// Trades that survived conversion, one relay payload each.
    pub events: Vec<TradeEvent>,
    /// Trades dropped by per-record conversion failures.
    pub dropped: usize,
}

/// Stateless normalizer for `market_trades` frames.
#[derive(Debug, Default, Clone)]
pub struct TradeNormalizer;

impl TradeNormalizer {
    /// Create a new normalizer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Normalize one raw frame into canonical trade events.
    ///
    /// Frames for other channels, or frames without a usable `events`
    /// array, yield an empty batch. Per-trade failures are logged and
    /// counted in [`NormalizedBatch::dropped`].
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError::Malformed`] if the frame is not valid
    /// JSON.
    pub fn normalize(&self, frame: &str) -> Result<NormalizedBatch, NormalizeError> {
        let value: Value = serde_json::from_str(frame)?;

        let mut batch = NormalizedBatch::default();

        if value.get("channel").and_then(Value::as_str) != Some(MARKET_TRADES_CHANNEL) {
            return Ok(batch);
        }

        let Some(events) = value.get("events").and_then(Value::as_array) else {
            return Ok(batch);
        };

        for envelope in events {
            let Some(envelope) = envelope.as_object() else {
                continue;
            };
            let event_type = envelope.get("type").and_then(Value::as_str);
            if !matches!(event_type, Some("snapshot" | "update")) {
                continue;
            }
            let Some(trades) = envelope.get("trades").and_then(Value::as_array) else {
                continue;
            };

            for trade in trades {
                let Some(trade) = trade.as_object() else {
                    tracing::warn!("dropping non-object trade record");
                    batch.dropped += 1;
                    continue;
                };

                match normalize_trade(trade.clone()) {
                    Ok(event) => batch.events.push(event),
                    Err(error) => {
                        tracing::warn!(error = %error, "dropping trade record");
                        batch.dropped += 1;
                    }
                }
            }
        }

        Ok(batch)
    }
}

/// Convert one trade record in place and parse it into the canonical
/// shape.
fn normalize_trade(mut trade: Map<String, Value>) -> Result<TradeEvent, FieldConversionError> {
    convert_time_field(&mut trade)?;
    convert_numeric_field(&mut trade, "price")?;
    convert_numeric_field(&mut trade, "size")?;
    convert_numeric_field(&mut trade, "trade_id")?;

    serde_json::from_value(Value::Object(trade)).map_err(FieldConversionError::Shape)
}

/// Replace a text field with its parsed 64-bit float in place.
///
/// Fields that are absent or already non-text are left alone; the
/// canonical parse decides whether the record is acceptable.
fn convert_numeric_field(
    trade: &mut Map<String, Value>,
    field: &'static str,
) -> Result<(), FieldConversionError> {
    let Some(Value::String(text)) = trade.get(field) else {
        return Ok(());
    };

    let parsed: f64 = text
        .trim()
        .parse()
        .map_err(|_| FieldConversionError::Numeric { field })?;
    let number =
        serde_json::Number::from_f64(parsed).ok_or(FieldConversionError::NonFinite { field })?;

    trade.insert(field.to_string(), Value::Number(number));
    Ok(())
}

/// Replace RFC 3339 `time` text with epoch milliseconds in place.
fn convert_time_field(trade: &mut Map<String, Value>) -> Result<(), FieldConversionError> {
    let Some(Value::String(text)) = trade.get("time") else {
        return Ok(());
    };

    let parsed = chrono::DateTime::parse_from_rfc3339(text)
        .map_err(|_| FieldConversionError::Timestamp)?;

    trade.insert(
        "time".to_string(),
        Value::Number(parsed.timestamp_millis().into()),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn trade_json(price: &str, size: &str, trade_id: &str) -> String {
        format!(
            r#"{{"trade_id":"{trade_id}","product_id":"BTC-USD","price":"{price}","size":"{size}","side":"BUY","time":"2024-01-15T10:00:00Z"}}"#
        )
    }

    fn frame_with_trades(trades: &[String]) -> String {
        format!(
            r#"{{"channel":"market_trades","sequence_num":1,"events":[{{"type":"snapshot","trades":[{}]}}]}}"#,
            trades.join(",")
        )
    }

    #[test]
    fn normalizes_a_snapshot_frame() {
        let normalizer = TradeNormalizer::new();
        let frame = frame_with_trades(&[trade_json("42000.5", "0.01", "123")]);

        let batch = normalizer.normalize(&frame).unwrap();
        assert_eq!(batch.dropped, 0);
        assert_eq!(batch.events.len(), 1);

        let event = &batch.events[0];
        assert_eq!(event.price, 42000.5);
        assert_eq!(event.size, 0.01);
        assert_eq!(event.trade_id, 123.0);
        assert_eq!(event.time, 1_705_312_800_000);
        assert_eq!(event.side, "BUY");
    }

    #[test]
    fn one_bad_trade_does_not_drop_its_siblings() {
        let normalizer = TradeNormalizer::new();
        let frame = frame_with_trades(&[
            trade_json("1.0", "1.0", "1"),
            trade_json("not a price", "1.0", "2"),
            trade_json("3.0", "1.0", "3"),
        ]);

        let batch = normalizer.normalize(&frame).unwrap();
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.dropped, 1);
        assert_eq!(batch.events[0].trade_id, 1.0);
        assert_eq!(batch.events[1].trade_id, 3.0);
    }

    #[test_case("price")]
    #[test_case("size")]
    #[test_case("trade_id")]
    fn bad_numeric_text_drops_the_record(field: &str) {
        let normalizer = TradeNormalizer::new();
        let mut trade: Map<String, Value> =
            serde_json::from_str(&trade_json("1.0", "1.0", "1")).unwrap();
        trade.insert(field.to_string(), Value::String("bogus".to_string()));

        let frame = frame_with_trades(&[serde_json::to_string(&trade).unwrap()]);
        let batch = normalizer.normalize(&frame).unwrap();
        assert!(batch.events.is_empty());
        assert_eq!(batch.dropped, 1);
    }

    #[test]
    fn non_finite_price_text_drops_the_record() {
        let normalizer = TradeNormalizer::new();
        let frame = frame_with_trades(&[trade_json("NaN", "1.0", "1")]);

        let batch = normalizer.normalize(&frame).unwrap();
        assert!(batch.events.is_empty());
        assert_eq!(batch.dropped, 1);
    }

    #[test]
    fn bad_timestamp_text_drops_the_record() {
        let normalizer = TradeNormalizer::new();
        let trade = r#"{"trade_id":"1","product_id":"BTC-USD","price":"1.0","size":"1.0","side":"BUY","time":"yesterday"}"#;
        let frame = frame_with_trades(&[trade.to_string()]);

        let batch = normalizer.normalize(&frame).unwrap();
        assert!(batch.events.is_empty());
        assert_eq!(batch.dropped, 1);
    }

    #[test]
    fn renormalizing_a_normalized_event_is_a_no_op() {
        let normalizer = TradeNormalizer::new();
        let frame = frame_with_trades(&[trade_json("42000.5", "0.01", "123")]);
        let first = normalizer.normalize(&frame).unwrap().events.remove(0);

        let refed = format!(
            r#"{{"channel":"market_trades","events":[{{"type":"update","trades":[{}]}}]}}"#,
            serde_json::to_string(&first).unwrap()
        );
        let second = normalizer.normalize(&refed).unwrap();

        assert_eq!(second.dropped, 0);
        assert_eq!(second.events.len(), 1);
        assert_eq!(second.events[0], first);
    }

    #[test]
    fn other_channels_are_silently_ignored() {
        let normalizer = TradeNormalizer::new();
        let batch = normalizer
            .normalize(r#"{"channel":"heartbeats","events":[]}"#)
            .unwrap();
        assert!(batch.events.is_empty());
        assert_eq!(batch.dropped, 0);
    }

    #[test]
    fn subscription_ack_without_events_is_ignored() {
        let normalizer = TradeNormalizer::new();
        let batch = normalizer
            .normalize(r#"{"channel":"market_trades","type":"subscriptions"}"#)
            .unwrap();
        assert!(batch.events.is_empty());
    }

    #[test]
    fn malformed_json_rejects_the_whole_frame() {
        let normalizer = TradeNormalizer::new();
        let result = normalizer.normalize("{not json");
        assert!(matches!(result, Err(NormalizeError::Malformed(_))));
    }

    #[test]
    fn envelopes_failing_the_shape_check_are_skipped() {
        let normalizer = TradeNormalizer::new();
        let frame = format!(
            r#"{{"channel":"market_trades","events":[
                42,
                {{"type":"ticker","trades":[{}]}},
                {{"type":"update"}},
                {{"type":"update","trades":[{}]}}
            ]}}"#,
            trade_json("1.0", "1.0", "1"),
            trade_json("2.0", "1.0", "2")
        );

        let batch = normalizer.normalize(&frame).unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].trade_id, 2.0);
        assert_eq!(batch.dropped, 0);
    }

    #[test]
    fn fractional_second_timestamps_convert() {
        let normalizer = TradeNormalizer::new();
        let trade = r#"{"trade_id":"1","product_id":"BTC-USD","price":"1.0","size":"1.0","side":"SELL","time":"2024-01-15T10:00:00.123456789Z"}"#;
        let frame = frame_with_trades(&[trade.to_string()]);

        let batch = normalizer.normalize(&frame).unwrap();
        assert_eq!(batch.events[0].time, 1_705_312_800_123);
    }
}
