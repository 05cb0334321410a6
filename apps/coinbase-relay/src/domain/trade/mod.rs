//! Canonical Trade Types
//!
//! The normalized representation of a single market trade and the
//! payload type handed to the log producer. A `TradeEvent` leaves the
//! normalizer with `price`, `size` and `trade_id` as numbers and
//! `time` as epoch milliseconds; any feed fields outside the canonical
//! set are carried through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Trade Event
// =============================================================================

/// A normalized market trade.
///
/// One `TradeEvent` is produced per trade record in a `market_trades`
/// frame, not one per frame. Numeric fields are guaranteed numeric and
/// `time` is epoch milliseconds by the time this type exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Product identifier, e.g. `BTC-USD`.
    pub product_id: String,
    /// Trade price.
    pub price: f64,
    /// Trade size.
    pub size: f64,
    /// Exchange-assigned trade identifier.
    pub trade_id: f64,
    /// Trade time as epoch milliseconds.
    pub time: i64,
    /// Taker side, `BUY` or `SELL`.
    pub side: String,
    /// Feed fields outside the canonical set, relayed unmodified.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TradeEvent {
    /// Serialize this event into a relay payload for the given topic.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn into_relay_message(self, topic: &str) -> Result<RelayMessage, serde_json::Error> {
        let payload = serde_json::to_vec(&self)?;
        Ok(RelayMessage::new(topic, payload))
    }
}

// =============================================================================
// Relay Message
// =============================================================================

/// An immutable payload bound for a named log topic.
///
/// Created by the normalizer (one per surviving trade) or by the
/// passthrough path (one per raw frame), consumed exactly once by the
/// producer, then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    /// Target log topic.
    pub topic: String,
    /// Serialized record payload.
    pub payload: Vec<u8>,
}

impl RelayMessage {
    /// Create a new relay message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}
