//! Aggregation Window and Signals
//!
//! A fixed-size tumbling window over the relayed trade stream. Each
//! inbound record contributes one `{price, timestamp}` slot; when the
//! window reaches capacity it emits a [`Signal`] carrying the mean of
//! the parsed prices and resets in place.
//!
//! Two behaviors are intentional and load-bearing:
//!
//! - The signal timestamp is copied from the window's index-4 slot, a
//!   positional choice rather than any midpoint-by-value semantic.
//! - A slot whose price could not be parsed contributes nothing to the
//!   price sum but still occupies one of the N slots, so the divisor
//!   stays N and the average skews low. Downstream consumers rely on
//!   the emission cadence, so the divisor is not renormalized here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default number of slots in the aggregation window.
pub const DEFAULT_WINDOW_CAPACITY: usize = 10;

/// Index of the slot whose timestamp is echoed into the emitted signal.
pub const TIMESTAMP_SLOT: usize = 4;

// =============================================================================
// Price Point
// =============================================================================

/// One window slot: the price extracted from a relayed record and the
/// record's own time value, echoed verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    /// Parsed price, or `None` if the record's price was absent or
    /// unparseable. The slot is occupied either way.
    pub price: Option<f64>,
    /// The record's `time` field, carried through untouched.
    pub timestamp: Value,
}

impl PricePoint {
    /// Extract a price point from a relayed record.
    ///
    /// Accepts the price as either a JSON number (the normalized trade
    /// shape) or numeric text (raw passthrough frames). Anything else
    /// leaves the slot priceless.
    #[must_use]
    pub fn from_record(record: &Value) -> Self {
        let price = record.get("price").and_then(|value| match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        });

        let timestamp = record.get("time").cloned().unwrap_or(Value::Null);

        Self { price, timestamp }
    }
}

// =============================================================================
// Signal
// =============================================================================

/// A derived periodic signal, published once per full window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Arithmetic mean of the window's parsed prices over the full
    /// window size.
    #[serde(rename = "avgPrice")]
    pub avg_price: f64,
    /// Timestamp copied from the window's designated slot.
    pub timestamp: Value,
}

// =============================================================================
// Signal Window
// =============================================================================

/// Fixed-size tumbling buffer of recent price points.
///
/// State machine: `Empty → Filling → (len == capacity) → Emit & Reset`.
/// The slot storage is cleared on emission, never reallocated.
#[derive(Debug)]
pub struct SignalWindow {
    slots: Vec<PricePoint>,
    capacity: usize,
}

impl SignalWindow {
    /// Create a window with the default capacity of ten slots.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WINDOW_CAPACITY)
    }

    /// Create a window with a custom capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` does not cover the designated timestamp
    /// slot (index 4).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity > TIMESTAMP_SLOT,
            "window capacity must exceed the timestamp slot index"
        );
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the window currently holds no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Configured window capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a point; if this fills the window, emit a signal and
    /// reset.
    ///
    /// Returns `Some(signal)` exactly when the appended point is the
    /// capacity-th one. The window is empty again immediately after a
    /// signal is returned.
    pub fn push(&mut self, point: PricePoint) -> Option<Signal> {
        self.slots.push(point);

        if self.slots.len() < self.capacity {
            return None;
        }

        let sum: f64 = self.slots.iter().filter_map(|slot| slot.price).sum();
        #[allow(clippy::cast_precision_loss)]
        let avg_price = sum / self.capacity as f64;
        let timestamp = self.slots[TIMESTAMP_SLOT].timestamp.clone();

        self.slots.clear();

        Some(Signal {
            avg_price,
            timestamp,
        })
    }
}

impl Default for SignalWindow {
    fn default() -> Self {
        Self::new()
    }
}
