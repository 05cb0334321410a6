//! Feed Control Messages
//!
//! Subscribe control message shapes for the Coinbase websocket feeds.
//! The Advanced Trade endpoint takes a single `channel` string; the
//! legacy Exchange endpoint takes a `channels` list. Both are sent as
//! one text frame immediately after connecting.

use serde::{Deserialize, Serialize};

/// Channel selection for a subscribe request.
///
/// Serializes as either `"channel": "..."` (Advanced Trade) or
/// `"channels": [...]` (legacy Exchange), flattened into the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelSpec {
    /// Single channel, e.g. `market_trades`.
    #[serde(rename = "channel")]
    Single(String),
    /// Channel list, e.g. `["ticker"]`.
    #[serde(rename = "channels")]
    Multiple(Vec<String>),
}

/// The subscription control message sent once after connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Always `subscribe`.
    #[serde(rename = "type")]
    pub request_type: String,
    /// Products to subscribe, e.g. `["BTC-USD"]`.
    pub product_ids: Vec<String>,
    /// Channel selection, flattened onto the message.
    #[serde(flatten)]
    pub channel: ChannelSpec,
}

impl SubscribeRequest {
    /// Create a subscribe request for the given products and channel.
    #[must_use]
    pub fn new(product_ids: &[String], channel: ChannelSpec) -> Self {
        Self {
            request_type: "subscribe".to_string(),
            product_ids: product_ids.to_vec(),
            channel,
        }
    }
}
