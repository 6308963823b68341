//! Yahoo Streamer Message Types
//!
//! Inbound frames are JSON envelopes whose `message` field carries a
//! base64 encoded protobuf `PricingData` record. Outbound control frames
//! are small JSON objects listing symbols to add or drop.
//!
//! # Inbound
//!
//! ```json
//! {"type":"pricing","message":"CgRBQVBMFc3MTEM..."}
//! ```
//!
//! # Outbound
//!
//! ```json
//! {"subscribe":["AAPL","MSFT"]}
//! {"unsubscribe":["MSFT"]}
//! ```

use serde::{Deserialize, Serialize};

// =============================================================================
// Inbound
// =============================================================================

/// Outer JSON envelope of an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingEnvelope {
    /// Frame type, `"pricing"` for data frames.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub msg_type: Option<String>,

    /// Base64 encoded `PricingData`.
    pub message: String,
}

/// Binary pricing record as sent by the upstream (protobuf).
///
/// Field tags are fixed by the provider. Tags this client does not use
/// (options, crypto supply, ...) are skipped by the decoder.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PricingData {
    /// Ticker symbol.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Last price.
    #[prost(float, tag = "2")]
    pub price: f32,
    /// Tick time, epoch milliseconds.
    #[prost(sint64, tag = "3")]
    pub time: i64,
    /// Quote currency.
    #[prost(string, tag = "4")]
    pub currency: String,
    /// Listing exchange code.
    #[prost(string, tag = "5")]
    pub exchange: String,
    /// Instrument type code.
    #[prost(int32, tag = "6")]
    pub quote_type: i32,
    /// Market session code.
    #[prost(int32, tag = "7")]
    pub market_hours: i32,
    /// Percent change from previous close.
    #[prost(float, tag = "8")]
    pub change_percent: f32,
    /// Cumulative day volume.
    #[prost(sint64, tag = "9")]
    pub day_volume: i64,
    /// Session high.
    #[prost(float, tag = "10")]
    pub day_high: f32,
    /// Session low.
    #[prost(float, tag = "11")]
    pub day_low: f32,
    /// Absolute change from previous close.
    #[prost(float, tag = "12")]
    pub change: f32,
    /// Display name.
    #[prost(string, tag = "13")]
    pub short_name: String,
    /// Session open.
    #[prost(float, tag = "15")]
    pub open_price: f32,
    /// Previous session close.
    #[prost(float, tag = "16")]
    pub previous_close: f32,
    /// Best bid.
    #[prost(float, tag = "23")]
    pub bid: f32,
    /// Size at best bid.
    #[prost(sint64, tag = "24")]
    pub bid_size: i64,
    /// Best ask.
    #[prost(float, tag = "25")]
    pub ask: f32,
    /// Size at best ask.
    #[prost(sint64, tag = "26")]
    pub ask_size: i64,
    /// Decimal places the upstream displays.
    #[prost(sint64, tag = "27")]
    pub price_hint: i64,
}

// =============================================================================
// Outbound
// =============================================================================

/// Subscription control message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// Symbols to add.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscribe: Vec<String>,

    /// Symbols to drop.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsubscribe: Vec<String>,
}

impl SubscriptionRequest {
    /// Create a subscribe request.
    #[must_use]
    pub fn subscribe(symbols: Vec<String>) -> Self {
        Self {
            subscribe: symbols,
            ..Default::default()
        }
    }

    /// Create an unsubscribe request.
    #[must_use]
    pub fn unsubscribe(symbols: Vec<String>) -> Self {
        Self {
            unsubscribe: symbols,
            ..Default::default()
        }
    }

    /// Check if the request carries no symbols.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }

    /// Serialize to the JSON text sent on the socket.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
