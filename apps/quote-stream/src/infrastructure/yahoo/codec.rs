//! Frame Decoding Pipeline
//!
//! Turns one raw text frame into domain events:
//!
//! 1. parse the JSON envelope,
//! 2. base64-decode its `message` field,
//! 3. decode the bytes as a protobuf `PricingData` record,
//! 4. project the record into a `StreamingPrice` and, when the identity
//!    fields are present, a `StreamingQuote`.
//!
//! Records without a symbol yield nothing.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use prost::Message;

use super::messages::{PricingData, PricingEnvelope};
use crate::domain::streaming::{MarketHours, QuoteType, StreamingPrice, StreamingQuote};

/// Codec error types.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame is not a JSON envelope.
    #[error("invalid envelope: {0}")]
    Json(#[from] serde_json::Error),

    /// The envelope payload is not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The payload bytes are not a valid pricing record.
    #[error("invalid pricing record: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

/// Events produced from one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Always present for a record with a symbol.
    pub price: StreamingPrice,
    /// Present only when short name, currency and exchange are all set.
    pub quote: Option<StreamingQuote>,
}

/// Stateless decoder for inbound pricing frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder;

impl FrameDecoder {
    /// Create a new decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// Returns `Ok(None)` for records with an empty symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if any pipeline stage fails.
    pub fn decode(&self, text: &str) -> Result<Option<DecodedFrame>, CodecError> {
        let envelope: PricingEnvelope = serde_json::from_str(text)?;
        let bytes = STANDARD.decode(envelope.message.trim())?;
        let record = PricingData::decode(bytes.as_slice())?;
        Ok(Self::project(&record))
    }

    /// Project a decoded record into events.
    #[must_use]
    pub fn project(record: &PricingData) -> Option<DecodedFrame> {
        let symbol = record.id.trim().to_uppercase();
        if symbol.is_empty() {
            return None;
        }

        let timestamp = DateTime::<Utc>::from_timestamp_millis(record.time).unwrap_or_default();
        let market_hours = MarketHours::from_code(record.market_hours);
        let bid = positive(record.bid);
        let ask = positive(record.ask);

        let price = StreamingPrice {
            symbol: symbol.clone(),
            price: f64::from(record.price),
            change: f64::from(record.change),
            change_percent: f64::from(record.change_percent),
            timestamp,
            volume: record.day_volume,
            bid,
            ask,
            market_hours,
        };

        let has_identity = !record.short_name.trim().is_empty()
            && !record.currency.trim().is_empty()
            && !record.exchange.trim().is_empty();

        let quote = has_identity.then(|| StreamingQuote {
            symbol,
            price: price.price,
            change: price.change,
            change_percent: price.change_percent,
            timestamp,
            volume: record.day_volume,
            bid,
            ask,
            bid_size: (record.bid_size > 0).then_some(record.bid_size),
            ask_size: (record.ask_size > 0).then_some(record.ask_size),
            day_high: f64::from(record.day_high),
            day_low: f64::from(record.day_low),
            open: f64::from(record.open_price),
            previous_close: f64::from(record.previous_close),
            currency: record.currency.clone(),
            exchange: record.exchange.clone(),
            short_name: record.short_name.clone(),
            quote_type: QuoteType::from_code(record.quote_type),
            market_hours,
        });

        Some(DecodedFrame { price, quote })
    }

    /// Wrap a record in a JSON envelope, the way the upstream sends it.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, record: &PricingData) -> Result<String, CodecError> {
        let envelope = PricingEnvelope {
            msg_type: Some("pricing".to_string()),
            message: STANDARD.encode(record.encode_to_vec()),
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}

fn positive(value: f32) -> Option<f64> {
    (value > 0.0).then(|| f64::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(symbol: &str) -> PricingData {
        PricingData {
            id: symbol.to_string(),
            price: 100.0,
            time: 1_700_000_000_000,
            change: 1.5,
            change_percent: 1.52,
            day_volume: 12_345,
            market_hours: 1,
            ..Default::default()
        }
    }

    fn full(symbol: &str) -> PricingData {
        PricingData {
            short_name: "Apple Inc.".to_string(),
            currency: "USD".to_string(),
            exchange: "NMS".to_string(),
            quote_type: 8,
            day_high: 101.0,
            day_low: 98.5,
            open_price: 99.0,
            previous_close: 98.5,
            bid: 99.95,
            bid_size: 300,
            ask: 100.05,
            ask_size: 200,
            ..tick(symbol)
        }
    }

    #[test]
    fn minimal_record_yields_price_only() {
        let codec = FrameDecoder::new();
        let frame = codec.encode(&tick("AAPL")).unwrap();

        let decoded = codec.decode(&frame).unwrap().unwrap();
        assert_eq!(decoded.price.symbol, "AAPL");
        assert!((decoded.price.price - 100.0).abs() < f64::EPSILON);
        assert_eq!(decoded.price.volume, 12_345);
        assert_eq!(decoded.price.market_hours, MarketHours::Regular);
        assert_eq!(decoded.price.timestamp.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(decoded.price.bid, None);
        assert!(decoded.quote.is_none());
    }

    #[test]
    fn full_record_yields_price_and_quote() {
        let codec = FrameDecoder::new();
        let frame = codec.encode(&full("AAPL")).unwrap();

        let decoded = codec.decode(&frame).unwrap().unwrap();
        let quote = decoded.quote.expect("quote should be projected");
        assert_eq!(quote.symbol, "AAPL");
        assert_eq!(quote.short_name, "Apple Inc.");
        assert_eq!(quote.currency, "USD");
        assert_eq!(quote.exchange, "NMS");
        assert_eq!(quote.quote_type, QuoteType::Equity);
        assert_eq!(quote.bid_size, Some(300));
        assert!(quote.bid.is_some());
        assert_eq!(quote.to_price(), decoded.price);
    }

    #[test]
    fn partial_identity_yields_price_only() {
        let record = PricingData {
            exchange: String::new(),
            ..full("AAPL")
        };
        let decoded = FrameDecoder::project(&record).unwrap();
        assert!(decoded.quote.is_none());
    }

    #[test]
    fn empty_symbol_is_dropped() {
        let codec = FrameDecoder::new();
        let frame = codec.encode(&tick("")).unwrap();
        assert_eq!(codec.decode(&frame).unwrap(), None);
    }

    #[test]
    fn symbol_is_uppercased() {
        let decoded = FrameDecoder::project(&tick("btc-usd")).unwrap();
        assert_eq!(decoded.price.symbol, "BTC-USD");
    }

    #[test]
    fn rejects_non_json() {
        let err = FrameDecoder::new().decode("not json").unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }

    #[test]
    fn rejects_bad_base64() {
        let err = FrameDecoder::new()
            .decode(r#"{"type":"pricing","message":"@@@not base64@@@"}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::Base64(_)));
    }

    #[test]
    fn rejects_truncated_record() {
        // Field 1, length-delimited, claims 16 bytes but carries 2.
        let payload = STANDARD.encode([0x0a, 0x10, b'A', b'A']);
        let frame = format!(r#"{{"message":"{payload}"}}"#);
        let err = FrameDecoder::new().decode(&frame).unwrap_err();
        assert!(matches!(err, CodecError::Protobuf(_)));
    }

    #[test]
    fn unknown_session_code() {
        let record = PricingData {
            market_hours: 42,
            ..tick("AAPL")
        };
        let decoded = FrameDecoder::project(&record).unwrap();
        assert_eq!(decoded.price.market_hours, MarketHours::Unknown);
    }
}
