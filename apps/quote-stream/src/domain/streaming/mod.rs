//! Market Data Streaming Types
//!
//! Core domain types published by the streaming client: price ticks,
//! full quotes and connection lifecycle notifications. These types are
//! codec-agnostic and represent the canonical internal representation of
//! the upstream feed.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Market Session
// =============================================================================

/// Trading session the upstream reports a tick for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarketHours {
    /// Market closed (overnight / extended session).
    Closed,
    /// Regular trading hours.
    Regular,
    /// Pre-market session.
    PreMarket,
    /// Post-market session.
    PostMarket,
    /// Session code not recognised.
    #[default]
    Unknown,
}

impl MarketHours {
    /// Map the upstream wire code to a session.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::PreMarket,
            1 => Self::Regular,
            2 => Self::PostMarket,
            3 => Self::Closed,
            _ => Self::Unknown,
        }
    }

    /// Get the session name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Regular => "regular",
            Self::PreMarket => "pre_market",
            Self::PostMarket => "post_market",
            Self::Unknown => "unknown",
        }
    }
}

// =============================================================================
// Instrument Type
// =============================================================================

/// Instrument type carried by full quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuoteType {
    /// No type reported.
    None,
    /// Alternative symbol.
    AltSymbol,
    /// Upstream keep-alive record.
    Heartbeat,
    /// Common stock.
    Equity,
    /// Market index.
    Index,
    /// Mutual fund.
    MutualFund,
    /// Money market fund.
    MoneyMarket,
    /// Option contract.
    Option,
    /// Currency pair.
    Currency,
    /// Warrant.
    Warrant,
    /// Bond.
    Bond,
    /// Futures contract.
    Future,
    /// Exchange traded fund.
    Etf,
    /// Commodity.
    Commodity,
    /// ECN quote.
    EcnQuote,
    /// Cryptocurrency.
    Cryptocurrency,
    /// Economic indicator.
    Indicator,
    /// Industry aggregate.
    Industry,
    /// Code not recognised.
    #[default]
    Unknown,
}

impl QuoteType {
    /// Map the upstream wire code to an instrument type.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::None,
            5 => Self::AltSymbol,
            7 => Self::Heartbeat,
            8 => Self::Equity,
            9 => Self::Index,
            11 => Self::MutualFund,
            12 => Self::MoneyMarket,
            13 => Self::Option,
            14 => Self::Currency,
            15 => Self::Warrant,
            17 => Self::Bond,
            18 => Self::Future,
            20 => Self::Etf,
            23 => Self::Commodity,
            28 => Self::EcnQuote,
            41 => Self::Cryptocurrency,
            42 => Self::Indicator,
            1000 => Self::Industry,
            _ => Self::Unknown,
        }
    }
}

// =============================================================================
// Price and Quote Events
// =============================================================================

/// Minimal price tick, emitted for every decodable frame with a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingPrice {
    /// Uppercase ticker symbol.
    pub symbol: String,
    /// Last traded price.
    pub price: f64,
    /// Absolute change from previous close.
    pub change: f64,
    /// Percent change from previous close.
    pub change_percent: f64,
    /// Exchange timestamp of the tick.
    pub timestamp: DateTime<Utc>,
    /// Cumulative day volume.
    pub volume: i64,
    /// Best bid, when reported.
    pub bid: Option<f64>,
    /// Best ask, when reported.
    pub ask: Option<f64>,
    /// Trading session.
    pub market_hours: MarketHours,
}

/// Full quote, emitted only when the record carries its identity fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingQuote {
    /// Uppercase ticker symbol.
    pub symbol: String,
    /// Last traded price.
    pub price: f64,
    /// Absolute change from previous close.
    pub change: f64,
    /// Percent change from previous close.
    pub change_percent: f64,
    /// Exchange timestamp of the tick.
    pub timestamp: DateTime<Utc>,
    /// Cumulative day volume.
    pub volume: i64,
    /// Best bid, when reported.
    pub bid: Option<f64>,
    /// Best ask, when reported.
    pub ask: Option<f64>,
    /// Size at the best bid, when reported.
    pub bid_size: Option<i64>,
    /// Size at the best ask, when reported.
    pub ask_size: Option<i64>,
    /// Session high.
    pub day_high: f64,
    /// Session low.
    pub day_low: f64,
    /// Session open.
    pub open: f64,
    /// Previous session close.
    pub previous_close: f64,
    /// Quote currency (e.g. `USD`).
    pub currency: String,
    /// Listing exchange code.
    pub exchange: String,
    /// Display name.
    pub short_name: String,
    /// Instrument type.
    pub quote_type: QuoteType,
    /// Trading session.
    pub market_hours: MarketHours,
}

impl StreamingQuote {
    /// Project the price tick contained in this quote.
    #[must_use]
    pub fn to_price(&self) -> StreamingPrice {
        StreamingPrice {
            symbol: self.symbol.clone(),
            price: self.price,
            change: self.change,
            change_percent: self.change_percent,
            timestamp: self.timestamp,
            volume: self.volume,
            bid: self.bid,
            ask: self.ask,
            market_hours: self.market_hours,
        }
    }
}

// =============================================================================
// Connection Lifecycle
// =============================================================================

/// State of the streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ConnectionState {
    /// No socket and no reconnection in progress.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Socket open, receive and heartbeat loops running.
    Connected,
    /// Waiting out the backoff before the given attempt (1-based).
    Reconnecting {
        /// Attempt number.
        attempt: u32,
    },
    /// Closed by the caller or after reconnection exhaustion.
    Closed,
}

impl ConnectionState {
    /// Numeric encoding used for the state gauge.
    #[must_use]
    pub const fn as_gauge(&self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::Reconnecting { .. } => 3.0,
            Self::Closed => 4.0,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting({attempt})"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// Lifecycle notifications published on the `events` stream.
///
/// Lifecycle visibility is opt-in: a consumer that only reads prices and
/// quotes stops receiving data silently once reconnection is exhausted.
/// The fatal [`ConnectionEvent::Error`] is the only signal of that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ConnectionEvent {
    /// Socket handshake completed.
    Connected,
    /// Socket lost or closed.
    Disconnected {
        /// Why the socket went away.
        reason: String,
    },
    /// A reconnection attempt is scheduled.
    Reconnecting {
        /// Attempt number (1-based).
        attempt: u32,
    },
    /// The subscription set changed.
    SubscriptionUpdated {
        /// Full set after the change.
        symbols: BTreeSet<String>,
    },
    /// Something went wrong.
    Error {
        /// Human readable cause.
        message: String,
        /// `true` only once the reconnection budget is exhausted.
        fatal: bool,
    },
}

impl ConnectionEvent {
    /// Build a non-fatal error event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            fatal: false,
        }
    }

    /// Build a fatal error event.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            fatal: true,
        }
    }

    /// Check if this is a fatal error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Error { fatal: true, .. })
    }
}
