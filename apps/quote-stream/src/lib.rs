#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::default_trait_access
    )
)]

//! Quote Stream - Resilient Streaming Quote Client
//!
//! Keeps one long-lived push connection to a streaming quote provider
//! alive across network failures and republishes decoded ticks to any
//! number of in-process subscribers. A token bucket limiter gates the
//! request-style calls made next to the stream.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Event and state types, subscription registry
//!   - `streaming`: Prices, quotes, connection states and events
//!   - `subscription`: Normalised symbol set replayed on reconnect
//!
//! - **Application**: Port definitions
//!   - `ports`: Transport, frame sink and frame source contracts
//!
//! - **Infrastructure**: Adapters and ambient services
//!   - `yahoo`: WebSocket transport, frame codec, streaming client
//!   - `rate_limit`: Token bucket limiter
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                       ┌───────────────┐    ┌──► prices
//! Yahoo streamer WS ───►│ receive loop  │────┼──► quotes
//!        ▲              │ + FrameDecoder│    └──► events
//!        │              └───────────────┘
//!        └── subscribe / heartbeat / replay ◄── SubscriptionRegistry
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Event types and subscription tracking.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{
    ConnectionEvent, ConnectionState, MarketHours, QuoteType, StreamingPrice, StreamingQuote,
};
pub use domain::subscription::{SubscriptionChange, SubscriptionRegistry, Symbol};

// Ports (for custom transports)
pub use application::ports::{
    FrameSink, FrameSource, InboundFrame, Session, StreamTransport, TransportError,
};

// Streaming client
pub use infrastructure::yahoo::{
    CodecError, FrameDecoder, ReconnectionConfig, ReconnectionPolicy, StreamingClient,
    StreamingError, WebSocketTransport,
};

// Rate limiting
pub use infrastructure::rate_limit::{
    RateLimitConfig, RateLimitError, RateLimitStatus, RateLimiter,
};

// Configuration
pub use infrastructure::config::{ClientSettings, ConfigError, StreamingConfig};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, init as init_telemetry};
