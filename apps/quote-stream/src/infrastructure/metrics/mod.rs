//! Prometheus Metrics Module
//!
//! Instrumentation for the streaming client and rate limiter through the
//! `metrics` facade. Recording is a no-op until a recorder is installed;
//! the binary installs the Prometheus one with [`init_metrics`].
//!
//! # Metrics Categories
//!
//! - **Frames**: frames received and frames that failed to decode
//! - **Events**: events published per output stream
//! - **Connection**: state gauge, reconnect attempts, subscription count
//! - **Rate limiting**: wait time and timeouts per upstream

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::streaming::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and register metric descriptions.
///
/// Calling it again returns the already installed handle.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "quote_stream_frames_received_total",
        "Total text frames received from the push connection"
    );
    describe_counter!(
        "quote_stream_decode_errors_total",
        "Total frames that failed to decode"
    );
    describe_counter!(
        "quote_stream_events_published_total",
        "Total events published by output stream"
    );
    describe_counter!(
        "quote_stream_reconnects_total",
        "Total reconnection attempts"
    );
    describe_gauge!(
        "quote_stream_connection_state",
        "Connection state (0 disconnected, 1 connecting, 2 connected, 3 reconnecting, 4 closed)"
    );
    describe_gauge!(
        "quote_stream_subscriptions",
        "Number of subscribed symbols"
    );
    describe_histogram!(
        "quote_stream_rate_limit_wait_seconds",
        "Time callers spent waiting for rate limit tokens"
    );
    describe_counter!(
        "quote_stream_rate_limit_timeouts_total",
        "Total rate limit waits that timed out"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Output stream labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Price ticks.
    Prices,
    /// Full quotes.
    Quotes,
    /// Lifecycle events.
    Events,
}

impl StreamKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Prices => "prices",
            Self::Quotes => "quotes",
            Self::Events => "events",
        }
    }
}

/// Record a text frame received from the socket.
pub fn record_frame_received() {
    counter!("quote_stream_frames_received_total").increment(1);
}

/// Record a frame that failed to decode.
pub fn record_decode_error() {
    counter!("quote_stream_decode_errors_total").increment(1);
}

/// Record an event published on an output stream.
pub fn record_published(stream: StreamKind) {
    counter!(
        "quote_stream_events_published_total",
        "stream" => stream.as_str()
    )
    .increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("quote_stream_reconnects_total").increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("quote_stream_connection_state").set(state.as_gauge());
}

/// Update the subscription count gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(count: usize) {
    gauge!("quote_stream_subscriptions").set(count as f64);
}

/// Record time spent waiting for rate limit tokens.
pub fn record_rate_limit_wait(source: &str, waited: Duration) {
    histogram!(
        "quote_stream_rate_limit_wait_seconds",
        "source" => source.to_string()
    )
    .record(waited.as_secs_f64());
}

/// Record a rate limit wait that timed out.
pub fn record_rate_limit_timeout(source: &str) {
    counter!(
        "quote_stream_rate_limit_timeouts_total",
        "source" => source.to_string()
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
