//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the transport ports plus the ambient
//! pieces the client needs: configuration, rate limiting, metrics and
//! logging.

/// Yahoo Finance streamer adapter and streaming client.
pub mod yahoo;

/// Token bucket rate limiting for request-style upstream calls.
pub mod rate_limit;

/// Configuration loading and validation.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber setup.
pub mod telemetry;
