//! Client Configuration Settings
//!
//! Configuration types for the streaming client and the rate limiter,
//! loaded from environment variables with validated defaults.

use std::time::Duration;

use crate::infrastructure::rate_limit::RateLimitConfig;
use crate::infrastructure::yahoo::reconnect::ReconnectionConfig;

/// Default push endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://streamer.finance.yahoo.com/?version=2";

/// Default symbols streamed by the binary.
const DEFAULT_SYMBOLS: &str = "AAPL,MSFT";

/// Streaming connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingConfig {
    /// WebSocket endpoint.
    pub url: String,
    /// Longest the socket handshake may take.
    pub connect_timeout: Duration,
    /// Interval between re-subscription heartbeats.
    pub heartbeat_interval: Duration,
    /// Capacity of each output channel (prices, quotes, events).
    pub event_buffer_size: usize,
    /// Backoff settings for lost connections.
    pub reconnection: ReconnectionConfig,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(15),
            event_buffer_size: 1_024,
            reconnection: ReconnectionConfig::default(),
        }
    }
}

impl StreamingConfig {
    /// Create a configuration for a custom endpoint with default settings.
    #[must_use]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Load from environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let reconnect_defaults = ReconnectionConfig::default();

        Self {
            url: std::env::var("QUOTE_STREAM_URL").unwrap_or(defaults.url),
            connect_timeout: parse_env_duration_millis(
                "QUOTE_STREAM_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout,
            ),
            heartbeat_interval: parse_env_duration_millis(
                "QUOTE_STREAM_HEARTBEAT_INTERVAL_MS",
                defaults.heartbeat_interval,
            ),
            event_buffer_size: parse_env_usize(
                "QUOTE_STREAM_EVENT_BUFFER",
                defaults.event_buffer_size,
            ),
            reconnection: ReconnectionConfig {
                enabled: parse_env_bool(
                    "QUOTE_STREAM_RECONNECT_ENABLED",
                    reconnect_defaults.enabled,
                ),
                max_attempts: parse_env_u32(
                    "QUOTE_STREAM_RECONNECT_MAX_ATTEMPTS",
                    reconnect_defaults.max_attempts,
                ),
                initial_delay: parse_env_duration_millis(
                    "QUOTE_STREAM_RECONNECT_INITIAL_DELAY_MS",
                    reconnect_defaults.initial_delay,
                ),
                max_delay: parse_env_duration_millis(
                    "QUOTE_STREAM_RECONNECT_MAX_DELAY_MS",
                    reconnect_defaults.max_delay,
                ),
                backoff_multiplier: parse_env_f64(
                    "QUOTE_STREAM_RECONNECT_MULTIPLIER",
                    reconnect_defaults.backoff_multiplier,
                ),
            },
        }
    }

    /// Check the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::EmptyValue("url".to_string()));
        }
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ConfigError::invalid("url", "must use the ws:// or wss:// scheme"));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::invalid("connect_timeout", "must be greater than 0"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::invalid(
                "heartbeat_interval",
                "must be greater than 0",
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(ConfigError::invalid(
                "event_buffer_size",
                "must be greater than 0",
            ));
        }
        self.reconnection.validate()
    }
}

impl RateLimitConfig {
    /// Load from environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: parse_env_u32("QUOTE_RATE_LIMIT_CAPACITY", defaults.capacity),
            refill_rate: parse_env_u32("QUOTE_RATE_LIMIT_REFILL_PER_SEC", defaults.refill_rate),
            enabled: parse_env_bool("QUOTE_RATE_LIMIT_ENABLED", defaults.enabled),
            wait_timeout: parse_env_duration_millis(
                "QUOTE_RATE_LIMIT_WAIT_TIMEOUT_MS",
                defaults.wait_timeout,
            ),
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    /// Streaming connection settings.
    pub streaming: StreamingConfig,
    /// Rate limiter settings for request-style calls.
    pub rate_limit: RateLimitConfig,
    /// Symbols to stream on startup.
    pub symbols: Vec<String>,
}

impl ClientSettings {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any loaded value fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let symbols = parse_symbols(
            &std::env::var("QUOTE_STREAM_SYMBOLS").unwrap_or_else(|_| DEFAULT_SYMBOLS.to_string()),
        );
        if symbols.is_empty() {
            return Err(ConfigError::EmptyValue("QUOTE_STREAM_SYMBOLS".to_string()));
        }

        let settings = Self {
            streaming: StreamingConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            symbols,
        };
        settings.streaming.validate()?;
        settings.rate_limit.validate()?;
        Ok(settings)
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Value is empty.
    #[error("{0} cannot be empty")]
    EmptyValue(String),
    /// Value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    /// Build an [`ConfigError::Invalid`].
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Split a comma separated symbol list, dropping blanks.
#[must_use]
pub fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map_or(default, |v| match v.to_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => default,
        })
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
