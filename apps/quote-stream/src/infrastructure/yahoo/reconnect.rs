//! Reconnection Policy
//!
//! Capped exponential backoff for re-establishing the push connection.
//! The policy is a pure function of the attempt number; the attempt
//! counter itself lives in the client's reconnect loop.

use std::time::Duration;

use crate::infrastructure::config::ConfigError;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectionConfig {
    /// Whether lost connections are re-established automatically.
    pub enabled: bool,
    /// Maximum number of reconnection attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each attempt).
    pub backoff_multiplier: f64,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectionConfig {
    /// Check the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "reconnection.max_attempts",
                "must be greater than 0",
            ));
        }
        if self.initial_delay.is_zero() {
            return Err(ConfigError::invalid(
                "reconnection.initial_delay",
                "must be greater than 0",
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::invalid(
                "reconnection.max_delay",
                "must be at least the initial delay",
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "reconnection.backoff_multiplier",
                "must be a finite value >= 1.0",
            ));
        }
        Ok(())
    }
}

/// Reconnection policy implementing capped exponential backoff.
///
/// `delay(attempt) = min(initial_delay * multiplier^attempt, max_delay)`
/// with a zero-based `attempt`.
///
/// # Example
///
/// ```rust
/// use quote_stream::infrastructure::yahoo::reconnect::{ReconnectionConfig, ReconnectionPolicy};
/// use std::time::Duration;
///
/// let policy = ReconnectionPolicy::new(ReconnectionConfig::default()).unwrap();
///
/// assert_eq!(policy.delay(0), Duration::from_secs(1));
/// assert_eq!(policy.delay(3), Duration::from_secs(8));
/// assert_eq!(policy.delay(20), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectionPolicy {
    config: ReconnectionConfig,
}

impl ReconnectionPolicy {
    /// Create a new reconnection policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ReconnectionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Backoff delay for a zero-based attempt.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let initial_ms = self.config.initial_delay.as_millis() as f64;
        #[allow(clippy::cast_precision_loss)]
        let max_ms = self.config.max_delay.as_millis() as f64;

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = initial_ms * self.config.backoff_multiplier.powi(exponent);

        // powi overflows to +inf for large attempts; min() then caps it.
        let capped = if scaled.is_finite() {
            scaled.min(max_ms)
        } else {
            max_ms
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(capped.round() as u64)
    }

    /// Check if another attempt is allowed. `attempt` is 1-based.
    #[must_use]
    pub const fn allows(&self, attempt: u32) -> bool {
        attempt <= self.config.max_attempts
    }

    /// Whether automatic reconnection is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Maximum number of attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// The underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconnectionConfig {
        &self.config
    }
}
