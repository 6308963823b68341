//! Token Bucket Rate Limiter
//!
//! Gates outbound request-style calls to an upstream provider. One
//! instance is created per rate-limited upstream and passed (usually as
//! `Arc<RateLimiter>`) to every component that calls it.
//!
//! # Algorithm
//!
//! The bucket holds up to `capacity` tokens and refills continuously at
//! `refill_rate` tokens per second. Refill is computed lazily on every
//! access from the time elapsed since the last access; there is no
//! background timer.
//!
//! `acquire(n)` takes the lock only for the refill-and-check step, then
//! sleeps outside the lock in slices of at most [`MAX_SLEEP_SLICE`] until
//! the tokens are there or the wait budget runs out.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::infrastructure::config::ConfigError;
use crate::infrastructure::metrics;

/// Longest single sleep inside `acquire`.
pub const MAX_SLEEP_SLICE: Duration = Duration::from_millis(100);

// =============================================================================
// Configuration
// =============================================================================

/// Rate limiter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum number of tokens the bucket holds.
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_rate: u32,
    /// When `false`, `acquire` never waits.
    pub enabled: bool,
    /// Longest a caller may wait for tokens.
    pub wait_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_rate: 5,
            enabled: true,
            wait_timeout: Duration::from_secs(30),
        }
    }
}

impl RateLimitConfig {
    /// Check the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::invalid("rate_limit.capacity", "must be greater than 0"));
        }
        if self.refill_rate == 0 {
            return Err(ConfigError::invalid(
                "rate_limit.refill_rate",
                "must be greater than 0",
            ));
        }
        if self.wait_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "rate_limit.wait_timeout",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Errors and Status
// =============================================================================

/// Errors returned by [`RateLimiter::acquire`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// The tokens did not become available within the wait timeout.
    #[error("rate limit timeout for {source_name}: {requested} token(s) not available after {waited:?}")]
    Timeout {
        /// Upstream the limiter guards.
        source_name: String,
        /// Tokens requested.
        requested: u32,
        /// Time spent waiting before giving up.
        waited: Duration,
    },

    /// The request can never be satisfied (0 or more than capacity).
    #[error("invalid token request: {requested} (capacity {capacity})")]
    InvalidTokenCount {
        /// Tokens requested.
        requested: u32,
        /// Bucket capacity.
        capacity: u32,
    },
}

/// Point-in-time view of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Whole tokens currently available.
    pub available_tokens: u32,
    /// Bucket capacity.
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_rate: u32,
    /// Whether the limiter is enforcing.
    pub enabled: bool,
    /// Estimated wait for a single token.
    pub estimated_wait: Duration,
}

// =============================================================================
// Token Bucket
// =============================================================================

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn refill(&mut self, now: Instant, capacity: f64, rate: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = elapsed.as_secs_f64().mul_add(rate, self.tokens).min(capacity);
        self.last_refill = now;
    }

    fn wait_for(&self, needed: f64, rate: f64) -> Duration {
        let deficit = needed - self.tokens;
        if deficit <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(deficit / rate)
        }
    }
}

// =============================================================================
// Rate Limiter
// =============================================================================

/// Token bucket shared by concurrent callers.
///
/// # Example
///
/// ```rust
/// use quote_stream::infrastructure::rate_limit::{RateLimitConfig, RateLimiter};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let limiter = RateLimiter::new("quotes-api", RateLimitConfig::default())?;
///
/// limiter.acquire(1).await?;
/// assert!(limiter.available_tokens() < 10);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    source: String,
    config: RateLimitConfig,
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    /// Create a full bucket for the named upstream.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(source: impl Into<String>, config: RateLimitConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let bucket = TokenBucket {
            tokens: f64::from(config.capacity),
            last_refill: Instant::now(),
        };
        Ok(Self {
            source: source.into(),
            config,
            bucket: Mutex::new(bucket),
        })
    }

    /// Name of the upstream this limiter guards.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The limiter configuration.
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Consume `tokens`, waiting until they are available.
    ///
    /// Returns immediately when the limiter is disabled. Dropping the
    /// returned future cancels the wait within one sleep slice; the lock
    /// is never held across a sleep.
    ///
    /// # Errors
    ///
    /// - [`RateLimitError::InvalidTokenCount`] if `tokens` is 0 or above capacity.
    /// - [`RateLimitError::Timeout`] if the wait would exceed the configured timeout.
    pub async fn acquire(&self, tokens: u32) -> Result<(), RateLimitError> {
        if !self.config.enabled {
            return Ok(());
        }
        self.check_request(tokens)?;

        let started = Instant::now();
        loop {
            let Some(wait) = self.try_take(tokens) else {
                let waited = started.elapsed();
                if !waited.is_zero() {
                    metrics::record_rate_limit_wait(&self.source, waited);
                }
                return Ok(());
            };

            let waited = started.elapsed();
            if waited + wait > self.config.wait_timeout {
                tracing::warn!(
                    source = %self.source,
                    requested = tokens,
                    waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                    "Rate limit wait budget exhausted"
                );
                metrics::record_rate_limit_timeout(&self.source);
                return Err(RateLimitError::Timeout {
                    source_name: self.source.clone(),
                    requested: tokens,
                    waited,
                });
            }

            tracing::trace!(
                source = %self.source,
                requested = tokens,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "Waiting for rate limit tokens"
            );
            tokio::time::sleep(wait.min(MAX_SLEEP_SLICE)).await;
        }
    }

    /// Consume `tokens` only if they are available right now.
    #[must_use]
    pub fn try_acquire(&self, tokens: u32) -> bool {
        if !self.config.enabled {
            return true;
        }
        self.check_request(tokens).is_ok() && self.try_take(tokens).is_none()
    }

    /// Whole tokens currently available (after refill).
    #[must_use]
    pub fn available_tokens(&self) -> u32 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        whole_tokens(bucket.tokens)
    }

    /// Estimated wait for a single token.
    #[must_use]
    pub fn wait_time(&self) -> Duration {
        self.wait_time_for(1)
    }

    /// Estimated wait for `tokens` tokens: `max(0, (n - tokens) / rate)`.
    #[must_use]
    pub fn wait_time_for(&self, tokens: u32) -> Duration {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        bucket.wait_for(f64::from(tokens), f64::from(self.config.refill_rate))
    }

    /// Snapshot of the limiter, computed under a single lock.
    #[must_use]
    pub fn status(&self) -> RateLimitStatus {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        RateLimitStatus {
            available_tokens: whole_tokens(bucket.tokens),
            capacity: self.config.capacity,
            refill_rate: self.config.refill_rate,
            enabled: self.config.enabled,
            estimated_wait: bucket.wait_for(1.0, f64::from(self.config.refill_rate)),
        }
    }

    fn check_request(&self, tokens: u32) -> Result<(), RateLimitError> {
        if tokens == 0 || tokens > self.config.capacity {
            return Err(RateLimitError::InvalidTokenCount {
                requested: tokens,
                capacity: self.config.capacity,
            });
        }
        Ok(())
    }

    /// Refill, then take `tokens` if present. Returns the wait otherwise.
    fn try_take(&self, tokens: u32) -> Option<Duration> {
        let needed = f64::from(tokens);
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        if bucket.tokens >= needed {
            bucket.tokens -= needed;
            None
        } else {
            Some(bucket.wait_for(needed, f64::from(self.config.refill_rate)))
        }
    }

    fn refill(&self, bucket: &mut TokenBucket) {
        bucket.refill(
            Instant::now(),
            f64::from(self.config.capacity),
            f64::from(self.config.refill_rate),
        );
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_tokens(tokens: f64) -> u32 {
    tokens.max(0.0).floor() as u32
}
