//! Tracing Initialisation
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG`.
//! Library code only emits `tracing` events; installing a subscriber is
//! left to the binary (or to the embedding application).
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Filter directives (default: `quote_stream=info`)
//! - `QUOTE_STREAM_LOG_ANSI`: Set to "false" to disable colours (default: true)

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Directive applied when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVE: &str = "quote_stream=info";

/// Noisy dependencies capped at `warn`.
const QUIET_TARGETS: [&str; 3] = ["tungstenite", "tokio_tungstenite", "rustls"];

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub default_directive: String,
    /// Emit ANSI colours.
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_directive: DEFAULT_DIRECTIVE.to_string(),
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let ansi = std::env::var("QUOTE_STREAM_LOG_ANSI")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            ansi,
            ..Self::default()
        }
    }

    /// Build the filter: `RUST_LOG` if set, the default directive otherwise,
    /// with noisy transport crates capped at `warn`.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        let base = std::env::var(EnvFilter::DEFAULT_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.default_directive.clone());

        let directives = std::iter::once(base)
            .chain(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")))
            .collect::<Vec<_>>()
            .join(",");

        EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
    }
}

/// Initialize tracing with configuration from the environment.
///
/// Does nothing if a global subscriber is already installed.
pub fn init() {
    init_with_config(&TelemetryConfig::from_env());
}

/// Initialize tracing with custom configuration.
pub fn init_with_config(config: &TelemetryConfig) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(config.ansi);

    let _ = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init();
}

// =============================================================================
// Tests
// =============================================================================
