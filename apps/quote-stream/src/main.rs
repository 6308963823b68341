//! Quote Stream Binary
//!
//! Streams live quotes for a list of symbols and logs them.
//!
//! # Usage
//!
//! ```bash
//! QUOTE_STREAM_SYMBOLS=AAPL,MSFT,BTC-USD cargo run --bin quote-stream
//! ```
//!
//! # Environment Variables
//!
//! - `QUOTE_STREAM_SYMBOLS`: Comma separated symbols (default: AAPL,MSFT)
//! - `QUOTE_STREAM_URL`: Push endpoint (default: Yahoo Finance streamer)
//! - `QUOTE_STREAM_RECONNECT_*`: Reconnection policy
//! - `QUOTE_RATE_LIMIT_*`: Token bucket for control calls
//! - `RUST_LOG`: Log filter (default: `quote_stream=info`)

use std::sync::Arc;

use anyhow::Context;
use quote_stream::infrastructure::telemetry;
use quote_stream::{
    ClientSettings, ConnectionEvent, RateLimiter, StreamingClient, init_metrics,
};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;

/// Symbols sent per subscribe call.
const SUBSCRIBE_BATCH: usize = 25;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Err means a provider is already installed, which is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();

    load_dotenv();
    telemetry::init();

    tracing::info!("Starting quote stream");

    let metrics_handle = init_metrics().context("failed to install metrics recorder")?;

    let settings = ClientSettings::from_env().context("invalid configuration")?;
    log_settings(&settings);

    let limiter = Arc::new(
        RateLimiter::new("yahoo-stream", settings.rate_limit.clone())
            .context("invalid rate limit configuration")?,
    );
    let client = Arc::new(
        StreamingClient::new(settings.streaming.clone())
            .context("invalid streaming configuration")?,
    );

    spawn_event_logger(&client);
    spawn_price_logger(&client);
    spawn_quote_logger(&client);

    for batch in settings.symbols.chunks(SUBSCRIBE_BATCH) {
        limiter
            .acquire(1)
            .await
            .context("rate limited while subscribing")?;
        client
            .subscribe(batch)
            .await
            .with_context(|| format!("failed to subscribe to {batch:?}"))?;
    }

    tracing::info!(
        symbols = ?client.subscribed_symbols(),
        "Quote stream ready"
    );

    await_shutdown().await;

    client.close().await;
    tracing::debug!(
        rate_limit = ?limiter.status(),
        metrics = %metrics_handle.render(),
        "Final state"
    );
    tracing::info!("Quote stream stopped");
    Ok(())
}

fn spawn_event_logger(client: &StreamingClient) {
    let mut events = client.events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ConnectionEvent::Connected) => tracing::info!("Stream connected"),
                Ok(ConnectionEvent::Disconnected { reason }) => {
                    tracing::warn!(reason = %reason, "Stream disconnected");
                }
                Ok(ConnectionEvent::Reconnecting { attempt }) => {
                    tracing::info!(attempt, "Stream reconnecting");
                }
                Ok(ConnectionEvent::SubscriptionUpdated { symbols }) => {
                    tracing::debug!(count = symbols.len(), "Subscriptions updated");
                }
                Ok(ConnectionEvent::Error { message, fatal }) => {
                    if fatal {
                        tracing::error!(error = %message, "Stream gave up");
                    } else {
                        tracing::warn!(error = %message, "Stream error");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_price_logger(client: &StreamingClient) {
    let mut prices = client.prices();
    tokio::spawn(async move {
        loop {
            match prices.recv().await {
                Ok(price) => tracing::info!(
                    symbol = %price.symbol,
                    price = price.price,
                    change_percent = price.change_percent,
                    session = price.market_hours.as_str(),
                    "Price"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Price logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_quote_logger(client: &StreamingClient) {
    let mut quotes = client.quotes();
    tokio::spawn(async move {
        loop {
            match quotes.recv().await {
                Ok(quote) => tracing::debug!(
                    symbol = %quote.symbol,
                    name = %quote.short_name,
                    exchange = %quote.exchange,
                    bid = ?quote.bid,
                    ask = ?quote.ask,
                    "Quote"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Quote logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Log the parsed configuration.
fn log_settings(settings: &ClientSettings) {
    let reconnection = &settings.streaming.reconnection;
    tracing::info!(
        url = %settings.streaming.url,
        symbols = settings.symbols.len(),
        reconnect = reconnection.enabled,
        max_attempts = reconnection.max_attempts,
        rate_limit_capacity = settings.rate_limit.capacity,
        rate_limit_refill = settings.rate_limit.refill_rate,
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGINT or SIGTERM.
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
