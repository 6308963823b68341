//! Streaming Client
//!
//! Owns one push connection at a time and keeps it alive:
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──ok──▶ Connected
//!       ▲                         │                  │ socket lost
//!       │ fail                    ▼                  ▼
//!       └──────────────── (initial connect)    Reconnecting(n) ──▶ Connecting
//!                                                    │ n > max_attempts
//!                                                    ▼
//!                                                  Closed
//! ```
//!
//! # Tasks
//!
//! Each connection runs a receive loop and a [`HeartbeatManager`], both
//! bound to a per-session [`CancellationToken`]. When the receive loop
//! sees the socket go away it cancels the session and hands over to a
//! reconnect task. Tokens nest as `client → run → session`: `close()`
//! cancels the client token, `disconnect()` cancels the current run
//! (which spans reconnects), and a lost socket cancels only its session.
//!
//! Control writes are bounded by the connect timeout and abandoned as soon
//! as their session or run is cancelled. A lost session releases only its
//! own writer, so a stalled write never delays the reconnect.
//!
//! # Streams
//!
//! Prices, quotes and lifecycle events are published on independent
//! broadcast channels. A slow subscriber lags and loses the oldest items;
//! it never blocks the receive loop.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::codec::{DecodedFrame, FrameDecoder};
use super::heartbeat::HeartbeatManager;
use super::messages::SubscriptionRequest;
use super::reconnect::ReconnectionPolicy;
use super::transport::{SessionId, SharedSink, WebSocketTransport};
use crate::application::ports::{FrameSource, InboundFrame, StreamTransport, TransportError};
use crate::domain::streaming::{ConnectionEvent, ConnectionState, StreamingPrice, StreamingQuote};
use crate::domain::subscription::{SubscriptionChange, SubscriptionRegistry};
use crate::infrastructure::config::{ConfigError, StreamingConfig};
use crate::infrastructure::metrics::{self, StreamKind};

// =============================================================================
// Errors
// =============================================================================

/// Streaming client error types.
#[derive(Debug, thiserror::Error)]
pub enum StreamingError {
    /// The socket could not be opened.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The handshake did not finish within the connect timeout.
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// `close()` has been called; the client cannot be reused.
    #[error("client is closed")]
    ClientClosed,

    /// `disconnect()` or `close()` raced with an in-flight connect.
    #[error("connection attempt cancelled")]
    Cancelled,

    /// Transport failure outside the handshake.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

// =============================================================================
// Streaming Client
// =============================================================================

/// Resilient, auto-reconnecting streaming quote client.
///
/// Dropping the client stops its background tasks.
pub struct StreamingClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: StreamingConfig,
    policy: ReconnectionPolicy,
    transport: Arc<dyn StreamTransport>,
    decoder: FrameDecoder,
    registry: Arc<SubscriptionRegistry>,
    sink: Arc<SharedSink>,
    state: RwLock<ConnectionState>,
    connect_lock: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    run: Mutex<CancellationToken>,
    prices: broadcast::Sender<StreamingPrice>,
    quotes: broadcast::Sender<StreamingQuote>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl std::fmt::Debug for StreamingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingClient")
            .field("url", &self.inner.config.url)
            .field("state", &self.state())
            .field("subscriptions", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

impl StreamingClient {
    /// Create a client that connects over WebSocket.
    ///
    /// No connection is made until [`connect`](Self::connect) or the
    /// first [`subscribe`](Self::subscribe).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: StreamingConfig) -> Result<Self, StreamingError> {
        Self::with_transport(config, Arc::new(WebSocketTransport::default()))
    }

    /// Create a client over a custom transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_transport(
        config: StreamingConfig,
        transport: Arc<dyn StreamTransport>,
    ) -> Result<Self, StreamingError> {
        config.validate()?;
        let policy = ReconnectionPolicy::new(config.reconnection.clone())?;

        let capacity = config.event_buffer_size;
        let write_timeout = config.connect_timeout;
        let (prices, _) = broadcast::channel(capacity);
        let (quotes, _) = broadcast::channel(capacity);
        let (events, _) = broadcast::channel(capacity);

        let shutdown = CancellationToken::new();
        let run = shutdown.child_token();

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                policy,
                transport,
                decoder: FrameDecoder::new(),
                registry: Arc::new(SubscriptionRegistry::new()),
                sink: Arc::new(SharedSink::with_write_timeout(write_timeout)),
                state: RwLock::new(ConnectionState::Disconnected),
                connect_lock: tokio::sync::Mutex::new(()),
                shutdown,
                run: Mutex::new(run),
                prices,
                quotes,
                events,
            }),
        })
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Open the connection.
    ///
    /// Returns immediately if a connection or a reconnection is already in
    /// progress. A failed initial connect leaves the client disconnected
    /// and does not count against the reconnection budget.
    ///
    /// # Errors
    ///
    /// Returns [`StreamingError::ConnectionFailed`] or
    /// [`StreamingError::ConnectTimeout`] if the socket cannot be opened,
    /// and [`StreamingError::ClientClosed`] after [`close`](Self::close).
    pub async fn connect(&self) -> Result<(), StreamingError> {
        let _guard = self.inner.connect_lock.lock().await;

        if self.inner.shutdown.is_cancelled() {
            return Err(StreamingError::ClientClosed);
        }

        match self.state() {
            ConnectionState::Connected
            | ConnectionState::Connecting
            | ConnectionState::Reconnecting { .. } => return Ok(()),
            ConnectionState::Disconnected | ConnectionState::Closed => {}
        }

        let run = self.inner.new_run();
        tracing::info!(url = %self.inner.config.url, "Connecting to stream");

        match self.inner.establish(&run).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.inner
                    .set_state_if_running(&run, ConnectionState::Disconnected);
                tracing::warn!(error = %e, "Initial connection failed");
                Err(e)
            }
        }
    }

    /// Drop the connection and stop reconnecting.
    ///
    /// Subscriptions are kept; a later [`connect`](Self::connect) or
    /// [`subscribe`](Self::subscribe) replays them.
    pub async fn disconnect(&self) {
        let previous = {
            let mut state = self.inner.state.write();
            self.inner.run.lock().cancel();
            let previous = *state;
            if previous != ConnectionState::Closed {
                *state = ConnectionState::Disconnected;
                metrics::set_connection_state(ConnectionState::Disconnected);
            }
            previous
        };

        self.inner.sink.close().await;

        if matches!(
            previous,
            ConnectionState::Connected | ConnectionState::Reconnecting { .. }
        ) {
            self.inner.emit(ConnectionEvent::Disconnected {
                reason: "disconnect requested".to_string(),
            });
        }
        tracing::info!(previous = %previous, "Disconnected from stream");
    }

    /// Shut the client down for good.
    ///
    /// Stops every background task and closes the socket with a normal
    /// closure. Later `connect` and `subscribe` calls fail with
    /// [`StreamingError::ClientClosed`].
    pub async fn close(&self) {
        let previous = {
            let mut state = self.inner.state.write();
            self.inner.shutdown.cancel();
            let previous = *state;
            *state = ConnectionState::Closed;
            metrics::set_connection_state(ConnectionState::Closed);
            previous
        };

        self.inner.sink.close().await;

        if matches!(
            previous,
            ConnectionState::Connected | ConnectionState::Reconnecting { .. }
        ) {
            self.inner.emit(ConnectionEvent::Disconnected {
                reason: "client closed".to_string(),
            });
        }
        tracing::info!("Streaming client closed");
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Add symbols to the subscription set.
    ///
    /// While connected only the newly added symbols are sent upstream.
    /// While disconnected this opens the connection, which then replays
    /// the whole set. During a reconnection the change is only recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if an automatic connect fails or the client is
    /// closed. The symbols stay registered either way.
    pub async fn subscribe<I, S>(&self, symbols: I) -> Result<(), StreamingError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.inner.shutdown.is_cancelled() {
            return Err(StreamingError::ClientClosed);
        }

        let change = self.inner.registry.add(symbols);
        self.inner.announce(&change);

        match self.state() {
            ConnectionState::Connected => {
                if !change.is_empty() {
                    let run = self.inner.current_run();
                    self.inner
                        .send_control(SubscriptionRequest::subscribe(change.changed), &run)
                        .await;
                }
                Ok(())
            }
            ConnectionState::Disconnected | ConnectionState::Closed => self.connect().await,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. } => Ok(()),
        }
    }

    /// Remove symbols from the subscription set.
    ///
    /// Never opens a connection.
    pub async fn unsubscribe<I, S>(&self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let change = self.inner.registry.remove(symbols);
        self.inner.announce(&change);
        self.unsubscribe_upstream(change).await;
    }

    /// Remove every symbol from the subscription set.
    pub async fn unsubscribe_all(&self) {
        let change = self.inner.registry.clear();
        self.inner.announce(&change);
        self.unsubscribe_upstream(change).await;
    }

    async fn unsubscribe_upstream(&self, change: SubscriptionChange) {
        if !change.is_empty() && self.is_connected() {
            let run = self.inner.current_run();
            self.inner
                .send_control(SubscriptionRequest::unsubscribe(change.changed), &run)
                .await;
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    /// Check if the socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Current subscription set.
    #[must_use]
    pub fn subscribed_symbols(&self) -> BTreeSet<String> {
        self.inner.registry.snapshot()
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &StreamingConfig {
        &self.inner.config
    }

    // -------------------------------------------------------------------------
    // Streams
    // -------------------------------------------------------------------------

    /// Subscribe to every price tick.
    #[must_use]
    pub fn prices(&self) -> broadcast::Receiver<StreamingPrice> {
        self.inner.prices.subscribe()
    }

    /// Subscribe to full quotes.
    #[must_use]
    pub fn quotes(&self) -> broadcast::Receiver<StreamingQuote> {
        self.inner.quotes.subscribe()
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Price ticks for one symbol. Lagged items are skipped.
    pub fn prices_for(&self, symbol: &str) -> impl Stream<Item = StreamingPrice> + Send + 'static {
        let symbol = SubscriptionRegistry::normalize(symbol).unwrap_or_default();
        BroadcastStream::new(self.prices()).filter_map(move |item| match item {
            Ok(price) if price.symbol == symbol => Some(price),
            _ => None,
        })
    }

    /// Quotes for one symbol. Lagged items are skipped.
    pub fn quotes_for(&self, symbol: &str) -> impl Stream<Item = StreamingQuote> + Send + 'static {
        let symbol = SubscriptionRegistry::normalize(symbol).unwrap_or_default();
        BroadcastStream::new(self.quotes()).filter_map(move |item| match item {
            Ok(quote) if quote.symbol == symbol => Some(quote),
            _ => None,
        })
    }
}

impl Drop for StreamingClient {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

// =============================================================================
// Connection Management
// =============================================================================

impl Inner {
    /// Cancel the current run and start a fresh one.
    fn new_run(&self) -> CancellationToken {
        let mut run = self.run.lock();
        run.cancel();
        *run = self.shutdown.child_token();
        run.clone()
    }

    fn current_run(&self) -> CancellationToken {
        self.run.lock().clone()
    }

    /// Transition unless the run has been cancelled.
    ///
    /// The check and the write happen under the state lock, the same lock
    /// `disconnect` and `close` cancel under.
    fn set_state_if_running(&self, run: &CancellationToken, next: ConnectionState) -> bool {
        let mut state = self.state.write();
        if run.is_cancelled() {
            return false;
        }
        *state = next;
        metrics::set_connection_state(next);
        true
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
        metrics::record_published(StreamKind::Events);
    }

    fn announce(&self, change: &SubscriptionChange) {
        metrics::set_subscriptions(change.current.len());
        if !change.is_empty() {
            self.emit(ConnectionEvent::SubscriptionUpdated {
                symbols: change.current.clone(),
            });
        }
    }

    /// Send a control message unless `cancel` fires first.
    ///
    /// The write itself is bounded by the sink's write timeout.
    async fn send_control(&self, request: SubscriptionRequest, cancel: &CancellationToken) {
        let result = tokio::select! {
            () = cancel.cancelled() => return,
            result = self.sink.send_request(&request) => result,
        };
        if let Err(e) = result {
            tracing::warn!(
                error = %e,
                subscribe = ?request.subscribe,
                unsubscribe = ?request.unsubscribe,
                "Failed to send subscription update"
            );
        }
    }

    /// Open a socket and start its session tasks.
    async fn establish(self: &Arc<Self>, run: &CancellationToken) -> Result<(), StreamingError> {
        if !self.set_state_if_running(run, ConnectionState::Connecting) {
            return Err(StreamingError::Cancelled);
        }

        let timeout = self.config.connect_timeout;
        let session =
            match tokio::time::timeout(timeout, self.transport.connect(&self.config.url)).await {
                Err(_) => return Err(StreamingError::ConnectTimeout(timeout)),
                Ok(Err(e)) => return Err(StreamingError::ConnectionFailed(e.to_string())),
                Ok(Ok(session)) => session,
            };

        let session_id = self.sink.install(session.sink).await;

        if !self.set_state_if_running(run, ConnectionState::Connected) {
            self.sink.close_session(session_id).await;
            return Err(StreamingError::Cancelled);
        }

        tracing::info!(url = %self.config.url, "Connected to stream");
        self.emit(ConnectionEvent::Connected);

        let session_token = run.child_token();
        tokio::spawn(Arc::clone(self).receive_loop(
            session.source,
            session_id,
            run.clone(),
            session_token.clone(),
        ));
        tokio::spawn(
            HeartbeatManager::new(
                self.config.heartbeat_interval,
                Arc::clone(&self.registry),
                Arc::clone(&self.sink),
                session_token.clone(),
            )
            .run(),
        );

        if !self.registry.is_empty() {
            let symbols = self.registry.to_vec();
            tracing::debug!(count = symbols.len(), "Replaying subscriptions");
            self.send_control(SubscriptionRequest::subscribe(symbols), &session_token)
                .await;
        }

        Ok(())
    }

    /// Read frames until the socket goes away, then hand over to reconnect.
    fn receive_loop(
        self: Arc<Self>,
        mut source: Box<dyn FrameSource>,
        session_id: SessionId,
        run: CancellationToken,
        session: CancellationToken,
    ) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let reason = loop {
                tokio::select! {
                    () = session.cancelled() => return,
                    frame = source.next_frame() => match frame {
                        Some(Ok(InboundFrame::Text(text))) => self.handle_frame(&text),
                        Some(Ok(InboundFrame::Close { reason })) => {
                            break reason
                                .filter(|r| !r.is_empty())
                                .map_or_else(
                                    || "closed by server".to_string(),
                                    |r| format!("closed by server: {r}"),
                                );
                        }
                        Some(Err(e)) => break e.to_string(),
                        None => break "stream ended".to_string(),
                    },
                }
            };

            session.cancel();
            self.connection_lost(reason, session_id, run);
        })
    }

    fn handle_frame(&self, text: &str) {
        metrics::record_frame_received();

        match self.decoder.decode(text) {
            Ok(Some(DecodedFrame { price, quote })) => {
                let _ = self.prices.send(price);
                metrics::record_published(StreamKind::Prices);
                if let Some(quote) = quote {
                    let _ = self.quotes.send(quote);
                    metrics::record_published(StreamKind::Quotes);
                }
            }
            Ok(None) => tracing::trace!("Dropping record without symbol"),
            Err(e) => {
                tracing::warn!(error = %e, len = text.len(), "Failed to decode frame");
                metrics::record_decode_error();
                self.emit(ConnectionEvent::error(format!("failed to decode frame: {e}")));
            }
        }
    }

    fn connection_lost(
        self: Arc<Self>,
        reason: String,
        session_id: SessionId,
        run: CancellationToken,
    ) {
        // Only this session's writer; a newer session may already be installed.
        self.sink.release(session_id);

        if run.is_cancelled() {
            return;
        }

        tracing::warn!(reason = %reason, "Connection lost");
        self.emit(ConnectionEvent::Disconnected { reason });

        if !self.policy.is_enabled() {
            self.set_state_if_running(&run, ConnectionState::Disconnected);
            tracing::info!("Reconnection disabled, staying disconnected");
            return;
        }

        tokio::spawn(self.reconnect_loop(run));
    }

    /// Retry with backoff until connected, cancelled, or out of attempts.
    fn reconnect_loop(self: Arc<Self>, run: CancellationToken) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let mut attempt = 0_u32;
            loop {
                attempt = attempt.saturating_add(1);

                if !self.policy.allows(attempt) {
                    let max_attempts = self.policy.max_attempts();
                    tracing::error!(max_attempts, "Reconnection attempts exhausted");
                    if self.set_state_if_running(&run, ConnectionState::Closed) {
                        self.emit(ConnectionEvent::fatal(format!(
                            "reconnection failed after {max_attempts} attempts"
                        )));
                    }
                    return;
                }

                if !self.set_state_if_running(&run, ConnectionState::Reconnecting { attempt }) {
                    return;
                }
                self.emit(ConnectionEvent::Reconnecting { attempt });
                metrics::record_reconnect();

                let delay = self.policy.delay(attempt - 1);
                tracing::info!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Reconnecting to stream"
                );

                tokio::select! {
                    () = run.cancelled() => return,
                    () = tokio::time::sleep(delay) => {}
                }

                let _guard = self.connect_lock.lock().await;
                match self.establish(&run).await {
                    Ok(()) => {
                        tracing::info!(attempt, "Reconnected to stream");
                        return;
                    }
                    Err(StreamingError::Cancelled) => return,
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "Reconnection attempt failed");
                        self.emit(ConnectionEvent::error(format!(
                            "reconnection attempt {attempt} failed: {e}"
                        )));
                    }
                }
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
