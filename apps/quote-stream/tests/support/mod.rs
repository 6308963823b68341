//! Shared fixtures for the streaming client integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use quote_stream::infrastructure::yahoo::PricingData;
use quote_stream::{
    ConnectionEvent, FrameDecoder, FrameSink, FrameSource, InboundFrame, ReconnectionConfig,
    Session, StreamTransport, StreamingConfig, TransportError,
};

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(3);

// =============================================================================
// Scripted Transport
// =============================================================================

/// In-memory transport whose sessions are driven by the test.
#[derive(Default)]
pub struct ScriptedTransport {
    attempts: AtomicUsize,
    refuse: AtomicBool,
    hang: AtomicBool,
    sessions: Mutex<Vec<ServerEnd>>,
}

/// The server side of one accepted session.
#[derive(Clone)]
pub struct ServerEnd {
    frames: mpsc::UnboundedSender<Result<InboundFrame, TransportError>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
}

impl ServerEnd {
    /// Push a raw text frame to the client.
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.frames.send(Ok(InboundFrame::Text(text.into())));
    }

    /// Push an encoded pricing record to the client.
    pub fn push_record(&self, record: &PricingData) {
        self.push_text(FrameDecoder::new().encode(record).unwrap());
    }

    /// Send a close frame.
    pub fn close(&self, reason: &str) {
        let _ = self.frames.send(Ok(InboundFrame::Close {
            reason: Some(reason.to_string()),
        }));
    }

    /// Fail the socket as a network drop would.
    pub fn reset(&self) {
        let _ = self
            .frames
            .send(Err(TransportError::Receive("connection reset".to_string())));
    }

    /// Control messages the client wrote on this session.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Wait until the client has written at least `count` messages.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<String> {
        timeout(WAIT, async {
            loop {
                let sent = self.sent();
                if sent.len() >= count {
                    return sent;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("client never wrote the expected messages")
    }

    /// Make every following client write on this session hang.
    pub fn stall_writes(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    /// Whether the client closed its write half.
    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ScriptedTransport {
    /// Create a transport that accepts every connect.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuse (or accept again) every following connect.
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Never finish (or finish again) following handshakes.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Connect attempts seen so far, refused ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Sessions accepted so far.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Wait until the `index`-th session (0-based) is accepted.
    pub async fn session(&self, index: usize) -> ServerEnd {
        timeout(WAIT, async {
            loop {
                if let Some(end) = self.sessions.lock().get(index).cloned() {
                    return end;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session was never opened")
    }

    /// Erase the concrete type for `StreamingClient::with_transport`.
    pub fn as_transport(self: &Arc<Self>) -> Arc<dyn StreamTransport> {
        Arc::clone(self) as Arc<dyn StreamTransport>
    }
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn connect(&self, _url: &str) -> Result<Session, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (frames, rx) = mpsc::unbounded_channel();
        let end = ServerEnd {
            frames,
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            stalled: Arc::new(AtomicBool::new(false)),
        };
        let session = Session {
            sink: Box::new(ScriptedSink {
                sent: Arc::clone(&end.sent),
                closed: Arc::clone(&end.closed),
                stalled: Arc::clone(&end.stalled),
            }),
            source: Box::new(ScriptedSource { frames: rx }),
        };
        self.sessions.lock().push(end);
        Ok(session)
    }
}

struct ScriptedSink {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for ScriptedSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedSource {
    frames: mpsc::UnboundedReceiver<Result<InboundFrame, TransportError>>,
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        self.frames.recv().await
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Client configuration with short delays.
pub fn fast_config(max_attempts: u32) -> StreamingConfig {
    StreamingConfig {
        url: "ws://scripted.test/".to_string(),
        connect_timeout: Duration::from_millis(500),
        heartbeat_interval: Duration::from_secs(60),
        event_buffer_size: 64,
        reconnection: ReconnectionConfig {
            enabled: true,
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            backoff_multiplier: 2.0,
        },
    }
}

/// Next lifecycle event, failing the test on timeout.
pub async fn next_event(events: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Collect events up to and including the first one matching `done`.
pub async fn events_until(
    events: &mut broadcast::Receiver<ConnectionEvent>,
    done: impl Fn(&ConnectionEvent) -> bool,
) -> Vec<ConnectionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(events).await;
        let finished = done(&event);
        seen.push(event);
        if finished {
            return seen;
        }
    }
}

/// A price-only tick.
pub fn tick(symbol: &str, price: f32) -> PricingData {
    PricingData {
        id: symbol.to_string(),
        price,
        time: 1_700_000_000_000,
        market_hours: 1,
        day_volume: 1_000,
        ..Default::default()
    }
}

/// A tick carrying the identity fields that produce a full quote.
pub fn full_tick(symbol: &str, price: f32) -> PricingData {
    PricingData {
        short_name: format!("{symbol} Corp."),
        currency: "USD".to_string(),
        exchange: "NMS".to_string(),
        quote_type: 8,
        bid: price - 0.05,
        bid_size: 100,
        ask: price + 0.05,
        ask_size: 200,
        ..tick(symbol, price)
    }
}
