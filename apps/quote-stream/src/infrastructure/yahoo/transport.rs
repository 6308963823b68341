//! WebSocket Transport
//!
//! `tokio-tungstenite` implementation of the transport ports, plus the
//! shared writer the heartbeat loop and subscription calls send through.
//!
//! Ping/pong control frames are answered by tungstenite and never reach
//! the receive loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::messages::SubscriptionRequest;
use crate::application::ports::{
    FrameSink, FrameSource, InboundFrame, Session, StreamTransport, TransportError,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Origin the upstream expects on the handshake.
const DEFAULT_ORIGIN: &str = "https://finance.yahoo.com";

// =============================================================================
// WebSocket Transport
// =============================================================================

/// Opens WebSocket sessions with `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    headers: Vec<(String, String)>,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self {
            headers: vec![("Origin".to_string(), DEFAULT_ORIGIN.to_string())],
        }
    }
}

impl WebSocketTransport {
    /// Create a transport without extra handshake headers.
    #[must_use]
    pub const fn bare() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    /// Add a handshake header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[async_trait]
impl StreamTransport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<Session, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Connect(format!("invalid header name: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Connect(format!("invalid header value: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        let (ws_stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        tracing::debug!(status = %response.status(), "WebSocket handshake complete");

        let (write, read) = ws_stream.split();
        Ok(Session {
            sink: Box::new(WsSink { inner: write }),
            source: Box::new(WsSource { inner: read }),
        })
    }
}

struct WsSink {
    inner: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "client closing".into(),
        };
        self.inner
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        self.inner
            .close()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

struct WsSource {
    inner: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        loop {
            let frame = match self.inner.next().await? {
                Ok(Message::Text(text)) => Ok(InboundFrame::Text(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => Ok(InboundFrame::Text(text)),
                    Err(_) => {
                        tracing::trace!(len = bytes.len(), "Ignoring non-UTF-8 binary frame");
                        continue;
                    }
                },
                Ok(Message::Close(frame)) => Ok(InboundFrame::Close {
                    reason: frame.map(|f| f.reason.as_str().to_owned()),
                }),
                Ok(_) => continue,
                Err(e) => Err(TransportError::Receive(e.to_string())),
            };
            return Some(frame);
        }
    }
}

// =============================================================================
// Shared Sink
// =============================================================================

/// Default bound on a single control write or close.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Identifies one installed session writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionId(u64);

type Writer = Arc<Mutex<Box<dyn FrameSink>>>;

struct Slot {
    id: SessionId,
    writer: Writer,
}

/// Write half of the current session, shared between tasks.
///
/// Empty while disconnected; sends then fail with [`TransportError::Closed`].
/// The slot lock is never held across a write, so a stalled socket only
/// blocks writers of its own session, and each write or close gives up
/// after the write timeout.
pub struct SharedSink {
    write_timeout: Duration,
    next_id: AtomicU64,
    current: parking_lot::Mutex<Option<Slot>>,
}

impl Default for SharedSink {
    fn default() -> Self {
        Self::with_write_timeout(DEFAULT_WRITE_TIMEOUT)
    }
}

impl std::fmt::Debug for SharedSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSink")
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}

impl SharedSink {
    /// Create an empty sink slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty sink slot with a custom write timeout.
    #[must_use]
    pub fn with_write_timeout(write_timeout: Duration) -> Self {
        Self {
            write_timeout,
            next_id: AtomicU64::new(0),
            current: parking_lot::Mutex::new(None),
        }
    }

    /// Install the write half of a new session.
    ///
    /// A previously installed writer is closed.
    pub async fn install(&self, sink: Box<dyn FrameSink>) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let previous = self.current.lock().replace(Slot {
            id,
            writer: Arc::new(Mutex::new(sink)),
        });
        if let Some(stale) = previous {
            self.close_writer(stale.writer).await;
        }
        id
    }

    /// Drop the writer of `id` without closing it.
    ///
    /// Does nothing if another session has been installed since. Never
    /// waits on an in-flight write.
    pub fn release(&self, id: SessionId) -> bool {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|slot| slot.id == id) {
            *current = None;
            true
        } else {
            false
        }
    }

    /// Serialize and send a control message on the current session.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] when no session is installed,
    /// [`TransportError::WriteTimeout`] when the write stalls, or the
    /// adapter's error when the write fails.
    pub async fn send_request(&self, request: &SubscriptionRequest) -> Result<(), TransportError> {
        let json = request
            .to_json()
            .map_err(|e| TransportError::Send(format!("failed to serialize request: {e}")))?;

        let writer = self
            .current
            .lock()
            .as_ref()
            .map(|slot| Arc::clone(&slot.writer))
            .ok_or(TransportError::Closed)?;

        tokio::time::timeout(self.write_timeout, async move {
            writer.lock().await.send_text(json).await
        })
        .await
        .map_err(|_| TransportError::WriteTimeout(self.write_timeout))?
    }

    /// Close and drop the current session, if any.
    pub async fn close(&self) {
        let slot = self.current.lock().take();
        if let Some(slot) = slot {
            self.close_writer(slot.writer).await;
        }
    }

    /// Close and drop the writer of `id`, if it is still installed.
    pub async fn close_session(&self, id: SessionId) {
        let slot = {
            let mut current = self.current.lock();
            if current.as_ref().is_some_and(|slot| slot.id == id) {
                current.take()
            } else {
                None
            }
        };
        if let Some(slot) = slot {
            self.close_writer(slot.writer).await;
        }
    }

    async fn close_writer(&self, writer: Writer) {
        let closed = tokio::time::timeout(self.write_timeout, async move {
            writer.lock().await.close().await
        })
        .await;
        match closed {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "Error while closing session"),
            Err(_) => tracing::debug!(
                timeout_ms = u64::try_from(self.write_timeout.as_millis()).unwrap_or(u64::MAX),
                "Session close timed out"
            ),
        }
    }
}
