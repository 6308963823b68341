//! Port Interfaces
//!
//! Defines the interfaces (ports) for the push connection following the
//! Hexagonal Architecture pattern. The streaming client only ever talks
//! to these traits; `infrastructure::yahoo::transport` provides the
//! WebSocket adapter.
//!
//! ## Driven Ports (Outbound)
//!
//! - `StreamTransport`: opens a session and hands back its two halves
//! - `FrameSink`: writes control messages to the session
//! - `FrameSource`: yields inbound frames in arrival order

use async_trait::async_trait;

/// Errors raised by a transport adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Handshake failed or was rejected.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Reading a frame failed.
    #[error("receive failed: {0}")]
    Receive(String),

    /// A write did not complete within the write timeout.
    #[error("write timed out after {0:?}")]
    WriteTimeout(std::time::Duration),

    /// The session is already closed.
    #[error("session closed")]
    Closed,
}

/// A frame surfaced to the receive loop.
///
/// Control frames the adapter answers itself (ping/pong) never show up
/// here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A text data frame.
    Text(String),
    /// The peer sent a close frame.
    Close {
        /// Close reason supplied by the peer, if any.
        reason: Option<String>,
    },
}

/// Write half of a session.
#[async_trait]
pub trait FrameSink: Send {
    /// Send a text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the session with a normal-closure reason.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a session.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame. `None` means the stream ended.
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>>;
}

/// Both halves of an open session.
pub struct Session {
    /// Write half, shared by the heartbeat and subscription calls.
    pub sink: Box<dyn FrameSink>,
    /// Read half, owned by the receive loop.
    pub source: Box<dyn FrameSource>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

/// Opens push sessions against an endpoint.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Perform the handshake. Timeouts are applied by the caller.
    async fn connect(&self, url: &str) -> Result<Session, TransportError>;
}
