//! Yahoo Finance Streamer Adapter
//!
//! Push connection to the Yahoo Finance streamer:
//!
//! - **Transport**: WebSocket session plumbing (`tokio-tungstenite`)
//! - **Codec**: JSON envelope → base64 → protobuf `PricingData`
//! - **Client**: connection state machine with replay and backoff

pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod transport;

pub use client::{StreamingClient, StreamingError};
pub use codec::{CodecError, DecodedFrame, FrameDecoder};
pub use heartbeat::HeartbeatManager;
pub use messages::{PricingData, PricingEnvelope, SubscriptionRequest};
pub use reconnect::{ReconnectionConfig, ReconnectionPolicy};
pub use transport::{DEFAULT_WRITE_TIMEOUT, SessionId, SharedSink, WebSocketTransport};
