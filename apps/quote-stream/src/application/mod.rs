//! Application Layer - Port definitions.
//!
//! Contracts the infrastructure adapters implement so the streaming
//! client can be driven by a real WebSocket or by an in-memory double.

/// Port interfaces for the streaming transport.
pub mod ports;
