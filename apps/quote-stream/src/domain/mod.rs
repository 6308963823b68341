//! Domain Layer - Core streaming types.
//!
//! This layer contains the event and state types published by the
//! streaming client plus the subscription registry. Nothing here touches
//! the network.

/// Price, quote and lifecycle event types.
pub mod streaming;

/// Subscribed symbol tracking.
pub mod subscription;
