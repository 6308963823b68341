//! Heartbeat Manager
//!
//! The streamer has no application-level ping. Instead, while a session is
//! up, the full subscription set is re-sent every heartbeat interval; the
//! upstream treats a repeated subscribe as a no-op and the write keeps
//! idle intermediaries from dropping the socket.
//!
//! A failed heartbeat write is only logged, and a stalled one is abandoned
//! when the session is cancelled. Detecting a dead socket is the receive
//! loop's job.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::messages::SubscriptionRequest;
use super::transport::SharedSink;
use crate::domain::subscription::SubscriptionRegistry;

/// Periodic re-subscription for one session.
pub struct HeartbeatManager {
    interval: Duration,
    registry: Arc<SubscriptionRegistry>,
    sink: Arc<SharedSink>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a heartbeat bound to a session's cancellation token.
    #[must_use]
    pub const fn new(
        interval: Duration,
        registry: Arc<SubscriptionRegistry>,
        sink: Arc<SharedSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            interval,
            registry,
            sink,
            cancel,
        }
    }

    /// Run until the session token is cancelled.
    ///
    /// The first beat fires one interval after start, since the session
    /// has just sent its subscription replay. Returns the number of
    /// heartbeats written.
    pub async fn run(self) -> u64 {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut sent = 0_u64;
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!(sent, "Heartbeat stopped");
                    return sent;
                }
                _ = ticker.tick() => {
                    if self.beat().await {
                        sent += 1;
                    }
                }
            }
        }
    }

    async fn beat(&self) -> bool {
        if self.cancel.is_cancelled() || self.registry.is_empty() {
            return false;
        }

        let request = SubscriptionRequest::subscribe(self.registry.to_vec());
        let result = tokio::select! {
            () = self.cancel.cancelled() => return false,
            result = self.sink.send_request(&request) => result,
        };
        match result {
            Ok(()) => {
                tracing::trace!(symbols = request.subscribe.len(), "Heartbeat sent");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Heartbeat send failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for HeartbeatManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatManager")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
