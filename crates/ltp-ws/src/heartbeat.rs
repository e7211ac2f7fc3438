//! Connection health tracking.
//!
//! Tracks frame activity and ping/pong timing. The connection is declared
//! dead when no frame of any kind (ticker, heartbeat, pong) arrives within
//! the silence window.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

/// Monitors feed liveness for one connection.
pub struct HeartbeatMonitor {
    /// Last frame received time (any frame counts).
    last_frame: RwLock<DateTime<Utc>>,
    /// Last keepalive ping sent time.
    last_ping: RwLock<Option<DateTime<Utc>>>,
    /// Last pong received time.
    last_pong: RwLock<Option<DateTime<Utc>>>,
}

impl HeartbeatMonitor {
    pub fn new() -> Self {
        Self {
            last_frame: RwLock::new(Utc::now()),
            last_ping: RwLock::new(None),
            last_pong: RwLock::new(None),
        }
    }

    /// Reset state (called when a connection is established).
    pub fn reset(&self) {
        *self.last_frame.write() = Utc::now();
        *self.last_ping.write() = None;
        *self.last_pong.write() = None;
    }

    /// Record that any frame arrived.
    pub fn record_frame(&self) {
        *self.last_frame.write() = Utc::now();
    }

    /// Record that a keepalive ping was sent.
    pub fn record_ping(&self) {
        *self.last_ping.write() = Some(Utc::now());
    }

    /// Record that a pong arrived. Pongs count as frames too.
    pub fn record_pong(&self) {
        let now = Utc::now();
        *self.last_pong.write() = Some(now);
        *self.last_frame.write() = now;

        if let Some(ping_time) = *self.last_ping.read() {
            let rtt_ms = (now - ping_time).num_milliseconds();
            debug!(rtt_ms, "Received pong");
        }
    }

    /// Milliseconds since the last frame of any kind.
    pub fn time_since_last_frame_ms(&self) -> i64 {
        (Utc::now() - *self.last_frame.read()).num_milliseconds()
    }

    /// Whether the silence window has elapsed with no frame at all.
    pub fn is_silent(&self, silence_timeout: Duration) -> bool {
        self.time_since_last_frame_ms() > silence_timeout.as_millis() as i64
    }
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new()
    }
}
