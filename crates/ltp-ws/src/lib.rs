//! WebSocket feed client for the LTP relay.
//!
//! Provides robust market-data connectivity with:
//! - Automatic reconnection with exponential backoff (±20% jitter)
//! - Unconditional subscription restore after every reconnect
//! - Keepalive pings and silence-timeout detection (default 30s)
//! - Batched subscribe framing (100 instruments per frame)

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod supervisor;

pub use connection::{FeedConfig, FeedConnection, FeedCredentials};
pub use error::{WsError, WsResult};
pub use heartbeat::HeartbeatMonitor;
pub use message::{
    feed_url, DisconnectNotice, FeedMessage, SubscribeRequest, SubscriptionEntry, TickerFrame,
    MAX_INSTRUMENTS_PER_FRAME,
};
pub use supervisor::{BackoffPolicy, ConnectionState, FeedSupervisor, SupervisorConfig};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
