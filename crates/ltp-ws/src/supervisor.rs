//! Reconnection supervision.
//!
//! Owns the authoritative connection state machine and the retry/backoff
//! counters. Every successful connect re-issues the full subscription set;
//! subscription state is never assumed to survive a reconnect.
//!
//! State machine:
//! Disconnected → Connecting → Authenticating → Subscribed, any failure
//! schedules a retry back to Disconnected (or Degraded past the configured
//! consecutive-failure threshold; retries continue regardless).

use crate::connection::{FeedConfig, FeedConnection, FeedCredentials};
use crate::error::WsResult;
use crate::message::TickerFrame;
use ltp_core::Instrument;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Cap on the backoff exponent; beyond this the max delay dominates anyway.
const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Authoritative feed connection state.
///
/// Owned exclusively by the supervisor; downstream components treat absence
/// of ticks as silence, never as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Subscribed,
    /// Sustained consecutive failures; reported for observability while
    /// retries continue.
    Degraded,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Authenticating => write!(f, "AUTHENTICATING"),
            Self::Subscribed => write!(f, "SUBSCRIBED"),
            Self::Degraded => write!(f, "DEGRADED"),
        }
    }
}

/// Exponential backoff parameters.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base delay for the first retry.
    pub base_delay_ms: u64,
    /// Upper bound on the pre-jitter delay.
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl BackoffPolicy {
    /// Pre-jitter delay for the given attempt (1-based).
    ///
    /// attempt=1 → base, attempt=2 → 2*base, …, capped at `max_delay_ms`.
    /// Pure so the retry schedule is unit-testable.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Delay with ±20% jitter applied.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        apply_jitter(self.delay(attempt))
    }
}

/// Apply ±20% jitter derived from the clock's subsecond nanos.
fn apply_jitter(delay: Duration) -> Duration {
    use std::time::{SystemTime, UNIX_EPOCH};

    let span_ms = (delay.as_millis() as u64) * 2 / 5;
    if span_ms == 0 {
        return delay;
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0) as u64;
    let offset = nanos % (span_ms + 1);

    Duration::from_millis(delay.as_millis() as u64 - span_ms / 2 + offset)
}

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Per-connection settings.
    pub feed: FeedConfig,
    /// Retry backoff parameters.
    pub backoff: BackoffPolicy,
    /// Consecutive failures before the state is reported as Degraded
    /// (0 = never; retries are unbounded either way).
    pub max_consecutive_failures: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            backoff: BackoffPolicy::default(),
            max_consecutive_failures: 0,
        }
    }
}

/// Supervises the feed connection: connect, subscribe, watch, retry.
pub struct FeedSupervisor {
    config: SupervisorConfig,
    credentials: FeedCredentials,
    /// Full watched set; re-subscribed unconditionally after every connect.
    instruments: Vec<Instrument>,
    state: Arc<RwLock<ConnectionState>>,
    reconnect_count: Arc<RwLock<u64>>,
    tick_tx: mpsc::Sender<TickerFrame>,
    shutdown: CancellationToken,
}

impl FeedSupervisor {
    pub fn new(
        config: SupervisorConfig,
        credentials: FeedCredentials,
        instruments: Vec<Instrument>,
        tick_tx: mpsc::Sender<TickerFrame>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            credentials,
            instruments,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            reconnect_count: Arc::new(RwLock::new(0)),
            tick_tx,
            shutdown,
        }
    }

    /// Current authoritative state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Total reconnect attempts made over the process lifetime.
    pub fn reconnect_count(&self) -> u64 {
        *self.reconnect_count.read()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    /// Run until shutdown. Retries forever; only a requested shutdown
    /// returns.
    pub async fn run(&self) -> WsResult<()> {
        let mut attempt: u32 = 0;
        let mut consecutive_failures: u32 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);

            match self
                .connect_once(&mut attempt, &mut consecutive_failures)
                .await
            {
                Ok(()) => {
                    info!("Feed loop exited on shutdown");
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "Feed connection lost");
                }
            }

            if self.shutdown.is_cancelled() {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            attempt += 1;
            consecutive_failures += 1;
            *self.reconnect_count.write() += 1;

            if self.config.max_consecutive_failures > 0
                && consecutive_failures >= self.config.max_consecutive_failures
            {
                self.set_state(ConnectionState::Degraded);
                error!(consecutive_failures, "Feed degraded, retries continue");
            } else {
                self.set_state(ConnectionState::Disconnected);
            }

            let delay = self.config.backoff.jittered_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown.cancelled() => {
                    info!("Shutdown during backoff");
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
            }
        }
    }

    /// One connection lifetime: establish, subscribe, pump frames.
    ///
    /// Resets the retry counters on the Subscribed transition, so backoff
    /// starts over after any healthy connection.
    async fn connect_once(
        &self,
        attempt: &mut u32,
        consecutive_failures: &mut u32,
    ) -> WsResult<()> {
        let mut conn = FeedConnection::establish(&self.config.feed, &self.credentials).await?;

        self.set_state(ConnectionState::Authenticating);
        conn.subscribe_all(&self.instruments).await?;

        self.set_state(ConnectionState::Subscribed);
        *attempt = 0;
        *consecutive_failures = 0;
        info!(
            instruments = self.instruments.len(),
            "Feed subscribed, backoff reset"
        );

        conn.run(&self.tick_tx, &self.shutdown).await
    }
}
