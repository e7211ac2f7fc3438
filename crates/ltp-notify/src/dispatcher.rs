//! Throttled-update delivery to the chat channel.
//!
//! One worker task per instrument keeps same-instrument messages in
//! strictly increasing sequence order; different instruments deliver
//! concurrently. Retryable failures get a bounded number of attempts, then
//! the message is dropped rather than re-queued: the next flush supplies a
//! fresher price for the same instrument.

use crate::channel::{format_update, DynMessageChannel};
use crate::error::{NotifyError, SendError};
use dashmap::DashMap;
use ltp_core::{InstrumentKey, PriceUpdate};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Per-worker inbox depth. The throttler emits at most one update per
/// instrument per flush, so this only backs up when the channel is slow;
/// on overflow the incoming update is dropped and the next flush supplies
/// a fresher one.
const WORKER_QUEUE_DEPTH: usize = 16;

/// Retry policy for channel sends.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per message (first try included).
    pub max_attempts: u32,
    /// Base delay when the channel gives no retry-after hint.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following the given failed attempt (1-based).
    /// An advertised retry-after wins over the exponential schedule.
    fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| {
            let exponent = attempt.saturating_sub(1).min(6);
            Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << exponent))
        })
    }
}

/// Delivery counters for observability.
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub delivered: AtomicU64,
    pub retried: AtomicU64,
    pub dropped: AtomicU64,
}

impl DispatchStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

enum SendOutcome {
    Delivered,
    Dropped,
    Fatal(String),
    Shutdown,
}

/// Delivers throttled updates to the external channel.
pub struct Dispatcher {
    channel: DynMessageChannel,
    retry: RetryPolicy,
    workers: DashMap<InstrumentKey, mpsc::Sender<PriceUpdate>>,
    worker_handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    stats: Arc<DispatchStats>,
    /// Escalation path for hard channel failures (process-fatal).
    fatal_tx: mpsc::Sender<NotifyError>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        channel: DynMessageChannel,
        retry: RetryPolicy,
        fatal_tx: mpsc::Sender<NotifyError>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            channel,
            retry,
            workers: DashMap::new(),
            worker_handles: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(DispatchStats::default()),
            fatal_tx,
            shutdown,
        }
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }

    /// Route one update to its instrument worker. Non-blocking; if the
    /// worker's inbox is full the update is dropped (the next flush brings
    /// a fresher price).
    pub fn dispatch(&self, update: PriceUpdate) {
        let key = update.instrument.key();
        let tx = self
            .workers
            .entry(key.clone())
            .or_insert_with(|| self.spawn_worker(key.clone()))
            .clone();

        if let Err(e) = tx.try_send(update) {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(instrument = %key, error = %e, "Dispatch inbox unavailable, update dropped");
        }
    }

    /// Wait for worker tasks to finish within the grace period.
    ///
    /// Call after cancelling the shutdown token; in-flight sends either
    /// complete or are abandoned when the grace period expires.
    pub async fn join_with_grace(&self, grace: Duration) {
        self.workers.clear();
        let handles: Vec<JoinHandle<()>> = self.worker_handles.lock().drain(..).collect();

        let join_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };

        if tokio::time::timeout(grace, join_all).await.is_err() {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "Dispatcher workers did not finish within grace period"
            );
        }
    }

    fn spawn_worker(&self, key: InstrumentKey) -> mpsc::Sender<PriceUpdate> {
        let (tx, mut rx) = mpsc::channel::<PriceUpdate>(WORKER_QUEUE_DEPTH);
        let channel = self.channel.clone();
        let retry = self.retry.clone();
        let stats = self.stats.clone();
        let fatal_tx = self.fatal_tx.clone();
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            // Ordering guard: never send a sequence at or below this.
            let mut last_sent_seq: u64 = 0;

            loop {
                let update = tokio::select! {
                    () = shutdown.cancelled() => break,
                    update = rx.recv() => match update {
                        Some(update) => update,
                        None => break,
                    },
                };

                if update.sequence <= last_sent_seq {
                    debug!(
                        instrument = %key,
                        sequence = update.sequence,
                        last_sent = last_sent_seq,
                        "Stale update skipped"
                    );
                    continue;
                }

                match send_with_retry(channel.as_ref(), &retry, &stats, &update, &shutdown).await {
                    SendOutcome::Delivered => {
                        last_sent_seq = update.sequence;
                        stats.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    SendOutcome::Dropped => {
                        stats.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    SendOutcome::Fatal(reason) => {
                        error!(instrument = %key, %reason, "Hard channel failure");
                        let _ = fatal_tx.send(NotifyError::ChannelFailed(reason)).await;
                        break;
                    }
                    SendOutcome::Shutdown => break,
                }
            }

            debug!(instrument = %key, "Dispatch worker stopped");
        });

        self.worker_handles.lock().push(handle);
        tx
    }
}

async fn send_with_retry(
    channel: &dyn crate::channel::MessageChannel,
    retry: &RetryPolicy,
    stats: &DispatchStats,
    update: &PriceUpdate,
    shutdown: &CancellationToken,
) -> SendOutcome {
    let text = format_update(update);

    for attempt in 1..=retry.max_attempts {
        match channel.send(text.clone()).await {
            Ok(()) => return SendOutcome::Delivered,
            Err(SendError::Fatal(reason)) => return SendOutcome::Fatal(reason),
            Err(err) => {
                if attempt == retry.max_attempts {
                    warn!(
                        instrument = %update.instrument,
                        sequence = update.sequence,
                        attempts = attempt,
                        error = %err,
                        "Update dropped after retries"
                    );
                    return SendOutcome::Dropped;
                }

                let retry_after = match &err {
                    SendError::RateLimited { retry_after } => *retry_after,
                    _ => None,
                };
                let delay = retry.delay(attempt, retry_after);
                stats.retried.fetch_add(1, Ordering::Relaxed);
                debug!(
                    instrument = %update.instrument,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying send"
                );

                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = shutdown.cancelled() => return SendOutcome::Shutdown,
                }
            }
        }
    }

    SendOutcome::Dropped
}
