//! Main application orchestration.
//!
//! Wires the pipeline together:
//! feed supervisor → tick channel → normalizer → throttler → (flush timer)
//! → dispatcher → Telegram. Owns shutdown: ctrl-c cancels the shared token,
//! the feed closes, the flush timer stops, and in-flight sends get a
//! bounded grace period.

use crate::config::{AppConfig, Credentials};
use crate::error::{AppError, AppResult};
use ltp_feed::{SymbolResolver, TickNormalizer};
use ltp_notify::{Dispatcher, NotificationThrottler, NotifyError, TelegramChannel};
use ltp_telemetry::Metrics;
use ltp_ws::{ConnectionState, FeedSupervisor, TickerFrame};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Interval for mirroring internal counters into Prometheus.
const METRICS_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Tracks already-mirrored counter values so Prometheus counters only
/// advance by deltas.
#[derive(Default)]
struct MetricsMirror {
    reconnects: u64,
    unknown: u64,
    invalid_price: u64,
    invalid_time: u64,
    out_of_order: u64,
    delivered: u64,
    retried: u64,
    send_dropped: u64,
}

impl MetricsMirror {
    fn sync(
        &mut self,
        supervisor: &FeedSupervisor,
        normalizer: &TickNormalizer,
        dispatch_stats: &ltp_notify::DispatchStats,
    ) {
        Metrics::feed_subscribed(supervisor.state() == ConnectionState::Subscribed);

        advance(&mut self.reconnects, supervisor.reconnect_count(), || {
            Metrics::feed_reconnect()
        });

        let stats = normalizer.stats();
        advance(&mut self.unknown, stats.unknown_instrument(), || {
            Metrics::tick_dropped("unknown_instrument")
        });
        advance(&mut self.invalid_price, stats.invalid_price(), || {
            Metrics::tick_dropped("invalid_price")
        });
        advance(&mut self.invalid_time, stats.invalid_time(), || {
            Metrics::tick_dropped("invalid_time")
        });
        advance(&mut self.out_of_order, stats.out_of_order(), || {
            Metrics::tick_dropped("out_of_order")
        });

        advance(&mut self.delivered, dispatch_stats.delivered(), || {
            Metrics::notification_sent()
        });
        advance(&mut self.retried, dispatch_stats.retried(), || {
            Metrics::notification_retried()
        });
        advance(&mut self.send_dropped, dispatch_stats.dropped(), || {
            Metrics::notification_dropped()
        });
    }
}

fn advance(seen: &mut u64, current: u64, mut record: impl FnMut()) {
    while *seen < current {
        record();
        *seen += 1;
    }
}

/// Main application.
pub struct Application {
    config: AppConfig,
    credentials: Credentials,
}

impl Application {
    /// Create a new application. Configuration problems fail here, before
    /// any connection attempt.
    pub fn new(config: AppConfig, credentials: Credentials) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            credentials,
        })
    }

    /// Run the relay until ctrl-c or a fatal channel error.
    pub async fn run(self) -> AppResult<()> {
        let shutdown = CancellationToken::new();

        let instruments = self.config.instruments();
        info!(
            instruments = instruments.len(),
            flush_interval_ms = self.config.notify.flush_interval_ms,
            "Starting relay"
        );

        let resolver = Arc::new(SymbolResolver::new(instruments.clone())?);
        let mut normalizer = TickNormalizer::new(resolver);

        let (tick_tx, mut tick_rx) = mpsc::channel::<TickerFrame>(1_000);
        let supervisor = Arc::new(FeedSupervisor::new(
            self.config.supervisor_config(),
            self.credentials.feed.clone(),
            instruments,
            tick_tx,
            shutdown.clone(),
        ));

        let telegram = TelegramChannel::new(
            &self.credentials.telegram_bot_token,
            self.credentials.telegram_chat_id.clone(),
        )?;
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<NotifyError>(1);
        let dispatcher = Dispatcher::new(
            Arc::new(telegram),
            self.config.retry_policy(),
            fatal_tx,
            shutdown.clone(),
        );
        let dispatch_stats = dispatcher.stats();
        let throttler = NotificationThrottler::new();

        let supervisor_task = supervisor.clone();
        let feed_handle = tokio::spawn(async move {
            if let Err(e) = supervisor_task.run().await {
                error!(error = %e, "Feed supervisor exited with error");
            }
        });

        let mut flush_timer = tokio::time::interval(self.config.flush_interval());
        flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut metrics_timer = tokio::time::interval(METRICS_REFRESH_INTERVAL);
        metrics_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut mirror = MetricsMirror::default();

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        info!("Entering main event loop");
        let run_result = loop {
            tokio::select! {
                Some(frame) = tick_rx.recv() => {
                    if let Some(update) = normalizer.normalize(&frame) {
                        Metrics::tick_accepted(&frame.exchange_segment);
                        throttler.record(update);
                    }
                }

                _ = flush_timer.tick() => {
                    for update in throttler.flush() {
                        dispatcher.dispatch(update);
                    }
                }

                _ = metrics_timer.tick() => {
                    mirror.sync(&supervisor, &normalizer, &dispatch_stats);
                }

                Some(err) = fatal_rx.recv() => {
                    error!(error = %err, "Output channel permanently failed, terminating");
                    break Err(AppError::Notify(err));
                }

                result = &mut ctrl_c => {
                    if let Err(e) = result {
                        warn!(error = %e, "Ctrl-c handler failed, shutting down anyway");
                    }
                    info!("Shutdown requested");
                    break Ok(());
                }
            }
        };

        shutdown.cancel();
        dispatcher
            .join_with_grace(self.config.shutdown_grace())
            .await;
        if tokio::time::timeout(self.config.shutdown_grace(), feed_handle)
            .await
            .is_err()
        {
            warn!("Feed task did not stop within grace period");
        }

        let stats = normalizer.stats();
        info!(
            ticks_accepted = stats.accepted(),
            ticks_dropped = stats.dropped_total(),
            notifications_sent = dispatch_stats.delivered(),
            notifications_dropped = dispatch_stats.dropped(),
            "Relay stopped"
        );

        run_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstrumentConfig;
    use ltp_core::ExchangeSegment;
    use ltp_ws::FeedCredentials;

    fn credentials() -> Credentials {
        Credentials {
            feed: FeedCredentials {
                client_id: "1100001".to_string(),
                access_token: "tok".to_string(),
            },
            telegram_bot_token: "bot-token".to_string(),
            telegram_chat_id: "-100123".to_string(),
        }
    }

    #[test]
    fn test_new_rejects_empty_instruments() {
        let result = Application::new(AppConfig::default(), credentials());
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_new_accepts_valid_config() {
        let config = AppConfig {
            instruments: vec![InstrumentConfig {
                security_id: "2885".to_string(),
                segment: ExchangeSegment::NseEquity,
                symbol: "RELIANCE".to_string(),
            }],
            ..Default::default()
        };
        assert!(Application::new(config, credentials()).is_ok());
    }

    #[test]
    fn test_metrics_mirror_advances_by_delta() {
        let mut seen = 0u64;
        let mut calls = 0u64;
        advance(&mut seen, 3, || calls += 1);
        assert_eq!(calls, 3);
        advance(&mut seen, 3, || calls += 1);
        assert_eq!(calls, 3);
        advance(&mut seen, 5, || calls += 1);
        assert_eq!(calls, 5);
    }
}
