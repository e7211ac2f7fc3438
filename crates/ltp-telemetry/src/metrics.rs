//! Prometheus metrics for the LTP relay.
//!
//! Covers the relay's observability surface:
//! - Feed connection state and reconnects
//! - Tick acceptance/drop counts
//! - Notification delivery, retries, and drops
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent
//! failure. These panics only occur during static initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_int_counter, CounterVec, Gauge, IntCounter,
    TextEncoder,
};

/// Feed connection state (1 = subscribed, 0 = anything else).
pub static FEED_SUBSCRIBED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("ltp_feed_subscribed", "Feed subscription state (1=subscribed)").unwrap()
});

/// Total feed reconnect attempts.
pub static FEED_RECONNECT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("ltp_feed_reconnect_total", "Total feed reconnect attempts").unwrap()
});

/// Accepted ticks by exchange segment.
pub static TICKS_ACCEPTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ltp_ticks_accepted_total",
        "Ticks accepted by the normalizer",
        &["segment"]
    )
    .unwrap()
});

/// Dropped ticks by reason.
pub static TICKS_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ltp_ticks_dropped_total",
        "Ticks dropped by the normalizer",
        &["reason"]
    )
    .unwrap()
});

/// Notifications delivered to the chat channel.
pub static NOTIFY_SENT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("ltp_notify_sent_total", "Notifications delivered").unwrap()
});

/// Send retries after retryable channel errors.
pub static NOTIFY_RETRY_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("ltp_notify_retry_total", "Notification send retries").unwrap()
});

/// Notifications dropped after exhausting retries.
pub static NOTIFY_DROPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("ltp_notify_dropped_total", "Notifications dropped").unwrap()
});

/// Helper facade for recording metrics.
pub struct Metrics;

impl Metrics {
    pub fn feed_subscribed(subscribed: bool) {
        FEED_SUBSCRIBED.set(if subscribed { 1.0 } else { 0.0 });
    }

    pub fn feed_reconnect() {
        FEED_RECONNECT_TOTAL.inc();
    }

    pub fn tick_accepted(segment: &str) {
        TICKS_ACCEPTED_TOTAL.with_label_values(&[segment]).inc();
    }

    pub fn tick_dropped(reason: &str) {
        TICKS_DROPPED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn notification_sent() {
        NOTIFY_SENT_TOTAL.inc();
    }

    pub fn notification_retried() {
        NOTIFY_RETRY_TOTAL.inc();
    }

    pub fn notification_dropped() {
        NOTIFY_DROPPED_TOTAL.inc();
    }

    /// Render the full registry in the text exposition format, for
    /// diagnostics dumps.
    pub fn gather() -> String {
        let metric_families = prometheus::gather();
        TextEncoder::new()
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_record_and_gather() {
        Metrics::feed_subscribed(true);
        Metrics::feed_reconnect();
        Metrics::tick_accepted("NSE_EQ");
        Metrics::tick_dropped("unknown_instrument");
        Metrics::notification_sent();

        let rendered = Metrics::gather();
        assert!(rendered.contains("ltp_feed_subscribed"));
        assert!(rendered.contains("ltp_ticks_accepted_total"));
        assert!(rendered.contains("ltp_notify_sent_total"));
    }
}
