//! Raw frame → canonical `PriceUpdate` transform.
//!
//! Rejects frames for unknown instruments, non-positive or non-numeric
//! prices, and out-of-order exchange timestamps (the transport does not
//! guarantee exchange ordering). Assigns the per-instrument monotonic
//! sequence counter on acceptance.

use crate::resolver::SymbolResolver;
use chrono::{DateTime, TimeZone, Utc};
use ltp_core::{ExchangeSegment, InstrumentKey, Price, PriceUpdate, SecurityId};
use ltp_ws::TickerFrame;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Drop/accept counters for observability.
#[derive(Debug, Default)]
pub struct DropStats {
    pub accepted: AtomicU64,
    pub unknown_instrument: AtomicU64,
    pub invalid_price: AtomicU64,
    pub invalid_time: AtomicU64,
    pub out_of_order: AtomicU64,
}

impl DropStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn unknown_instrument(&self) -> u64 {
        self.unknown_instrument.load(Ordering::Relaxed)
    }

    pub fn invalid_price(&self) -> u64 {
        self.invalid_price.load(Ordering::Relaxed)
    }

    pub fn invalid_time(&self) -> u64 {
        self.invalid_time.load(Ordering::Relaxed)
    }

    pub fn out_of_order(&self) -> u64 {
        self.out_of_order.load(Ordering::Relaxed)
    }

    pub fn dropped_total(&self) -> u64 {
        self.unknown_instrument() + self.invalid_price() + self.invalid_time() + self.out_of_order()
    }
}

/// Per-instrument acceptance state.
#[derive(Debug)]
struct InstrumentCursor {
    /// Sequence to assign to the next accepted update (starts at 1).
    next_sequence: u64,
    /// Event time of the last accepted update.
    last_event_time: Option<DateTime<Utc>>,
}

impl InstrumentCursor {
    fn new() -> Self {
        Self {
            next_sequence: 1,
            last_event_time: None,
        }
    }
}

/// Normalizes raw ticker frames into `PriceUpdate`s.
///
/// Single-consumer by design: lives on the tick-processing task, so the
/// cursor map needs no locking.
pub struct TickNormalizer {
    resolver: Arc<SymbolResolver>,
    cursors: HashMap<InstrumentKey, InstrumentCursor>,
    stats: DropStats,
}

impl TickNormalizer {
    pub fn new(resolver: Arc<SymbolResolver>) -> Self {
        Self {
            resolver,
            cursors: HashMap::new(),
            stats: DropStats::default(),
        }
    }

    pub fn stats(&self) -> &DropStats {
        &self.stats
    }

    /// Normalize one frame. `None` means the frame was dropped; the reason
    /// is counted in `stats`.
    pub fn normalize(&mut self, frame: &TickerFrame) -> Option<PriceUpdate> {
        let Ok(segment) = frame.exchange_segment.parse::<ExchangeSegment>() else {
            self.stats.unknown_instrument.fetch_add(1, Ordering::Relaxed);
            debug!(segment = %frame.exchange_segment, "Unknown segment, frame dropped");
            return None;
        };

        let security_id = SecurityId::new(frame.security_id.clone());
        let Some(instrument) = self.resolver.resolve(segment, &security_id) else {
            self.stats.unknown_instrument.fetch_add(1, Ordering::Relaxed);
            debug!(
                segment = %segment,
                security_id = %security_id,
                "Unregistered security id, frame dropped"
            );
            return None;
        };
        let instrument = instrument.clone();

        let price = match frame.ltp.parse::<Price>() {
            Ok(p) if p.is_positive() => p,
            _ => {
                self.stats.invalid_price.fetch_add(1, Ordering::Relaxed);
                warn!(
                    instrument = %instrument,
                    ltp = %frame.ltp,
                    "Non-positive or non-numeric price, frame dropped"
                );
                return None;
            }
        };

        let event_time = match Utc.timestamp_opt(frame.ltt, 0).single() {
            Some(t) => t,
            None => {
                self.stats.invalid_time.fetch_add(1, Ordering::Relaxed);
                warn!(instrument = %instrument, ltt = frame.ltt, "Unrepresentable trade time, frame dropped");
                return None;
            }
        };

        let cursor = self
            .cursors
            .entry(instrument.key())
            .or_insert_with(InstrumentCursor::new);

        if let Some(last) = cursor.last_event_time {
            if event_time < last {
                self.stats.out_of_order.fetch_add(1, Ordering::Relaxed);
                debug!(
                    instrument = %instrument,
                    event_time = %event_time,
                    last = %last,
                    "Out-of-order frame dropped"
                );
                return None;
            }
        }

        let sequence = cursor.next_sequence;
        cursor.next_sequence += 1;
        cursor.last_event_time = Some(event_time);
        self.stats.accepted.fetch_add(1, Ordering::Relaxed);

        Some(PriceUpdate::new(instrument, price, event_time, sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ltp_core::Instrument;
    use rust_decimal_macros::dec;

    fn resolver() -> Arc<SymbolResolver> {
        Arc::new(
            SymbolResolver::new(vec![
                Instrument::new("2885", ExchangeSegment::NseEquity, "RELIANCE"),
                Instrument::new("13", ExchangeSegment::NseIndex, "NIFTY 50"),
            ])
            .unwrap(),
        )
    }

    fn frame(security_id: &str, segment: &str, ltp: &str, ltt: i64) -> TickerFrame {
        TickerFrame {
            exchange_segment: segment.to_string(),
            security_id: security_id.to_string(),
            ltp: ltp.to_string(),
            ltt,
        }
    }

    #[test]
    fn test_accepts_known_instrument() {
        let mut norm = TickNormalizer::new(resolver());
        let update = norm
            .normalize(&frame("2885", "NSE_EQ", "2885.50", 1_722_851_100))
            .unwrap();

        assert_eq!(update.instrument.symbol, "RELIANCE");
        assert_eq!(update.price.inner(), dec!(2885.50));
        assert_eq!(update.sequence, 1);
        assert_eq!(norm.stats().accepted(), 1);
    }

    #[test]
    fn test_unknown_security_id_dropped() {
        let mut norm = TickNormalizer::new(resolver());
        assert!(norm
            .normalize(&frame("404", "NSE_EQ", "100.0", 1_722_851_100))
            .is_none());
        assert_eq!(norm.stats().unknown_instrument(), 1);
        assert_eq!(norm.stats().accepted(), 0);
    }

    #[test]
    fn test_unknown_segment_dropped() {
        let mut norm = TickNormalizer::new(resolver());
        assert!(norm
            .normalize(&frame("2885", "NYSE", "100.0", 1_722_851_100))
            .is_none());
        assert_eq!(norm.stats().unknown_instrument(), 1);
    }

    #[test]
    fn test_bad_prices_dropped() {
        let mut norm = TickNormalizer::new(resolver());
        assert!(norm
            .normalize(&frame("2885", "NSE_EQ", "0", 1_722_851_100))
            .is_none());
        assert!(norm
            .normalize(&frame("2885", "NSE_EQ", "-5", 1_722_851_101))
            .is_none());
        assert!(norm
            .normalize(&frame("2885", "NSE_EQ", "abc", 1_722_851_102))
            .is_none());
        assert_eq!(norm.stats().invalid_price(), 3);
    }

    #[test]
    fn test_sequence_strictly_increases_per_instrument() {
        let mut norm = TickNormalizer::new(resolver());
        let t = 1_722_851_100;

        let a = norm.normalize(&frame("2885", "NSE_EQ", "100", t)).unwrap();
        let b = norm
            .normalize(&frame("2885", "NSE_EQ", "101", t + 1))
            .unwrap();
        let c = norm
            .normalize(&frame("13", "NSE_INDEX", "24000", t))
            .unwrap();

        assert_eq!(a.sequence, 1);
        assert_eq!(b.sequence, 2);
        // Independent counter per instrument.
        assert_eq!(c.sequence, 1);
    }

    #[test]
    fn test_out_of_order_frame_dropped() {
        let mut norm = TickNormalizer::new(resolver());
        let t = 1_722_851_100;

        assert!(norm.normalize(&frame("2885", "NSE_EQ", "100", t)).is_some());
        assert!(norm
            .normalize(&frame("2885", "NSE_EQ", "99", t - 10))
            .is_none());
        assert_eq!(norm.stats().out_of_order(), 1);

        // Equal timestamps are accepted; sequence disambiguates.
        let same = norm.normalize(&frame("2885", "NSE_EQ", "100.5", t)).unwrap();
        assert_eq!(same.sequence, 2);
    }

    #[test]
    fn test_post_reconnect_tick_is_new_baseline() {
        let mut norm = TickNormalizer::new(resolver());
        let t = 1_722_851_100;

        norm.normalize(&frame("2885", "NSE_EQ", "100", t)).unwrap();
        // A later snapshot after a gap is just the newest update.
        let update = norm
            .normalize(&frame("2885", "NSE_EQ", "104", t + 600))
            .unwrap();
        assert_eq!(update.sequence, 2);
        assert_eq!(update.price.inner(), dec!(104));
    }
}
