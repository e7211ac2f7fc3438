//! Per-instrument notification throttling.
//!
//! `record()` is called synchronously from the tick-processing path and
//! overwrites the latest update in O(1). `flush()` runs on the flush timer
//! and yields at most one update per instrument per period: the newest one,
//! and only if it has not been emitted before. Intermediate prices inside a
//! period are intentionally coalesced (last-value-wins).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ltp_core::{Instrument, InstrumentKey, PriceUpdate};
use parking_lot::RwLock;
use std::sync::Arc;

/// Per-instrument throttle state.
///
/// Created on the first tick for an instrument and kept for the process
/// lifetime (the watched set is fixed).
#[derive(Debug)]
pub struct ThrottleEntry {
    pub instrument: Instrument,
    /// Newest accepted update; replaced by every `record`.
    pub latest: PriceUpdate,
    /// Sequence of the last update handed to the dispatcher.
    pub last_emitted_seq: Option<u64>,
    pub last_emitted_at: Option<DateTime<Utc>>,
}

impl ThrottleEntry {
    fn new(update: PriceUpdate) -> Self {
        Self {
            instrument: update.instrument.clone(),
            latest: update,
            last_emitted_seq: None,
            last_emitted_at: None,
        }
    }

    /// Whether the latest update still awaits emission.
    pub fn is_pending(&self) -> bool {
        self.last_emitted_seq != Some(self.latest.sequence)
    }
}

type Entry = Arc<RwLock<ThrottleEntry>>;

/// Latest-value buffer between the normalizer and the dispatcher.
///
/// Entries are independent: per-entry locks inside a `DashMap`, no global
/// lock across instruments.
pub struct NotificationThrottler {
    entries: DashMap<InstrumentKey, Entry>,
}

impl NotificationThrottler {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Record the newest update for an instrument. O(1), non-blocking
    /// beyond the per-entry lock; atomic per entry.
    pub fn record(&self, update: PriceUpdate) {
        let entry = self
            .entries
            .entry(update.instrument.key())
            .or_insert_with(|| Arc::new(RwLock::new(ThrottleEntry::new(update.clone()))))
            .clone();
        entry.write().latest = update;
    }

    /// Drain everything that changed since the previous flush.
    ///
    /// Each yielded update is the instrument's newest; entries without a
    /// new tick since the last flush yield nothing.
    pub fn flush(&self) -> Vec<PriceUpdate> {
        let now = Utc::now();
        let mut emitted = Vec::new();

        for item in self.entries.iter() {
            let mut entry = item.value().write();
            if entry.is_pending() {
                entry.last_emitted_seq = Some(entry.latest.sequence);
                entry.last_emitted_at = Some(now);
                emitted.push(entry.latest.clone());
            }
        }

        emitted
    }

    /// Number of instruments seen so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of one entry, for diagnostics and tests.
    pub fn entry_snapshot(&self, key: &InstrumentKey) -> Option<(u64, Option<u64>)> {
        self.entries.get(key).map(|entry| {
            let guard = entry.read();
            (guard.latest.sequence, guard.last_emitted_seq)
        })
    }
}

impl Default for NotificationThrottler {
    fn default() -> Self {
        Self::new()
    }
}
