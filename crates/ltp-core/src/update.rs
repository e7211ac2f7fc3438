//! Normalized price update event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Instrument, Price};

/// A normalized last-traded-price update for one instrument.
///
/// Produced by the tick normalizer. For a given instrument, `sequence`
/// strictly increases with every accepted update; the throttler and the
/// dispatcher rely on it to coalesce and to order deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    /// The instrument this price belongs to.
    pub instrument: Instrument,
    /// Last traded price.
    pub price: Price,
    /// Exchange trade timestamp from the provider.
    pub event_time: DateTime<Utc>,
    /// Per-instrument monotonic counter assigned on acceptance.
    pub sequence: u64,
}

impl PriceUpdate {
    pub fn new(
        instrument: Instrument,
        price: Price,
        event_time: DateTime<Utc>,
        sequence: u64,
    ) -> Self {
        Self {
            instrument,
            price,
            event_time,
            sequence,
        }
    }
}
