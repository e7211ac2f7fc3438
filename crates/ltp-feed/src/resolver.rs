//! Security-id-to-symbol resolution.
//!
//! A static lookup table built once from configuration. Pure reads, no
//! interior state.

use crate::error::{FeedError, FeedResult};
use ltp_core::{ExchangeSegment, Instrument, InstrumentKey, SecurityId};
use std::collections::HashMap;

/// Maps opaque (segment, security id) pairs to configured instruments.
pub struct SymbolResolver {
    by_key: HashMap<InstrumentKey, Instrument>,
    instruments: Vec<Instrument>,
}

impl SymbolResolver {
    /// Build from the configured instrument set.
    ///
    /// Duplicate (segment, security id) pairs are a configuration error.
    pub fn new(instruments: Vec<Instrument>) -> FeedResult<Self> {
        let mut by_key = HashMap::with_capacity(instruments.len());
        for inst in &instruments {
            if by_key.insert(inst.key(), inst.clone()).is_some() {
                return Err(FeedError::DuplicateInstrument(inst.key().to_string()));
            }
        }
        Ok(Self {
            by_key,
            instruments,
        })
    }

    /// Resolve a (segment, security id) pair to its instrument.
    pub fn resolve(&self, segment: ExchangeSegment, security_id: &SecurityId) -> Option<&Instrument> {
        self.by_key
            .get(&InstrumentKey::new(segment, security_id.clone()))
    }

    /// The full watched set, in configuration order.
    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Instrument> {
        vec![
            Instrument::new("13", ExchangeSegment::NseIndex, "NIFTY 50"),
            Instrument::new("25", ExchangeSegment::NseIndex, "NIFTY BANK"),
            Instrument::new("2885", ExchangeSegment::NseEquity, "RELIANCE"),
        ]
    }

    #[test]
    fn test_resolve_known() {
        let resolver = SymbolResolver::new(sample()).unwrap();
        let inst = resolver
            .resolve(ExchangeSegment::NseEquity, &SecurityId::new("2885"))
            .unwrap();
        assert_eq!(inst.symbol, "RELIANCE");
    }

    #[test]
    fn test_resolve_unknown_is_none() {
        let resolver = SymbolResolver::new(sample()).unwrap();
        assert!(resolver
            .resolve(ExchangeSegment::NseEquity, &SecurityId::new("99999"))
            .is_none());
        // Same id, wrong segment: still unknown.
        assert!(resolver
            .resolve(ExchangeSegment::BseEquity, &SecurityId::new("2885"))
            .is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut instruments = sample();
        instruments.push(Instrument::new("13", ExchangeSegment::NseIndex, "NIFTY DUP"));
        assert!(matches!(
            SymbolResolver::new(instruments),
            Err(FeedError::DuplicateInstrument(_))
        ));
    }

    #[test]
    fn test_instruments_preserve_order() {
        let resolver = SymbolResolver::new(sample()).unwrap();
        let symbols: Vec<&str> = resolver
            .instruments()
            .iter()
            .map(|i| i.symbol.as_str())
            .collect();
        assert_eq!(symbols, vec!["NIFTY 50", "NIFTY BANK", "RELIANCE"]);
    }
}
