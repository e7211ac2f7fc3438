//! Core domain types for the LTP relay.
//!
//! This crate provides fundamental types used throughout the relay:
//! - `Instrument`: a watched instrument (security id + segment + symbol)
//! - `SecurityId`, `ExchangeSegment`, `InstrumentKey`: instrument identity
//! - `Price`: precision-safe price type
//! - `PriceUpdate`: a normalized last-traded-price event

pub mod decimal;
pub mod error;
pub mod instrument;
pub mod update;

pub use decimal::Price;
pub use error::{CoreError, Result};
pub use instrument::{ExchangeSegment, Instrument, InstrumentKey, SecurityId};
pub use update::PriceUpdate;
