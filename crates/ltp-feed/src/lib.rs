//! Tick normalization for the LTP relay.
//!
//! Turns raw provider ticker frames into canonical `PriceUpdate` values:
//! resolves security ids to configured instruments, validates prices,
//! drops out-of-order frames, and assigns per-instrument sequence numbers.

pub mod error;
pub mod normalizer;
pub mod resolver;

pub use error::{FeedError, FeedResult};
pub use normalizer::{DropStats, TickNormalizer};
pub use resolver::SymbolResolver;
