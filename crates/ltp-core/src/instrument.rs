//! Instrument identity types.
//!
//! The feed provider addresses instruments by an opaque security id scoped
//! to an exchange segment. The relay attaches a human-readable display
//! symbol to each configured pair.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Exchange segment on the provider side.
///
/// Wire names follow the provider's segment identifiers (e.g. `NSE_EQ`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeSegment {
    #[serde(rename = "NSE_EQ")]
    NseEquity,
    #[serde(rename = "NSE_FNO")]
    NseFno,
    #[serde(rename = "NSE_INDEX")]
    NseIndex,
    #[serde(rename = "BSE_EQ")]
    BseEquity,
    #[serde(rename = "BSE_INDEX")]
    BseIndex,
    #[serde(rename = "MCX_COMM")]
    McxCommodity,
}

impl ExchangeSegment {
    /// Wire identifier as used in subscribe frames and tick frames.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::NseEquity => "NSE_EQ",
            Self::NseFno => "NSE_FNO",
            Self::NseIndex => "NSE_INDEX",
            Self::BseEquity => "BSE_EQ",
            Self::BseIndex => "BSE_INDEX",
            Self::McxCommodity => "MCX_COMM",
        }
    }
}

impl fmt::Display for ExchangeSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for ExchangeSegment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NSE_EQ" => Ok(Self::NseEquity),
            "NSE_FNO" => Ok(Self::NseFno),
            "NSE_INDEX" => Ok(Self::NseIndex),
            "BSE_EQ" => Ok(Self::BseEquity),
            "BSE_INDEX" => Ok(Self::BseIndex),
            "MCX_COMM" => Ok(Self::McxCommodity),
            other => Err(CoreError::InvalidSegment(other.to_string())),
        }
    }
}

/// Exchange-assigned opaque instrument identifier.
///
/// Provider ids are decimal strings (`"2885"` for RELIANCE on NSE_EQ);
/// they are never interpreted numerically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityId(pub String);

impl SecurityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecurityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SecurityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SecurityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique instrument identifier combining segment and security id.
///
/// This is the primary key for the normalizer, throttler, and dispatcher
/// maps. Format: `{segment}:{security_id}` (e.g. "NSE_EQ:2885").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentKey {
    pub segment: ExchangeSegment,
    pub security_id: SecurityId,
}

impl InstrumentKey {
    pub fn new(segment: ExchangeSegment, security_id: SecurityId) -> Self {
        Self {
            segment,
            security_id,
        }
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.security_id)
    }
}

/// A watched instrument.
///
/// Immutable once loaded from configuration; the watched set is fixed for
/// the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Exchange-assigned security id.
    pub security_id: SecurityId,
    /// Exchange segment the id is scoped to.
    pub segment: ExchangeSegment,
    /// Human-readable display symbol (e.g. "RELIANCE", "NIFTY 50").
    pub symbol: String,
}

impl Instrument {
    pub fn new(
        security_id: impl Into<SecurityId>,
        segment: ExchangeSegment,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            security_id: security_id.into(),
            segment,
            symbol: symbol.into(),
        }
    }

    /// Key for map lookups.
    pub fn key(&self) -> InstrumentKey {
        InstrumentKey::new(self.segment, self.security_id.clone())
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, self.segment)
    }
}
