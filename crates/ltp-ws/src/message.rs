//! Wire framing for the market-data feed.
//!
//! Outgoing: subscribe requests batched at the provider's per-frame limit.
//! Incoming: ticker frames, heartbeats, and server disconnect notices.
//! Ticker frames carry raw string fields; semantic validation happens in
//! the tick normalizer, not here.

use ltp_core::Instrument;
use serde::{Deserialize, Serialize};

use crate::connection::FeedCredentials;

/// Provider limit on instruments per subscribe frame.
pub const MAX_INSTRUMENTS_PER_FRAME: usize = 100;

/// Request code for a ticker-mode subscription.
pub const SUBSCRIBE_REQUEST_CODE: u8 = 15;

/// Build the connect URL with credentials in the query string.
///
/// The provider authenticates at handshake time; there is no separate
/// login frame.
pub fn feed_url(base: &str, credentials: &FeedCredentials) -> String {
    format!(
        "{}?version=2&token={}&clientId={}&authType=2",
        base, credentials.access_token, credentials.client_id
    )
}

/// One instrument reference inside a subscribe frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEntry {
    #[serde(rename = "ExchangeSegment")]
    pub exchange_segment: String,
    #[serde(rename = "SecurityId")]
    pub security_id: String,
}

impl From<&Instrument> for SubscriptionEntry {
    fn from(inst: &Instrument) -> Self {
        Self {
            exchange_segment: inst.segment.as_wire().to_string(),
            security_id: inst.security_id.as_str().to_string(),
        }
    }
}

/// Subscribe request frame (client → server).
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest {
    #[serde(rename = "RequestCode")]
    pub request_code: u8,
    #[serde(rename = "InstrumentCount")]
    pub instrument_count: usize,
    #[serde(rename = "InstrumentList")]
    pub instrument_list: Vec<SubscriptionEntry>,
}

impl SubscribeRequest {
    /// Split an instrument set into subscribe frames, each at most
    /// `MAX_INSTRUMENTS_PER_FRAME` instruments.
    pub fn batches(instruments: &[Instrument]) -> Vec<SubscribeRequest> {
        instruments
            .chunks(MAX_INSTRUMENTS_PER_FRAME)
            .map(|chunk| {
                let list: Vec<SubscriptionEntry> =
                    chunk.iter().map(SubscriptionEntry::from).collect();
                SubscribeRequest {
                    request_code: SUBSCRIBE_REQUEST_CODE,
                    instrument_count: list.len(),
                    instrument_list: list,
                }
            })
            .collect()
    }
}

/// Raw ticker frame as received from the provider.
///
/// Fields stay untyped strings here; only the normalizer interprets them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerFrame {
    #[serde(rename = "exchangeSegment")]
    pub exchange_segment: String,
    #[serde(rename = "securityId")]
    pub security_id: String,
    /// Last traded price as a decimal string.
    pub ltp: String,
    /// Last trade time, epoch seconds, exchange clock.
    pub ltt: i64,
}

/// Server-initiated disconnect notice, sent before the socket closes.
#[derive(Debug, Clone, Deserialize)]
pub struct DisconnectNotice {
    pub code: u16,
    #[serde(default)]
    pub reason: String,
}

/// Incoming feed message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum FeedMessage {
    #[serde(rename = "ticker")]
    Ticker(TickerFrame),
    #[serde(rename = "heartbeat")]
    Heartbeat,
    #[serde(rename = "disconnect")]
    Disconnect(DisconnectNotice),
}
