//! Integration tests for ltp-bot.
//!
//! These tests verify the interaction between components:
//! - Feed connection lifecycle and subscription framing
//! - Reconnection with subscription restore
//! - Tick flow into the throttling pipeline

pub mod common;
