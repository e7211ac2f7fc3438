//! Notification pipeline for the LTP relay.
//!
//! Buffers the latest price per instrument, emits at most one message per
//! instrument per flush period (last-value-wins coalescing), and delivers
//! to the chat channel with per-instrument ordering and bounded retries.

pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod throttle;

pub use channel::{
    format_update, BoxFuture, DynMessageChannel, MessageChannel, MockMessageChannel,
    TelegramChannel,
};
pub use dispatcher::{DispatchStats, Dispatcher, RetryPolicy};
pub use error::{NotifyError, NotifyResult, SendError};
pub use throttle::{NotificationThrottler, ThrottleEntry};
