//! Single feed connection lifetime.
//!
//! A `FeedConnection` owns one live WebSocket to the market-data provider:
//! handshake (credentials ride in the connect URL), batched subscribe
//! frames, and the receive loop with keepalive pings and silence detection.
//!
//! Transport failures terminate the loop and surface to the supervisor;
//! they are never retried here. Undecodable frames are logged and skipped.

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatMonitor;
use crate::message::{feed_url, FeedMessage, SubscribeRequest, TickerFrame};
use futures_util::{SinkExt, StreamExt};
use ltp_core::Instrument;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Feed provider credentials, loaded from the environment at startup.
#[derive(Debug, Clone)]
pub struct FeedCredentials {
    pub client_id: String,
    pub access_token: String,
}

/// Feed connection configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket base URL (credentials are appended as query parameters).
    pub url: String,
    /// Silence window: no frame of any kind within this window means the
    /// connection is dead.
    pub silence_timeout_ms: u64,
    /// Keepalive ping interval.
    pub keepalive_interval_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "wss://api-feed.dhan.co".to_string(),
            silence_timeout_ms: 30_000,
            keepalive_interval_ms: 10_000,
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One live connection to the feed.
pub struct FeedConnection {
    stream: WsStream,
    heartbeat: HeartbeatMonitor,
    config: FeedConfig,
}

impl FeedConnection {
    /// Open the WebSocket. The provider authenticates during the handshake;
    /// a rejected token surfaces as a handshake error or an immediate
    /// disconnect notice.
    pub async fn establish(config: &FeedConfig, credentials: &FeedCredentials) -> WsResult<Self> {
        let url = feed_url(&config.url, credentials);
        info!(url = %config.url, "Connecting to feed");

        let (stream, _response) = connect_async_tls_with_config(&url, None, true, None).await?;

        let heartbeat = HeartbeatMonitor::new();
        heartbeat.reset();

        Ok(Self {
            stream,
            heartbeat,
            config: config.clone(),
        })
    }

    /// Send subscribe frames for the full instrument set, split at the
    /// provider's per-frame limit.
    ///
    /// Only callable while the connection is live; ownership of the stream
    /// guarantees there is no other state to be in.
    pub async fn subscribe_all(&mut self, instruments: &[Instrument]) -> WsResult<()> {
        if instruments.is_empty() {
            return Err(WsError::Protocol("empty subscription set".to_string()));
        }

        let batches = SubscribeRequest::batches(instruments);
        let batch_count = batches.len();
        for batch in batches {
            let frame = serde_json::to_string(&batch)?;
            self.stream.send(Message::Text(frame)).await?;
            debug!(count = batch.instrument_count, "Subscribe frame sent");
        }

        info!(
            instruments = instruments.len(),
            frames = batch_count,
            "Subscription frames sent"
        );
        Ok(())
    }

    /// Receive loop. Produces raw ticker frames into `tick_tx` until the
    /// connection dies or shutdown is requested.
    ///
    /// Returns `Ok(())` only on requested shutdown; every other exit is a
    /// transport-level error for the supervisor to handle.
    pub async fn run(
        self,
        tick_tx: &mpsc::Sender<TickerFrame>,
        shutdown: &CancellationToken,
    ) -> WsResult<()> {
        let Self {
            stream,
            heartbeat,
            config,
        } = self;
        let (mut write, mut read) = stream.split();

        let keepalive = Duration::from_millis(config.keepalive_interval_ms);
        let silence_timeout = Duration::from_millis(config.silence_timeout_ms);
        // Check silence a few times per window so detection lag stays small.
        let check_every = Duration::from_millis((config.silence_timeout_ms / 4).max(100));

        let mut ping_timer =
            tokio::time::interval_at(tokio::time::Instant::now() + keepalive, keepalive);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut silence_timer =
            tokio::time::interval_at(tokio::time::Instant::now() + check_every, check_every);
        silence_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Shutdown signal received in feed loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            process_text_frame(&text, &heartbeat, tick_tx).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            heartbeat.record_frame();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Feed closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            warn!(?e, "Feed read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("Feed stream ended");
                            return Err(WsError::ConnectionClosed {
                                code: 1006,
                                reason: "Stream ended".to_string(),
                            });
                        }
                        _ => {}
                    }
                }

                _ = ping_timer.tick() => {
                    write.send(Message::Ping(Vec::new())).await?;
                    heartbeat.record_ping();
                    debug!("Sent keepalive ping");
                }

                _ = silence_timer.tick() => {
                    if heartbeat.is_silent(silence_timeout) {
                        warn!(
                            silence_ms = heartbeat.time_since_last_frame_ms(),
                            "Silence timeout, declaring connection dead"
                        );
                        return Err(WsError::SilenceTimeout(config.silence_timeout_ms));
                    }
                }
            }
        }
    }
}

/// Handle one text frame from the feed.
///
/// Extracted as a separate function for testability. A decode failure is
/// logged and skipped; only a server disconnect notice is an error.
async fn process_text_frame(
    text: &str,
    heartbeat: &HeartbeatMonitor,
    tick_tx: &mpsc::Sender<TickerFrame>,
) -> WsResult<()> {
    heartbeat.record_frame();

    match serde_json::from_str::<FeedMessage>(text) {
        Ok(FeedMessage::Ticker(frame)) => {
            if tick_tx.send(frame).await.is_err() {
                warn!("Tick receiver dropped");
            }
        }
        Ok(FeedMessage::Heartbeat) => {
            debug!("Feed heartbeat");
        }
        Ok(FeedMessage::Disconnect(notice)) => {
            warn!(code = notice.code, reason = %notice.reason, "Server disconnect notice");
            return Err(WsError::ServerDisconnect {
                code: notice.code,
                reason: notice.reason,
            });
        }
        Err(e) => {
            warn!(%e, frame = %truncate_for_log(text), "Undecodable frame skipped");
        }
    }

    Ok(())
}

fn truncate_for_log(text: &str) -> &str {
    text.get(..120).unwrap_or(text)
}
