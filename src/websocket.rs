//! Binance stream ingest
//!
//! Maintains the upstream WebSocket connection: bounded connect, explicit
//! subscription frame, decode-and-publish loop, reconnect with capped
//! exponential backoff. Malformed frames are dropped without tearing the
//! stream down; a failed publish never blocks the decoder.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{TickBus, MARKET_STREAM_CHANNEL};
use crate::config::Config;
use crate::metrics;
use crate::parser;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Ingest feed holding the exchange connection lifecycle
pub struct BinanceFeed {
    config: Config,
    bus: Arc<dyn TickBus>,
    active: Arc<AtomicBool>,
}

impl BinanceFeed {
    pub fn new(config: Config, bus: Arc<dyn TickBus>) -> Self {
        Self {
            config,
            bus,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Single-writer flag: true while a connection is established
    pub fn active_flag(&self) -> Arc<AtomicBool> {
        self.active.clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Connect-and-read loop until cancellation. Reconnects on every
    /// connection loss with capped exponential backoff.
    pub async fn run(self, cancel: CancellationToken) {
        let url = self.config.stream_url();
        info!(url = %url, symbols = ?self.config.binance_symbols, "starting ingest feed");

        let mut reconnect_attempt = 0u32;

        while !cancel.is_cancelled() {
            match timeout(CONNECT_TIMEOUT, connect_async(url.as_str())).await {
                Ok(Ok((mut stream, _response))) => {
                    reconnect_attempt = 0;
                    self.active.store(true, Ordering::Relaxed);
                    info!("connected to Binance stream");

                    if let Err(e) = stream.send(Message::Text(self.subscribe_frame())).await {
                        warn!(error = %e, "failed to send subscription frame");
                    } else {
                        info!(symbols = ?self.config.binance_symbols, "subscribed to ticker streams");
                    }

                    loop {
                        let frame = tokio::select! {
                            _ = cancel.cancelled() => {
                                let _ = stream.close(None).await;
                                break;
                            }
                            frame = stream.next() => frame,
                        };

                        let Some(frame) = frame else {
                            warn!("stream closed by remote");
                            break;
                        };

                        match frame {
                            Ok(Message::Text(payload)) => self.handle_frame(&payload).await,
                            Ok(Message::Binary(payload)) => {
                                if let Ok(text) = std::str::from_utf8(&payload) {
                                    self.handle_frame(text).await;
                                }
                            }
                            Ok(Message::Ping(payload)) => {
                                if stream.send(Message::Pong(payload)).await.is_err() {
                                    break;
                                }
                            }
                            Ok(Message::Close(_)) => {
                                info!("close frame received");
                                break;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!(error = %e, "websocket read error");
                                break;
                            }
                        }
                    }

                    self.active.store(false, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    error!(error = %e, "failed to connect to Binance stream");
                }
                Err(_) => {
                    error!(timeout_secs = CONNECT_TIMEOUT.as_secs(), "connect timed out");
                }
            }

            if cancel.is_cancelled() {
                break;
            }

            reconnect_attempt = reconnect_attempt.saturating_add(1);
            let delay = reconnect_delay(reconnect_attempt);
            warn!(attempt = reconnect_attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.active.store(false, Ordering::Relaxed);
        info!("ingest feed stopped");
    }

    async fn handle_frame(&self, payload: &str) {
        match parser::parse_frame(payload) {
            Ok(Some(tick)) => {
                metrics::TICKS_INGESTED.inc();
                debug!(symbol = %tick.symbol, price = %tick.price, "tick decoded");

                if let Err(e) = self.bus.publish(MARKET_STREAM_CHANNEL, &tick).await {
                    warn!(symbol = %tick.symbol, error = %e, "failed to publish tick");
                } else {
                    metrics::TICKS_PUBLISHED.inc();
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
            }
        }
    }

    /// `{"method":"SUBSCRIBE","params":["btcusdt@ticker",...],"id":1}`
    fn subscribe_frame(&self) -> String {
        let params: Vec<String> = self
            .config
            .binance_symbols
            .iter()
            .map(|s| format!("{}usdt@ticker", s.trim().to_lowercase()))
            .collect();

        serde_json::json!({
            "method": "SUBSCRIBE",
            "params": params,
            "id": 1,
        })
        .to_string()
    }
}

fn reconnect_delay(attempt: u32) -> Duration {
    let exponent = attempt.min(6);
    let base_ms = 500u64.saturating_mul(1u64 << exponent);
    let jitter_ms = now_unix_ms() % 250;
    Duration::from_millis(base_ms.saturating_add(jitter_ms)).min(MAX_BACKOFF)
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
