//! Internal tick bus
//!
//! Pub/sub seam between ingest and analytics. The in-process implementation
//! fans ticks out over tokio broadcast channels carrying JSON payloads;
//! delivery is at-least-once per subscriber and ordered per publisher and
//! channel. A subscriber that joins late misses in-flight ticks, which the
//! sliding-window semantics tolerate.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{FeedError, Result};
use crate::model::Tick;

/// Channel carrying JSON-serialised ticks from ingest to analytics
pub const MARKET_STREAM_CHANNEL: &str = "market-stream";

const CHANNEL_BUFFER: usize = 4096;

pub type TickHandler = Arc<dyn Fn(Tick) + Send + Sync>;

/// Pub/sub interface for normalized ticks
#[async_trait]
pub trait TickBus: Send + Sync {
    /// Publish a tick to a channel; never blocks on slow subscribers
    async fn publish(&self, channel: &str, tick: &Tick) -> Result<()>;

    /// Register a handler invoked serially for every tick on the channel
    async fn subscribe(&self, channel: &str, handler: TickHandler) -> Result<()>;

    /// Remove all handlers for the channel
    async fn unsubscribe(&self, channel: &str);
}

/// In-process bus over tokio broadcast channels
pub struct InMemoryTickBus {
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
    deliveries: RwLock<HashMap<String, Vec<JoinHandle<()>>>>,
}

impl InMemoryTickBus {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            deliveries: RwLock::new(HashMap::new()),
        }
    }

    async fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        if let Some(sender) = self.channels.read().await.get(channel) {
            return sender.clone();
        }
        let mut guard = self.channels.write().await;
        guard
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_BUFFER).0)
            .clone()
    }
}

impl Default for InMemoryTickBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TickBus for InMemoryTickBus {
    async fn publish(&self, channel: &str, tick: &Tick) -> Result<()> {
        let payload = serde_json::to_string(tick)
            .map_err(|e| FeedError::Channel(format!("tick serialization failed: {e}")))?;
        let sender = self.sender(channel).await;
        if sender.send(payload).is_err() {
            // No live subscribers; the tick is dropped, not an error
            debug!(channel, symbol = %tick.symbol, "published tick with no subscribers");
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str, handler: TickHandler) -> Result<()> {
        let mut rx = self.sender(channel).await.subscribe();
        let channel_name = channel.to_string();

        let delivery = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => match serde_json::from_str::<Tick>(&payload) {
                        Ok(tick) => handler(tick),
                        Err(e) => {
                            warn!(channel = %channel_name, error = %e, "dropping undecodable bus message");
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(channel = %channel_name, skipped, "subscriber lagged, ticks skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.deliveries
            .write()
            .await
            .entry(channel.to_string())
            .or_default()
            .push(delivery);

        debug!(channel, "subscribed to tick channel");
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) {
        if let Some(handles) = self.deliveries.write().await.remove(channel) {
            for handle in handles {
                handle.abort();
            }
        }
        debug!(channel, "unsubscribed from tick channel");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn tick(symbol: &str, price_cents: i64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            price: rust_decimal::Decimal::new(price_cents, 2),
            volume: 1,
            timestamp: Utc::now(),
            exchange: "BINANCE".to_string(),
            bid: None,
            ask: None,
            high: None,
            low: None,
            open: None,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn delivers_to_all_subscribers_in_order() {
        let bus = InMemoryTickBus::new();
        let first = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let second = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for sink in [first.clone(), second.clone()] {
            let handler: TickHandler = Arc::new(move |t: Tick| sink.lock().push(t.price));
            bus.subscribe(MARKET_STREAM_CHANNEL, handler).await.unwrap();
        }

        for i in 1..=10 {
            bus.publish(MARKET_STREAM_CHANNEL, &tick("BTC", i * 100))
                .await
                .unwrap();
        }
        settle().await;

        let expected: Vec<_> = (1..=10)
            .map(|i| rust_decimal::Decimal::new(i * 100, 2))
            .collect();
        assert_eq!(*first.lock(), expected);
        assert_eq!(*second.lock(), expected);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = InMemoryTickBus::new();
        bus.publish("empty-channel", &tick("BTC", 100)).await.unwrap();
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = InMemoryTickBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let handler: TickHandler = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.subscribe(MARKET_STREAM_CHANNEL, handler).await.unwrap();
        bus.publish(MARKET_STREAM_CHANNEL, &tick("BTC", 100))
            .await
            .unwrap();
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        bus.unsubscribe(MARKET_STREAM_CHANNEL).await;
        bus.publish(MARKET_STREAM_CHANNEL, &tick("BTC", 200))
            .await
            .unwrap();
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let bus = InMemoryTickBus::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: TickHandler = Arc::new(move |t: Tick| sink.lock().push(t.symbol));

        bus.subscribe("channel-a", handler).await.unwrap();
        bus.publish("channel-a", &tick("BTC", 100)).await.unwrap();
        bus.publish("channel-b", &tick("ETH", 200)).await.unwrap();
        settle().await;

        assert_eq!(*seen.lock(), vec!["BTC".to_string()]);
    }

    #[tokio::test]
    async fn payload_on_the_wire_is_json() {
        let bus = InMemoryTickBus::new();
        let sender = bus.sender(MARKET_STREAM_CHANNEL).await;
        let mut rx = sender.subscribe();

        let published = tick("BTC", 6500012);
        bus.publish(MARKET_STREAM_CHANNEL, &published).await.unwrap();

        let payload = rx.recv().await.unwrap();
        let decoded: Tick = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded, published);
        assert_eq!(decoded.price, dec!(65000.12));
    }
}
