//! finstream - Streaming Market Analytics
//!
//! Single-binary pipeline from exchange stream to subscriber push:
//!
//! - **Ingest**: WebSocket connection to Binance, frame decoding into
//!   normalized ticks
//! - **Bus**: pub/sub fan-out of ticks by channel name
//! - **Windows**: bounded per-symbol sliding windows of recent ticks
//! - **Analytics**: the ABC pipeline (ARIMA trend + CUSUM, Bayesian
//!   posterior, Monte Carlo forecast) on a fixed cadence
//! - **Broadcast**: latest snapshot per symbol pushed to WebSocket
//!   subscribers

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub mod analytics;
pub mod broadcast;
pub mod bus;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod parser;
pub mod store;
pub mod websocket;
pub mod window;

pub use analytics::{
    AbcAnalyzer, AnalysisService, ArimaForecaster, BayesianAnalyzer, MonteCarloSimulator,
};
pub use broadcast::SessionRegistry;
pub use bus::{InMemoryTickBus, TickBus, MARKET_STREAM_CHANNEL};
pub use config::Config;
pub use error::{FeedError, Result};
pub use model::{MarketRegime, MarketSnapshot, Tick};
pub use store::{MemorySnapshotStore, SnapshotStore, SqliteSnapshotStore};
pub use websocket::BinanceFeed;
pub use window::WindowStore;

/// Application state shared across server handlers
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<dyn SnapshotStore>,
    pub config: Arc<Config>,
    pub ingest_active: Arc<AtomicBool>,
}
