//! Service configuration
//!
//! All configuration values with sensible defaults, overridable through
//! environment variables.

use serde::{Deserialize, Serialize};

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // === Ingest ===
    /// Symbols to subscribe on Binance (lowercase, without quote suffix)
    pub binance_symbols: Vec<String>,
    /// Binance combined-stream endpoint base
    pub binance_ws_url: String,

    // === Analytics ===
    /// Symbols the analyzer generates snapshots for (canonical, uppercase)
    pub analytics_symbols: Vec<String>,
    /// Snapshot generation cadence in seconds
    pub analytics_interval_secs: u64,

    // === Broadcast ===
    /// Symbols the broadcaster serves
    pub broadcast_symbols: Vec<String>,
    /// Broadcast cadence in seconds
    pub broadcast_interval_secs: u64,

    // === Monte Carlo ===
    /// Number of simulated price paths
    pub monte_carlo_simulations: usize,
    /// Simulation horizon in daily steps
    pub monte_carlo_horizon_days: usize,

    // === ARIMA (legacy forecast path) ===
    /// Forecast length in periods
    pub arima_horizon_periods: usize,

    // === Server ===
    /// HTTP/WebSocket bind address
    pub server_addr: String,

    // === Storage ===
    /// SQLite path for snapshot persistence (None = in-memory store)
    pub snapshot_db_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let binance_symbols: Vec<String> = ["btc", "eth", "bnb", "sol", "xrp"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let analytics_symbols: Vec<String> = binance_symbols
            .iter()
            .map(|s| s.to_uppercase())
            .collect();

        Self {
            binance_symbols,
            binance_ws_url: "wss://stream.binance.com:9443".to_string(),
            broadcast_symbols: analytics_symbols.clone(),
            analytics_symbols,
            analytics_interval_secs: 5,
            broadcast_interval_secs: 1,
            monte_carlo_simulations: 10_000,
            monte_carlo_horizon_days: 7,
            arima_horizon_periods: 7,
            server_addr: "0.0.0.0:8080".to_string(),
            snapshot_db_path: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("BINANCE_SYMBOLS") {
            config.binance_symbols = split_symbols(&v, false);
            // Derived symbol sets follow the ingest set unless overridden
            config.analytics_symbols = split_symbols(&v, true);
            config.broadcast_symbols = config.analytics_symbols.clone();
        }
        if let Ok(v) = std::env::var("ANALYTICS_SYMBOLS") {
            config.analytics_symbols = split_symbols(&v, true);
        }
        if let Ok(v) = std::env::var("BROADCAST_SYMBOLS") {
            config.broadcast_symbols = split_symbols(&v, true);
        }
        if let Ok(v) = std::env::var("BINANCE_WS_URL") {
            config.binance_ws_url = v;
        }

        if let Ok(v) = std::env::var("ANALYTICS_SNAPSHOT_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                config.analytics_interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("BROADCAST_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                config.broadcast_interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("MONTE_CARLO_SIMULATIONS") {
            if let Ok(n) = v.parse() {
                config.monte_carlo_simulations = n;
            }
        }
        if let Ok(v) = std::env::var("MONTE_CARLO_HORIZON_DAYS") {
            if let Ok(n) = v.parse() {
                config.monte_carlo_horizon_days = n;
            }
        }
        if let Ok(v) = std::env::var("ARIMA_HORIZON_PERIODS") {
            if let Ok(n) = v.parse() {
                config.arima_horizon_periods = n;
            }
        }

        if let Ok(v) = std::env::var("SERVER_ADDR") {
            config.server_addr = v;
        }
        if let Ok(v) = std::env::var("SNAPSHOT_DB_PATH") {
            if !v.is_empty() {
                config.snapshot_db_path = Some(v);
            }
        }

        config
    }

    /// Combined-stream URL covering all configured ingest symbols,
    /// e.g. `wss://.../stream?streams=btcusdt@ticker/ethusdt@ticker`
    pub fn stream_url(&self) -> String {
        let streams: Vec<String> = self
            .binance_symbols
            .iter()
            .map(|s| format!("{}usdt@ticker", s.trim().to_lowercase()))
            .collect();
        format!("{}/stream?streams={}", self.binance_ws_url, streams.join("/"))
    }
}

fn split_symbols(raw: &str, uppercase: bool) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            if uppercase {
                s.to_uppercase()
            } else {
                s.to_lowercase()
            }
        })
        .collect()
}
