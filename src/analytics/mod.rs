//! Analytics service
//!
//! Consumes ticks into per-symbol windows and, on a fixed cadence, runs the
//! full analytical stack per symbol: the integrated ABC pipeline plus the
//! standalone Bayesian, forecast and Monte Carlo sections kept for snapshot
//! compatibility. One symbol failing never fails a cycle.

mod abc;
mod arima;
mod bayes;
mod monte_carlo;
mod stats;

pub use abc::AbcAnalyzer;
pub use arima::ArimaForecaster;
pub use bayes::BayesianAnalyzer;
pub use monte_carlo::MonteCarloSimulator;

use chrono::Utc;
use futures_util::future::join_all;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::metrics;
use crate::model::{MarketSnapshot, Tick};
use crate::store::SnapshotStore;
use crate::window::WindowStore;

/// Minimum window size before analysis produces a real snapshot
pub const MIN_WINDOW_SIZE: usize = 30;

/// Confidence multiplier applied when a structural break is detected
pub(crate) const STRUCTURAL_BREAK_PENALTY: f64 = 0.7;

pub struct AnalysisService {
    windows: Arc<WindowStore>,
    store: Arc<dyn SnapshotStore>,
    abc: AbcAnalyzer,
    bayesian: BayesianAnalyzer,
    forecaster: ArimaForecaster,
    monte_carlo: MonteCarloSimulator,
}

impl AnalysisService {
    pub fn new(windows: Arc<WindowStore>, store: Arc<dyn SnapshotStore>, config: &Config) -> Self {
        let monte_carlo = MonteCarloSimulator::new(
            config.monte_carlo_simulations,
            config.monte_carlo_horizon_days,
        );

        Self {
            windows,
            store,
            abc: AbcAnalyzer::new(monte_carlo.clone()),
            bayesian: BayesianAnalyzer::new(),
            forecaster: ArimaForecaster::new(config.arima_horizon_periods),
            monte_carlo,
        }
    }

    /// Feed one tick into its symbol's window. Invalid ticks are dropped.
    pub fn record_tick(&self, tick: Tick) {
        if tick.symbol.is_empty() || tick.price <= Decimal::ZERO {
            warn!(symbol = %tick.symbol, price = %tick.price, "dropping invalid tick");
            return;
        }

        let symbol = tick.symbol.clone();
        self.windows.append(tick);
        metrics::TICKS_RECORDED.inc();
        debug!(
            symbol = %symbol,
            window = self.windows.len(&symbol),
            "tick recorded"
        );
    }

    /// Run the full analytical stack for one symbol and persist the result.
    ///
    /// Below `MIN_WINDOW_SIZE` observations the default snapshot (regime
    /// `UNKNOWN`, zero price) is produced; it is stored and broadcast like
    /// any other so subscribers see the symbol's state.
    pub async fn generate_snapshot(&self, symbol: &str) -> MarketSnapshot {
        let prices = self.windows.prices(symbol);

        let snapshot = if prices.len() < MIN_WINDOW_SIZE {
            warn!(symbol, ticks = prices.len(), "insufficient data for analysis");
            MarketSnapshot::default_for(symbol)
        } else {
            self.build_snapshot(symbol, &prices)
        };

        if let Err(e) = self.store.save(&snapshot).await {
            error!(symbol, error = %e, "failed to save snapshot");
        }
        metrics::SNAPSHOTS_GENERATED.inc();

        snapshot
    }

    fn build_snapshot(&self, symbol: &str, prices: &[f64]) -> MarketSnapshot {
        let current_price = self
            .windows
            .last_price(symbol)
            .filter(|p| *p > Decimal::ZERO)
            .unwrap_or(Decimal::ZERO);

        let abc_analysis = self.abc.analyze(prices, current_price);

        // Standalone sections retained for snapshot compatibility; the
        // legacy Monte Carlo run is parameterised by the weak-prior metrics
        let bayesian_metrics = self.bayesian.analyze(prices);
        let arima_forecast = self.forecaster.forecast(prices);
        let monte_carlo_results = self.monte_carlo.simulate(
            current_price.to_f64().unwrap_or(0.0),
            bayesian_metrics.drift.to_f64().unwrap_or(0.0),
            bayesian_metrics.volatility.to_f64().unwrap_or(0.0),
        );

        let market_state = abc_analysis.market_regime;

        info!(
            symbol,
            price = %current_price,
            state = %market_state,
            "snapshot generated"
        );

        MarketSnapshot {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            current_price,
            market_state,
            bayesian_metrics,
            arima_forecast,
            monte_carlo_results,
            abc_analysis: Some(abc_analysis),
        }
    }
}

/// Periodic snapshot generation for all configured symbols.
///
/// Analyses within one cycle run concurrently across symbols; the next cycle
/// starts only after the previous one finished, so invocations for the same
/// symbol never overlap.
pub async fn run_scheduler(
    service: Arc<AnalysisService>,
    symbols: Vec<String>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(symbols = ?symbols, interval_secs = interval.as_secs(), "analytics scheduler started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                debug!("generating snapshots for all symbols");
                join_all(
                    symbols
                        .iter()
                        .map(|symbol| service.generate_snapshot(symbol)),
                )
                .await;
            }
        }
    }

    info!("analytics scheduler stopped");
}
