//! Domain and wire models
//!
//! Field names and JSON casing are part of the downstream contract; every
//! externally exposed fractional value carries a fixed scale with half-up
//! rounding.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fractional digits for analytical values
pub const SCALE: u32 = 8;
/// Fractional digits for percent and price-change values
pub const PERCENT_SCALE: u32 = 2;

/// Round a computed value to the given scale, half-up. Non-finite values
/// collapse to zero so no arithmetic failure escapes the analyzers.
pub fn scaled(value: f64, dp: u32) -> Decimal {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero))
        .unwrap_or(Decimal::ZERO)
}

/// A single normalized market observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tick {
    pub symbol: String,
    pub price: Decimal,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
    pub exchange: String,
    #[serde(default)]
    pub bid: Option<Decimal>,
    #[serde(default)]
    pub ask: Option<Decimal>,
    #[serde(default)]
    pub high: Option<Decimal>,
    #[serde(default)]
    pub low: Option<Decimal>,
    #[serde(default)]
    pub open: Option<Decimal>,
}

/// Qualitative market state emitted by the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    BullishStable,
    BullishVolatile,
    BearishStable,
    BearishVolatile,
    NeutralStable,
    NeutralVolatile,
    RegimeChange,
    HighVolatility,
    Unknown,
}

impl MarketRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BullishStable => "BULLISH_STABLE",
            Self::BullishVolatile => "BULLISH_VOLATILE",
            Self::BearishStable => "BEARISH_STABLE",
            Self::BearishVolatile => "BEARISH_VOLATILE",
            Self::NeutralStable => "NEUTRAL_STABLE",
            Self::NeutralVolatile => "NEUTRAL_VOLATILE",
            Self::RegimeChange => "REGIME_CHANGE",
            Self::HighVolatility => "HIGH_VOLATILITY",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Most likely price scenario from the Monte Carlo distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scenario {
    UpwardMovement,
    DownwardMovement,
    SidewaysMovement,
    Unknown,
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UpwardMovement => "UPWARD_MOVEMENT",
            Self::DownwardMovement => "DOWNWARD_MOVEMENT",
            Self::SidewaysMovement => "SIDEWAYS_MOVEMENT",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Trend signal with structural-break detection (ABC stage 1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArimaSignal {
    pub trend: Decimal,
    pub trend_percentage: Decimal,
    pub structural_break_detected: bool,
    pub confidence: Decimal,
    pub description: String,
    pub cusum_statistic: Decimal,
    pub threshold: Decimal,
}

impl Default for ArimaSignal {
    fn default() -> Self {
        Self {
            trend: Decimal::ZERO,
            trend_percentage: Decimal::ZERO,
            structural_break_detected: false,
            confidence: Decimal::ZERO,
            description: "Insufficient data".to_string(),
            cusum_statistic: Decimal::ZERO,
            threshold: Decimal::ZERO,
        }
    }
}

/// Bayesian momentum posterior (ABC stage 2)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MomentumMetrics {
    pub drift: Decimal,
    pub volatility: Decimal,
    pub confidence: Decimal,
    pub prior_mean: Decimal,
    pub posterior_mean: Decimal,
    pub prior_variance: Decimal,
    pub posterior_variance: Decimal,
}

impl Default for MomentumMetrics {
    fn default() -> Self {
        Self {
            drift: Decimal::ZERO,
            volatility: Decimal::ZERO,
            confidence: Decimal::ZERO,
            prior_mean: Decimal::ZERO,
            posterior_mean: Decimal::ZERO,
            prior_variance: scaled(0.01, SCALE),
            posterior_variance: Decimal::ZERO,
        }
    }
}

/// A percentile price target of the Monte Carlo distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTarget {
    pub percentile: u32,
    pub price: Decimal,
    pub change_percent: Decimal,
}

/// Probabilistic market prediction (ABC stage 3)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketPrediction {
    pub probability_up: Decimal,
    pub probability_down: Decimal,
    pub probability_neutral: Decimal,
    pub expected_price_change: Decimal,
    pub expected_price_change_percent: Decimal,
    pub most_likely_scenario: Scenario,
    pub price_targets: Vec<PriceTarget>,
}

impl Default for MarketPrediction {
    fn default() -> Self {
        Self {
            probability_up: scaled(0.5, SCALE),
            probability_down: scaled(0.5, SCALE),
            probability_neutral: Decimal::ZERO,
            expected_price_change: Decimal::ZERO,
            expected_price_change_percent: Decimal::ZERO,
            most_likely_scenario: Scenario::Unknown,
            price_targets: Vec::new(),
        }
    }
}

/// Integrated result of the three-stage ABC pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbcAnalysisResult {
    pub arima_signal: ArimaSignal,
    pub momentum_metrics: MomentumMetrics,
    pub market_prediction: MarketPrediction,
    pub abc_integration_confidence: Decimal,
    pub needs_recalibration: bool,
    pub market_regime: MarketRegime,
}

impl Default for AbcAnalysisResult {
    fn default() -> Self {
        Self {
            arima_signal: ArimaSignal::default(),
            momentum_metrics: MomentumMetrics::default(),
            market_prediction: MarketPrediction::default(),
            abc_integration_confidence: Decimal::ZERO,
            needs_recalibration: false,
            market_regime: MarketRegime::Unknown,
        }
    }
}

/// Standalone Bayesian drift/volatility estimate (legacy analytics path)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BayesianMetrics {
    pub drift: Decimal,
    pub volatility: Decimal,
    pub confidence: Decimal,
    pub sample_size: usize,
    pub prior_mean: Decimal,
    pub prior_variance: Decimal,
}

impl Default for BayesianMetrics {
    fn default() -> Self {
        Self {
            drift: Decimal::ZERO,
            volatility: Decimal::ZERO,
            confidence: Decimal::ZERO,
            sample_size: 0,
            prior_mean: Decimal::ZERO,
            prior_variance: scaled(0.01, SCALE),
        }
    }
}

/// Point forecast with confidence intervals (legacy analytics path)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ArimaForecast {
    pub predictions: Vec<Decimal>,
    pub confidence_interval_lower: Vec<Decimal>,
    pub confidence_interval_upper: Vec<Decimal>,
    pub horizon: usize,
    pub model_order: String,
    pub aic: Decimal,
}

/// Percentile of the simulated terminal-price distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileLevel {
    pub level: u32,
    pub value: Decimal,
}

/// Monte Carlo simulation output with risk metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloResults {
    pub simulations: usize,
    pub probability_up: Decimal,
    pub probability_down: Decimal,
    pub expected_return: Decimal,
    pub value_at_risk95: Decimal,
    pub value_at_risk99: Decimal,
    #[serde(rename = "conditionalVaR")]
    pub conditional_var: Decimal,
    pub percentiles: Vec<PercentileLevel>,
}

impl MonteCarloResults {
    /// Neutral results used when simulation cannot run
    pub fn default_for(simulations: usize) -> Self {
        let percentiles = [5, 25, 50, 75, 95]
            .iter()
            .map(|&level| PercentileLevel {
                level,
                value: Decimal::ZERO,
            })
            .collect();

        Self {
            simulations,
            probability_up: scaled(0.5, SCALE),
            probability_down: scaled(0.5, SCALE),
            expected_return: Decimal::ZERO,
            value_at_risk95: Decimal::ZERO,
            value_at_risk99: Decimal::ZERO,
            conditional_var: Decimal::ZERO,
            percentiles,
        }
    }
}

impl Default for MonteCarloResults {
    fn default() -> Self {
        Self::default_for(0)
    }
}

/// Complete analytical snapshot for one symbol at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub current_price: Decimal,
    pub market_state: MarketRegime,
    pub bayesian_metrics: BayesianMetrics,
    pub arima_forecast: ArimaForecast,
    pub monte_carlo_results: MonteCarloResults,
    pub abc_analysis: Option<AbcAnalysisResult>,
}

impl MarketSnapshot {
    /// Placeholder snapshot emitted while the window is below the minimum
    pub fn default_for(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            current_price: Decimal::ZERO,
            market_state: MarketRegime::Unknown,
            bayesian_metrics: BayesianMetrics::default(),
            arima_forecast: ArimaForecast::default(),
            monte_carlo_results: MonteCarloResults::default(),
            abc_analysis: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_half_up_at_scale() {
        assert_eq!(scaled(0.123456789, SCALE), dec!(0.12345679));
        assert_eq!(scaled(-0.123456789, SCALE), dec!(-0.12345679));
        assert_eq!(scaled(1.0449, PERCENT_SCALE), dec!(1.04));
        // Exact midpoints resolve away from zero
        let midpoint = dec!(0.123456785)
            .round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero);
        assert_eq!(midpoint, dec!(0.12345679));
        let negative = dec!(-1.005).round_dp_with_strategy(
            PERCENT_SCALE,
            RoundingStrategy::MidpointAwayFromZero,
        );
        assert_eq!(negative, dec!(-1.01));
    }

    #[test]
    fn non_finite_values_collapse_to_zero() {
        assert_eq!(scaled(f64::NAN, SCALE), Decimal::ZERO);
        assert_eq!(scaled(f64::INFINITY, SCALE), Decimal::ZERO);
    }

    #[test]
    fn regime_serializes_screaming_snake() {
        let json = serde_json::to_string(&MarketRegime::BullishStable).unwrap();
        assert_eq!(json, "\"BULLISH_STABLE\"");
        let back: MarketRegime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MarketRegime::BullishStable);
    }

    #[test]
    fn tick_roundtrips_through_json() {
        let tick = Tick {
            symbol: "BTC".to_string(),
            price: dec!(65000.12),
            volume: 1200,
            timestamp: Utc::now(),
            exchange: "BINANCE".to_string(),
            bid: None,
            ask: None,
            high: Some(dec!(66000)),
            low: Some(dec!(64000)),
            open: Some(dec!(64500)),
        };
        let json = serde_json::to_string(&tick).unwrap();
        let back: Tick = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tick);
    }

    #[test]
    fn snapshot_wire_fields_are_camel_case() {
        let snapshot = MarketSnapshot::default_for("ETH");
        let value = serde_json::to_value(&snapshot).unwrap();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("currentPrice"));
        assert!(object.contains_key("marketState"));
        assert!(object.contains_key("bayesianMetrics"));
        assert!(object.contains_key("arimaForecast"));
        assert!(object.contains_key("monteCarloResults"));
        assert!(object.contains_key("abcAnalysis"));
        assert!(object["abcAnalysis"].is_null());
        assert_eq!(object["marketState"], "UNKNOWN");
    }

    #[test]
    fn monte_carlo_wire_uses_conditional_var_casing() {
        let value = serde_json::to_value(MonteCarloResults::default_for(100)).unwrap();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("conditionalVaR"));
        assert!(object.contains_key("valueAtRisk95"));
        assert_eq!(object["percentiles"].as_array().unwrap().len(), 5);
    }
}
