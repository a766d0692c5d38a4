//! ABC (ARIMA-Bayes-Carlo) integrated analyzer
//!
//! Three chained stages over one price window:
//!
//! 1. Trend detection with Holt smoothing plus a CUSUM structural-break scan
//!    over the most recent 30% of observations.
//! 2. Bayesian momentum posterior whose prior is informed by the stage-1
//!    trend and confidence.
//! 3. Monte Carlo simulation parameterised by the posterior drift and
//!    volatility.
//!
//! The coupling back into the pipeline is the `needs_recalibration` flag:
//! a structural break or annualised volatility above 0.50 raises it.

use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::info;

use super::{arima, bayes, stats, MIN_WINDOW_SIZE, STRUCTURAL_BREAK_PENALTY};
use crate::analytics::monte_carlo::MonteCarloSimulator;
use crate::model::{
    scaled, AbcAnalysisResult, ArimaSignal, MarketPrediction, MarketRegime, MomentumMetrics,
    PriceTarget, Scenario, PERCENT_SCALE, SCALE,
};

const CUSUM_THRESHOLD_MULTIPLIER: f64 = 3.0;
const HIGH_VOLATILITY_THRESHOLD: f64 = 0.50;
const VOLATILE_REGIME_THRESHOLD: f64 = 0.30;
const MIN_CUSUM_PRICES: usize = 10;

pub struct AbcAnalyzer {
    monte_carlo: MonteCarloSimulator,
}

impl AbcAnalyzer {
    pub fn new(monte_carlo: MonteCarloSimulator) -> Self {
        Self { monte_carlo }
    }

    /// Analyze one window with an OS-seeded RNG
    pub fn analyze(&self, prices: &[f64], current_price: Decimal) -> AbcAnalysisResult {
        let mut rng = rand::thread_rng();
        self.analyze_with(&mut rng, prices, current_price)
    }

    /// Analyze one window; the RNG drives only the Monte Carlo stage.
    ///
    /// Below `MIN_WINDOW_SIZE` observations, or when any stage degenerates
    /// numerically, the default result with an `UNKNOWN` regime is returned.
    /// No failure escapes the analyzer.
    pub fn analyze_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        prices: &[f64],
        current_price: Decimal,
    ) -> AbcAnalysisResult {
        if prices.len() < MIN_WINDOW_SIZE || current_price <= Decimal::ZERO {
            return AbcAnalysisResult::default();
        }

        let signal = match arima_signal(prices) {
            Some(signal) => signal,
            None => return AbcAnalysisResult::default(),
        };

        let momentum = bayes::momentum_posterior(prices, &signal);
        let prediction = self.market_prediction(rng, current_price, &momentum);

        let integration_confidence = integration_confidence(&signal, &momentum);
        let volatility = momentum.volatility.to_f64().unwrap_or(0.0);
        let needs_recalibration =
            signal.structural_break_detected || volatility > HIGH_VOLATILITY_THRESHOLD;
        let market_regime = determine_regime(&signal, &momentum, &prediction);

        let result = AbcAnalysisResult {
            arima_signal: signal,
            momentum_metrics: momentum,
            market_prediction: prediction,
            abc_integration_confidence: scaled(integration_confidence, SCALE),
            needs_recalibration,
            market_regime,
        };

        info!(
            regime = %result.market_regime,
            confidence = %result.abc_integration_confidence,
            recalibration = result.needs_recalibration,
            trend = %result.arima_signal.description,
            "ABC analysis complete"
        );

        result
    }

    /// Stage 3: probabilistic prediction from simulated terminal prices
    fn market_prediction<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        current_price: Decimal,
        momentum: &MomentumMetrics,
    ) -> MarketPrediction {
        let s0 = current_price.to_f64().unwrap_or(0.0);
        let drift = momentum.drift.to_f64().unwrap_or(0.0);
        let volatility = momentum.volatility.to_f64().unwrap_or(0.0);

        let simulated = self.monte_carlo.simulate_with(rng, s0, drift, volatility);

        let probability_up = simulated.probability_up.to_f64().unwrap_or(0.0);
        let probability_down = simulated.probability_down.to_f64().unwrap_or(0.0);
        let probability_neutral = 1.0 - probability_up - probability_down;

        let expected_return = simulated.expected_return.to_f64().unwrap_or(0.0);
        let expected_price_change = s0 * expected_return;
        let expected_price_change_percent = expected_return * 100.0;

        let price_targets = simulated
            .percentiles
            .iter()
            .map(|p| {
                let value = p.value.to_f64().unwrap_or(0.0);
                let change_percent = if s0 > 0.0 { (value - s0) / s0 * 100.0 } else { 0.0 };
                PriceTarget {
                    percentile: p.level,
                    price: p.value,
                    change_percent: scaled(change_percent, PERCENT_SCALE),
                }
            })
            .collect();

        MarketPrediction {
            probability_up: scaled(probability_up, SCALE),
            probability_down: scaled(probability_down, SCALE),
            probability_neutral: scaled(probability_neutral.max(0.0), SCALE),
            expected_price_change: scaled(expected_price_change, PERCENT_SCALE),
            expected_price_change_percent: scaled(expected_price_change_percent, PERCENT_SCALE),
            most_likely_scenario: most_likely_scenario(
                probability_up,
                probability_down,
                probability_neutral,
            ),
            price_targets,
        }
    }
}

/// Stage 1: Holt trend plus CUSUM structural-break detection
fn arima_signal(prices: &[f64]) -> Option<ArimaSignal> {
    let mean = stats::mean(prices);
    let std_dev = stats::std_dev(prices);

    let (_, trend) = arima::holt_smooth(prices);
    let trend_percentage = trend / mean * 100.0;
    if !trend_percentage.is_finite() {
        return None;
    }

    let cusum = cusum_statistic(prices, mean, std_dev);
    let threshold = CUSUM_THRESHOLD_MULTIPLIER * std_dev;
    let structural_break = cusum.abs() > threshold;

    let mut confidence = 1.0 - 1.0 / ((prices.len() + 1) as f64).sqrt();
    if structural_break {
        confidence *= STRUCTURAL_BREAK_PENALTY;
    }
    let confidence = confidence.clamp(0.0, 1.0);

    let trend_percentage_scaled = scaled(trend_percentage, PERCENT_SCALE);
    let description = describe_trend(trend_percentage, trend_percentage_scaled, structural_break);

    Some(ArimaSignal {
        trend: scaled(trend, SCALE),
        trend_percentage: trend_percentage_scaled,
        structural_break_detected: structural_break,
        confidence: scaled(confidence, SCALE),
        description,
        cusum_statistic: scaled(cusum, SCALE),
        threshold: scaled(threshold, SCALE),
    })
}

/// CUSUM over the most recent 30% of the window, in standardised deviations
fn cusum_statistic(prices: &[f64], mean: f64, std_dev: f64) -> f64 {
    if prices.len() < MIN_CUSUM_PRICES || std_dev == 0.0 {
        return 0.0;
    }

    let monitor_start = (prices.len() as f64 * 0.7) as usize;
    let mut cusum = 0.0;
    let mut max_cusum: f64 = 0.0;

    for price in &prices[monitor_start..] {
        cusum += (price - mean) / std_dev;
        max_cusum = max_cusum.abs().max(cusum.abs());
    }

    max_cusum
}

fn describe_trend(trend_percentage: f64, display: Decimal, structural_break: bool) -> String {
    let break_suffix = if structural_break {
        " [STRUCTURAL BREAK DETECTED]"
    } else {
        ""
    };

    if trend_percentage.abs() < 1.0 {
        format!("Price stable{break_suffix}")
    } else if trend_percentage > 0.0 {
        format!("Price increasing {display}% in trend{break_suffix}")
    } else {
        format!("Price decreasing {}% in trend{break_suffix}", display.abs())
    }
}

/// Geometric mean of the stage confidences, penalised on structural break
fn integration_confidence(signal: &ArimaSignal, momentum: &MomentumMetrics) -> f64 {
    let arima_confidence = signal.confidence.to_f64().unwrap_or(0.0);
    let bayes_confidence = momentum.confidence.to_f64().unwrap_or(0.0);

    let stability = if signal.structural_break_detected {
        STRUCTURAL_BREAK_PENALTY
    } else {
        1.0
    };

    (arima_confidence * bayes_confidence).sqrt() * stability
}

/// Regime selection; rules are evaluated in order, first match wins
fn determine_regime(
    signal: &ArimaSignal,
    momentum: &MomentumMetrics,
    prediction: &MarketPrediction,
) -> MarketRegime {
    let trend_pct = signal.trend_percentage.to_f64().unwrap_or(0.0);
    let drift = momentum.drift.to_f64().unwrap_or(0.0);
    let volatility = momentum.volatility.to_f64().unwrap_or(0.0);
    let probability_up = prediction.probability_up.to_f64().unwrap_or(0.0);

    if signal.structural_break_detected {
        return MarketRegime::RegimeChange;
    }
    if volatility > HIGH_VOLATILITY_THRESHOLD {
        return MarketRegime::HighVolatility;
    }

    let volatile = volatility > VOLATILE_REGIME_THRESHOLD;

    let bullish_signals = [trend_pct > 2.0, drift > 0.05, probability_up > 0.6]
        .iter()
        .filter(|s| **s)
        .count();
    if bullish_signals >= 2 {
        return if volatile {
            MarketRegime::BullishVolatile
        } else {
            MarketRegime::BullishStable
        };
    }

    let bearish_signals = [trend_pct < -2.0, drift < -0.05, probability_up < 0.4]
        .iter()
        .filter(|s| **s)
        .count();
    if bearish_signals >= 2 {
        return if volatile {
            MarketRegime::BearishVolatile
        } else {
            MarketRegime::BearishStable
        };
    }

    if volatile {
        MarketRegime::NeutralVolatile
    } else {
        MarketRegime::NeutralStable
    }
}

fn most_likely_scenario(up: f64, down: f64, neutral: f64) -> Scenario {
    if up > down && up > neutral {
        Scenario::UpwardMovement
    } else if down > up && down > neutral {
        Scenario::DownwardMovement
    } else {
        Scenario::SidewaysMovement
    }
}
