//! Bayesian drift/volatility estimation over log-returns
//!
//! Conjugate normal update. Two flavours: the standalone analyzer with a
//! weakly informative prior (legacy `bayesianMetrics` section), and the
//! trend-informed posterior used by ABC stage 2, where the prior is centred
//! on the smoothed trend and tightened by its confidence.

use rust_decimal::prelude::ToPrimitive;

use super::{stats, STRUCTURAL_BREAK_PENALTY};
use crate::model::{scaled, ArimaSignal, BayesianMetrics, MomentumMetrics, SCALE};

/// Trading days used to annualise drift and volatility
pub(crate) const TRADING_DAYS: f64 = 252.0;

/// Log returns of the series; entries for non-positive neighbours stay zero
pub(crate) fn log_returns(prices: &[f64]) -> Vec<f64> {
    if prices.len() < 2 {
        return Vec::new();
    }

    let mut returns = vec![0.0; prices.len() - 1];
    for i in 1..prices.len() {
        if prices[i - 1] > 0.0 && prices[i] > 0.0 {
            returns[i - 1] = (prices[i] / prices[i - 1]).ln();
        }
    }
    returns
}

struct Posterior {
    mean: f64,
    variance: f64,
}

fn posterior_update(prior_mean: f64, prior_variance: f64, prior_n: f64, returns: &[f64]) -> Posterior {
    let sample_mean = stats::mean(returns);
    let sample_variance = stats::variance(returns);
    let sample_size = returns.len() as f64;

    let posterior_n = prior_n + sample_size;
    let mean = (prior_n * prior_mean + sample_size * sample_mean) / posterior_n;
    let variance = (prior_n * prior_variance
        + sample_size * sample_variance
        + (prior_n * sample_size / posterior_n) * (sample_mean - prior_mean).powi(2))
        / posterior_n;

    Posterior { mean, variance }
}

fn sample_confidence(sample_size: usize) -> f64 {
    1.0 - 1.0 / ((sample_size + 1) as f64).sqrt()
}

/// Standalone Bayesian analysis with a weakly informative prior
#[derive(Debug, Clone, Default)]
pub struct BayesianAnalyzer;

impl BayesianAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, prices: &[f64]) -> BayesianMetrics {
        if prices.len() < 2 {
            return BayesianMetrics::default();
        }

        let returns = log_returns(prices);
        if returns.is_empty() {
            return BayesianMetrics::default();
        }

        let prior_mean = 0.0;
        let prior_variance = 0.01;
        let prior_n = 1.0;

        let posterior = posterior_update(prior_mean, prior_variance, prior_n, &returns);
        let confidence = sample_confidence(returns.len());

        BayesianMetrics {
            drift: scaled(posterior.mean * TRADING_DAYS, SCALE),
            volatility: scaled((posterior.variance * TRADING_DAYS).sqrt(), SCALE),
            confidence: scaled(confidence, SCALE),
            sample_size: returns.len(),
            prior_mean: scaled(prior_mean, SCALE),
            prior_variance: scaled(prior_variance, SCALE),
        }
    }
}

/// ABC stage 2: momentum posterior with a trend-informed prior.
///
/// Prior mean tracks the smoothed trend, prior variance widens as trend
/// confidence drops, and a detected structural break penalises the
/// resulting confidence.
pub(crate) fn momentum_posterior(prices: &[f64], signal: &ArimaSignal) -> MomentumMetrics {
    let returns = log_returns(prices);
    if returns.is_empty() {
        return MomentumMetrics::default();
    }

    let trend = signal.trend.to_f64().unwrap_or(0.0);
    let trend_confidence = signal.confidence.to_f64().unwrap_or(0.0);

    let prior_mean = trend * 10.0;
    let prior_variance = 0.01 * (2.0 - trend_confidence);
    let prior_n = 1.0 + trend_confidence;

    let posterior = posterior_update(prior_mean, prior_variance, prior_n, &returns);

    let mut confidence = sample_confidence(returns.len());
    if signal.structural_break_detected {
        confidence *= STRUCTURAL_BREAK_PENALTY;
    }

    MomentumMetrics {
        drift: scaled(posterior.mean * TRADING_DAYS, SCALE),
        volatility: scaled((posterior.variance * TRADING_DAYS).sqrt(), SCALE),
        confidence: scaled(confidence, SCALE),
        prior_mean: scaled(prior_mean, SCALE),
        posterior_mean: scaled(posterior.mean, SCALE),
        prior_variance: scaled(prior_variance, SCALE),
        posterior_variance: scaled(posterior.variance, SCALE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn geometric_prices(n: usize, ratio: f64) -> Vec<f64> {
        (0..n).map(|i| 100.0 * ratio.powi(i as i32)).collect()
    }

    #[test]
    fn log_returns_have_expected_length_and_sign() {
        let prices = geometric_prices(50, 1.001);
        let returns = log_returns(&prices);
        assert_eq!(returns.len(), 49);
        assert!(returns.iter().all(|r| *r > 0.0));
        assert!((returns[0] - 1.001f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn log_returns_of_short_series_are_empty() {
        assert!(log_returns(&[100.0]).is_empty());
        assert!(log_returns(&[]).is_empty());
    }

    #[test]
    fn non_positive_prices_leave_zero_entries() {
        let returns = log_returns(&[100.0, 0.0, 100.0]);
        assert_eq!(returns, vec![0.0, 0.0]);
    }

    #[test]
    fn upward_series_produces_positive_drift() {
        let metrics = BayesianAnalyzer::new().analyze(&geometric_prices(200, 1.001));
        assert!(metrics.drift > Decimal::ZERO);
        assert!(metrics.volatility >= Decimal::ZERO);
        assert_eq!(metrics.sample_size, 199);
        assert_eq!(metrics.prior_variance, dec!(0.01));
        assert!(metrics.confidence > dec!(0.9));
    }

    #[test]
    fn downward_series_produces_negative_drift() {
        let metrics = BayesianAnalyzer::new().analyze(&geometric_prices(200, 0.999));
        assert!(metrics.drift < Decimal::ZERO);
    }

    #[test]
    fn short_series_returns_defaults() {
        let metrics = BayesianAnalyzer::new().analyze(&[100.0]);
        assert_eq!(metrics, BayesianMetrics::default());
        assert_eq!(metrics.prior_variance, dec!(0.01));
    }

    #[test]
    fn structural_break_penalises_momentum_confidence() {
        let prices = geometric_prices(100, 1.001);
        let mut signal = ArimaSignal {
            confidence: dec!(0.9),
            ..ArimaSignal::default()
        };

        let clean = momentum_posterior(&prices, &signal);
        signal.structural_break_detected = true;
        let penalised = momentum_posterior(&prices, &signal);

        let ratio = penalised.confidence.to_f64().unwrap() / clean.confidence.to_f64().unwrap();
        assert!((ratio - STRUCTURAL_BREAK_PENALTY).abs() < 1e-6);
    }

    #[test]
    fn trend_informed_prior_shifts_posterior_mean() {
        let prices = geometric_prices(40, 1.0);
        let neutral = ArimaSignal {
            confidence: dec!(0.8),
            ..ArimaSignal::default()
        };
        let trending = ArimaSignal {
            trend: dec!(0.02),
            confidence: dec!(0.8),
            ..ArimaSignal::default()
        };

        let flat = momentum_posterior(&prices, &neutral);
        let informed = momentum_posterior(&prices, &trending);
        assert!(informed.posterior_mean > flat.posterior_mean);
        assert_eq!(informed.prior_mean, dec!(0.2));
    }

    #[test]
    fn volatility_is_never_negative() {
        let noisy: Vec<f64> = (0..80)
            .map(|i| 100.0 + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let metrics = BayesianAnalyzer::new().analyze(&noisy);
        assert!(metrics.volatility >= Decimal::ZERO);
    }
}
