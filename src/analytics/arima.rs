//! Trend estimation and point forecasting
//!
//! Both paths run Holt's double exponential smoothing. The forecaster keeps
//! the `ARIMA(1,1,1)` model-order label in its output: the label is part of
//! the wire contract even though the fitted model is Holt smoothing.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use super::stats;
use crate::model::{scaled, ArimaForecast, SCALE};

/// Level smoothing factor
pub(crate) const SMOOTHING_ALPHA: f64 = 0.3;
/// Trend smoothing factor
pub(crate) const SMOOTHING_BETA: f64 = 0.1;

const CONFIDENCE_Z95: f64 = 1.96;
const MODEL_PARAMETERS: usize = 3;
const MIN_FORECAST_PRICES: usize = 10;

/// Final (level, trend) of Holt smoothing over the series.
///
/// The trend is seeded with the end-to-end slope and refined against each
/// successive observation.
pub(crate) fn holt_smooth(prices: &[f64]) -> (f64, f64) {
    if prices.len() < 2 {
        return (prices.first().copied().unwrap_or(0.0), 0.0);
    }

    let mut level = prices[0];
    let mut trend = (prices[prices.len() - 1] - prices[0]) / prices.len() as f64;

    for &price in &prices[1..] {
        let prev_level = level;
        level = SMOOTHING_ALPHA * price + (1.0 - SMOOTHING_ALPHA) * (level + trend);
        trend = SMOOTHING_BETA * (level - prev_level) + (1.0 - SMOOTHING_BETA) * trend;
    }

    (level, trend)
}

/// Point forecaster for the legacy `arimaForecast` snapshot section
#[derive(Debug, Clone)]
pub struct ArimaForecaster {
    horizon: usize,
}

impl ArimaForecaster {
    pub fn new(horizon: usize) -> Self {
        Self { horizon }
    }

    /// Forecast `horizon` periods ahead with a 95% confidence band.
    ///
    /// Below ten observations a zeroed forecast with model order
    /// `ARIMA(0,0,0)` is returned.
    pub fn forecast(&self, prices: &[f64]) -> ArimaForecast {
        if prices.len() < MIN_FORECAST_PRICES {
            return Self::default_forecast(self.horizon);
        }

        let (level, trend) = holt_smooth(prices);
        let std_error = stats::std_dev(prices);

        let mut predictions = Vec::with_capacity(self.horizon);
        let mut lower = Vec::with_capacity(self.horizon);
        let mut upper = Vec::with_capacity(self.horizon);

        for h in 1..=self.horizon {
            let forecast = level + h as f64 * trend;
            let margin = CONFIDENCE_Z95 * std_error * (h as f64).sqrt();
            predictions.push(scaled(forecast, SCALE));
            lower.push(scaled(forecast - margin, SCALE));
            upper.push(scaled(forecast + margin, SCALE));
        }

        let aic = calculate_aic(prices, MODEL_PARAMETERS);

        ArimaForecast {
            predictions,
            confidence_interval_lower: lower,
            confidence_interval_upper: upper,
            horizon: self.horizon,
            model_order: "ARIMA(1,1,1)".to_string(),
            aic: Decimal::from_f64(aic)
                .map(|d| d.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero))
                .unwrap_or(Decimal::MAX),
        }
    }

    fn default_forecast(horizon: usize) -> ArimaForecast {
        let zeros = vec![Decimal::ZERO; horizon];
        ArimaForecast {
            predictions: zeros.clone(),
            confidence_interval_lower: zeros.clone(),
            confidence_interval_upper: zeros,
            horizon,
            model_order: "ARIMA(0,0,0)".to_string(),
            aic: Decimal::ZERO,
        }
    }
}

/// Akaike information criterion over the fitted series
fn calculate_aic(prices: &[f64], parameters: usize) -> f64 {
    let variance = stats::variance(prices);
    let n = prices.len();

    if variance <= 0.0 || n <= parameters {
        return f64::MAX;
    }

    n as f64 * variance.ln() + 2.0 * parameters as f64
}
