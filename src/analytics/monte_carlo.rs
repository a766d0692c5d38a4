//! Monte Carlo price-path simulation
//!
//! Geometric Brownian motion over daily steps. Terminal prices feed the
//! probability estimates, VaR/CVaR and the percentile ladder. Outputs are
//! deterministic only when the caller supplies a seeded RNG.

use rand::Rng;
use rand_distr::StandardNormal;
use std::cmp::Ordering;

use super::bayes::TRADING_DAYS;
use super::stats;
use crate::model::{scaled, MonteCarloResults, PercentileLevel, SCALE};

const PERCENTILE_LEVELS: [u32; 5] = [5, 25, 50, 75, 95];
const TAIL_ALPHA: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct MonteCarloSimulator {
    simulations: usize,
    horizon_days: usize,
}

impl MonteCarloSimulator {
    pub fn new(simulations: usize, horizon_days: usize) -> Self {
        Self {
            simulations,
            horizon_days,
        }
    }

    /// Simulate with an OS-seeded RNG
    pub fn simulate(&self, current_price: f64, drift: f64, volatility: f64) -> MonteCarloResults {
        let mut rng = rand::thread_rng();
        self.simulate_with(&mut rng, current_price, drift, volatility)
    }

    /// Simulate with a caller-provided RNG; seed it for reproducible output
    pub fn simulate_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        current_price: f64,
        drift: f64,
        volatility: f64,
    ) -> MonteCarloResults {
        if self.simulations == 0
            || current_price <= 0.0
            || !current_price.is_finite()
            || !drift.is_finite()
            || !volatility.is_finite()
        {
            return MonteCarloResults::default_for(self.simulations);
        }

        let s0 = current_price;
        let dt = 1.0 / TRADING_DAYS;
        let drift_term = (drift - 0.5 * volatility * volatility) * dt;
        let diffusion = volatility * dt.sqrt();

        let mut terminal_prices = Vec::with_capacity(self.simulations);
        let mut count_up = 0usize;
        let mut count_down = 0usize;

        for _ in 0..self.simulations {
            let mut price = s0;
            for _ in 0..self.horizon_days {
                let z: f64 = rng.sample(StandardNormal);
                price *= (drift_term + diffusion * z).exp();
            }
            terminal_prices.push(price);

            if price > s0 {
                count_up += 1;
            } else {
                // Equality counts toward the downside
                count_down += 1;
            }
        }

        terminal_prices.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let probability_up = count_up as f64 / self.simulations as f64;
        let probability_down = count_down as f64 / self.simulations as f64;
        let expected_return = (stats::mean(&terminal_prices) - s0) / s0;

        let var95 = s0 - tail_value(&terminal_prices, 0.05);
        let var99 = s0 - tail_value(&terminal_prices, 0.01);
        let cvar = conditional_var(&terminal_prices, s0, TAIL_ALPHA);

        let percentiles = PERCENTILE_LEVELS
            .iter()
            .map(|&level| PercentileLevel {
                level,
                value: scaled(tail_value(&terminal_prices, level as f64 / 100.0), SCALE),
            })
            .collect();

        MonteCarloResults {
            simulations: self.simulations,
            probability_up: scaled(probability_up, SCALE),
            probability_down: scaled(probability_down, SCALE),
            expected_return: scaled(expected_return, SCALE),
            value_at_risk95: scaled(var95, SCALE),
            value_at_risk99: scaled(var99, SCALE),
            conditional_var: scaled(cvar, SCALE),
            percentiles,
        }
    }
}

impl Default for MonteCarloSimulator {
    fn default() -> Self {
        Self::new(10_000, 7)
    }
}

fn tail_value(sorted: &[f64], fraction: f64) -> f64 {
    let index = ((sorted.len() as f64 * fraction) as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Expected shortfall: mean loss over the worst `alpha` fraction of outcomes
fn conditional_var(sorted: &[f64], current_price: f64, alpha: f64) -> f64 {
    let cutoff = (sorted.len() as f64 * alpha) as usize;
    if cutoff == 0 {
        return 0.0;
    }

    let total: f64 = sorted[..cutoff].iter().map(|p| current_price - p).sum();
    total / cutoff as f64
}
