//! Market price series: validated once, then shared read-only.

use std::ops::Deref;
use std::sync::Arc;

use rand::{Rng, SeedableRng, rngs::StdRng};
use thiserror::Error;

/// Reasons a price series is rejected.
#[derive(Debug, Error, PartialEq)]
pub enum PriceSeriesError {
    #[error("price series is empty")]
    Empty,
    #[error("price at step {step} is not a finite number ({value})")]
    NonFinite { step: usize, value: f64 },
    #[error("price at step {step} is negative ({value})")]
    Negative { step: usize, value: f64 },
}

/// Ordered market prices, one per timestep.
///
/// Immutable once built. Cloning shares the underlying buffer, so several
/// independently-owned engines can run against the same series.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    prices: Arc<[f64]>,
}

impl PriceSeries {
    /// Builds a series, rejecting empty input and non-finite or negative prices.
    ///
    /// # Errors
    ///
    /// Returns the first offending entry.
    pub fn new(prices: impl Into<Vec<f64>>) -> Result<Self, PriceSeriesError> {
        let prices = prices.into();
        if prices.is_empty() {
            return Err(PriceSeriesError::Empty);
        }
        for (step, &value) in prices.iter().enumerate() {
            if !value.is_finite() {
                return Err(PriceSeriesError::NonFinite { step, value });
            }
            if value < 0.0 {
                return Err(PriceSeriesError::Negative { step, value });
            }
        }
        Ok(Self {
            prices: prices.into(),
        })
    }

    /// Number of timesteps (the simulation horizon).
    pub fn horizon(&self) -> usize {
        self.prices.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.prices
    }

    /// Generates a reproducible daily price curve.
    ///
    /// The curve is a sinusoid with one period per `steps_per_day`, peaking in
    /// the evening, plus seeded Gaussian noise. Prices are floored at zero.
    ///
    /// # Arguments
    ///
    /// * `steps` - Number of timesteps to generate (must be > 0)
    /// * `steps_per_day` - Period of the daily cycle (must be > 0)
    /// * `base` - Mean price
    /// * `amplitude` - Peak deviation from the mean
    /// * `noise_std` - Standard deviation of the additive noise
    /// * `seed` - Random seed
    ///
    /// # Errors
    ///
    /// Returns [`PriceSeriesError::Empty`] when `steps` is zero and
    /// [`PriceSeriesError::NonFinite`] if the parameters overflow.
    pub fn synthetic(
        steps: usize,
        steps_per_day: usize,
        base: f64,
        amplitude: f64,
        noise_std: f64,
        seed: u64,
    ) -> Result<Self, PriceSeriesError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let period = steps_per_day.max(1) as f64;
        let prices: Vec<f64> = (0..steps)
            .map(|t| {
                // Peak at 3/4 of the day.
                let phase = 2.0 * std::f64::consts::PI * (t as f64 / period - 0.5);
                let value = base + amplitude * phase.sin() + gaussian_noise(&mut rng, noise_std);
                value.max(0.0)
            })
            .collect();
        Self::new(prices)
    }
}

impl Deref for PriceSeries {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.prices
    }
}

/// Gaussian noise via the Box-Muller transform.
fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}
