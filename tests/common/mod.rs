//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use approx::assert_abs_diff_eq;

use sdm_sim::sim::engine::Engine;
use sdm_sim::sim::price::PriceSeries;
use sdm_sim::sim::types::{SimConfig, Trajectory};

/// Reference battery (capacity 100, soc 50, demand 5) over the given prices.
pub fn reference_engine(prices: &[f64]) -> Engine {
    Engine::new(
        SimConfig::reference(),
        PriceSeries::new(prices.to_vec()).expect("test prices should be valid"),
    )
}

/// Two reproducible synthetic days.
pub fn synthetic_prices() -> PriceSeries {
    PriceSeries::synthetic(48, 24, 3.0, 1.5, 0.3, 7).expect("synthetic prices should be valid")
}

/// Checks bounds, conservation, and cost accounting for every step.
///
/// `initial_soc` is the state of charge the run started from.
pub fn assert_physical_invariants(t: &Trajectory, config: &SimConfig, initial_soc: f64) {
    let mut soc = initial_soc;
    let mut total = 0.0;
    for s in t.steps() {
        assert!(
            (0.0..=config.capacity).contains(&s.state_of_charge_after),
            "soc out of bounds at step {}: {}",
            s.step,
            s.state_of_charge_after
        );
        assert_abs_diff_eq!(s.state_of_charge_after - soc, s.net_action, epsilon = 1e-9);
        assert_abs_diff_eq!(s.market_import, config.demand + s.net_action, epsilon = 1e-9);
        assert!(s.market_import >= -1e-12, "negative import at step {}", s.step);
        assert!(
            -s.net_action <= config.demand + 1e-12,
            "discharge above demand at step {}",
            s.step
        );
        assert_abs_diff_eq!(s.cost_this_step, s.price * s.market_import, epsilon = 1e-9);
        soc = s.state_of_charge_after;
        total += s.cost_this_step;
    }
    assert_abs_diff_eq!(t.total_cost(), total, epsilon = 1e-9);
}
