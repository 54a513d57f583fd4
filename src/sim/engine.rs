//! Simulation engine: a forward sweep over the price series.

use tracing::{debug, warn};

use super::battery::Battery;
use super::controller::Controller;
use super::error::SimError;
use super::price::PriceSeries;
use super::types::{Observation, SimConfig, StepResult, Trajectory};

/// Clamp corrections below this are rounding, not a feasibility bug.
const CLAMP_TOLERANCE: f64 = 1e-9;

/// Simulation engine owning the battery state and a shared price series.
///
/// One engine serves one run at a time. Independent engines may share the
/// same [`PriceSeries`].
#[derive(Debug, Clone)]
pub struct Engine {
    config: SimConfig,
    prices: PriceSeries,
    battery: Battery,
}

impl Engine {
    /// Creates an engine at the configured initial state of charge.
    pub fn new(config: SimConfig, prices: PriceSeries) -> Self {
        let battery = Battery::new(config.capacity, config.initial_soc);
        Self {
            config,
            prices,
            battery,
        }
    }

    /// Returns the battery to its initial state of charge. Prices are kept.
    pub fn reset(&mut self) {
        self.battery.state_of_charge = self.config.initial_soc;
    }

    /// Current state of charge.
    pub fn state_of_charge(&self) -> f64 {
        self.battery.state_of_charge
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn prices(&self) -> &PriceSeries {
        &self.prices
    }

    /// Runs the controller over the whole price series.
    ///
    /// # Errors
    ///
    /// See [`Engine::run`].
    pub fn run_all<C: Controller + ?Sized>(
        &mut self,
        controller: &mut C,
    ) -> Result<Trajectory, SimError> {
        self.run(controller, 0, self.prices.horizon() - 1)
    }

    /// Runs the controller over steps `start..=end` of the price series.
    ///
    /// The run starts from the engine's current state of charge with a zero
    /// running cost. The battery state is committed back to the engine only
    /// when every step succeeds, so a failed run leaves the engine untouched.
    ///
    /// # Errors
    ///
    /// * [`SimError::InvalidRange`] before any step if the range is empty or
    ///   outside the series.
    /// * [`SimError::Controller`] / [`SimError::NonFiniteAction`] when the
    ///   controller fails; the error is not retried.
    pub fn run<C: Controller + ?Sized>(
        &mut self,
        controller: &mut C,
        start: usize,
        end: usize,
    ) -> Result<Trajectory, SimError> {
        let horizon = self.prices.horizon();
        if start > end || end >= horizon {
            return Err(SimError::InvalidRange {
                start,
                end,
                horizon,
            });
        }

        debug!(
            start,
            end,
            soc = self.battery.state_of_charge,
            "simulation run started"
        );

        let mut battery = self.battery.clone();
        let mut trajectory = Trajectory::with_capacity(end - start + 1);
        let mut imported_energy = 0.0;

        for step in start..=end {
            let observation = Observation {
                state_of_charge: battery.state_of_charge,
                imported_energy,
                market_price: self.prices[step],
                total_cost: trajectory.total_cost(),
            };
            let result = self.step(&mut battery, controller, step, &observation)?;
            imported_energy = result.market_import;
            trajectory.push(result);
        }

        self.battery = battery;
        debug!(
            steps = trajectory.len(),
            total_cost = trajectory.total_cost(),
            soc = self.battery.state_of_charge,
            "simulation run finished"
        );
        Ok(trajectory)
    }

    /// Executes one step against a working copy of the battery.
    fn step<C: Controller + ?Sized>(
        &self,
        battery: &mut Battery,
        controller: &mut C,
        step: usize,
        observation: &Observation,
    ) -> Result<StepResult, SimError> {
        let demand = self.config.demand;
        let price = observation.market_price;

        // 1. Controller request
        let action = controller
            .take_action(observation)
            .map_err(|source| SimError::Controller { step, source })?;
        if !action.is_finite() {
            return Err(SimError::NonFiniteAction { step, action });
        }

        // 2. Clip to what the battery can do
        let dispatch = battery.clip(action, demand);
        let market_import = dispatch.market_import(demand);

        // 3. Update state of charge
        let correction = battery.apply(dispatch);
        if correction > CLAMP_TOLERANCE {
            warn!(
                step,
                action, correction, "state of charge clamp bound after clipping"
            );
        }

        // 4. Cost and record
        Ok(StepResult {
            step,
            price,
            state_of_charge_after: battery.state_of_charge,
            net_action: dispatch.net(),
            market_import,
            cost_this_step: price * market_import,
        })
    }
}
