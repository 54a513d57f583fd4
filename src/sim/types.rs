//! Core simulation types: configuration, observations, step records, and trajectories.

use std::fmt;

use serde::Serialize;

/// Battery and demand parameters for one simulation scenario.
///
/// The engine takes no global state: everything it needs beyond the price
/// series and the controller lives here.
///
/// # Examples
///
/// ```
/// use sdm_sim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(100.0, 50.0, 5.0);
/// assert_eq!(cfg.headroom(80.0), 20.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimConfig {
    /// Maximum state of charge (energy units, > 0).
    pub capacity: f64,
    /// State of charge the engine starts from and returns to on `reset()`.
    pub initial_soc: f64,
    /// Fixed demand served every step (energy units, >= 0).
    pub demand: f64,
}

impl SimConfig {
    /// Creates a new simulation configuration.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Battery capacity (must be finite and > 0)
    /// * `initial_soc` - Initial state of charge (must lie in `[0, capacity]`)
    /// * `demand` - Demand per step (must be finite and >= 0)
    ///
    /// # Panics
    ///
    /// Panics if any parameter is out of range. Scenario files are checked by
    /// [`crate::config::ScenarioConfig::validate`] before reaching this point.
    pub fn new(capacity: f64, initial_soc: f64, demand: f64) -> Self {
        assert!(
            capacity.is_finite() && capacity > 0.0,
            "capacity must be > 0"
        );
        assert!(
            (0.0..=capacity).contains(&initial_soc),
            "initial_soc must lie in [0, capacity]"
        );
        assert!(demand.is_finite() && demand >= 0.0, "demand must be >= 0");
        Self {
            capacity,
            initial_soc,
            demand,
        }
    }

    /// The reference scenario: capacity 100, half full, demand 5 per step.
    pub fn reference() -> Self {
        Self::new(100.0, 50.0, 5.0)
    }

    /// Room left for charging at the given state of charge.
    pub fn headroom(&self, state_of_charge: f64) -> f64 {
        (self.capacity - state_of_charge).max(0.0)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::reference()
    }
}

/// The observable state handed to a controller once per step.
///
/// Controllers never see the charge/discharge split of the previous step,
/// only the net energy imported from the market.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// State of charge before this step's action is applied.
    pub state_of_charge: f64,
    /// Market import realized on the previous step (0 on the first call of a run).
    pub imported_energy: f64,
    /// Price of the step being decided.
    pub market_price: f64,
    /// Running cost accumulated before this step.
    pub total_cost: f64,
}

/// Realized outcome of one timestep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepResult {
    /// Index into the price series.
    pub step: usize,
    /// Market price at this step.
    pub price: f64,
    /// State of charge after the realized action.
    pub state_of_charge_after: f64,
    /// Realized action (positive = net charge, negative = net discharge).
    pub net_action: f64,
    /// Energy bought from the market this step (>= 0).
    pub market_import: f64,
    /// `price * market_import`.
    pub cost_this_step: f64,
}

impl StepResult {
    /// Energy put into the battery this step.
    pub fn realized_charge(&self) -> f64 {
        self.net_action.max(0.0)
    }

    /// Energy taken out of the battery this step.
    pub fn realized_discharge(&self) -> f64 {
        (-self.net_action).max(0.0)
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>4} | price={:>8.3}  soc={:>7.2}  action={:>+7.2}  \
             import={:>6.2} | cost={:>9.3}",
            self.step,
            self.price,
            self.state_of_charge_after,
            self.net_action,
            self.market_import,
            self.cost_this_step,
        )
    }
}

/// Complete record of one simulation run.
///
/// Grows monotonically while the engine owns it and is handed to the caller
/// read-only once the run finishes. Serializes to the four-field record
/// shape consumed by the outer loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    steps: Vec<StepResult>,
    total_cost: f64,
}

impl Trajectory {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            steps: Vec::with_capacity(capacity),
            total_cost: 0.0,
        }
    }

    pub(crate) fn push(&mut self, result: StepResult) {
        self.total_cost += result.cost_this_step;
        self.steps.push(result);
    }

    /// Per-step records in execution order.
    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    /// Final cumulative cost.
    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Post-step state of charge for every step.
    pub fn battery_level_record(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.state_of_charge_after).collect()
    }

    /// Realized net action for every step.
    pub fn action_record(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.net_action).collect()
    }

    /// Cost of every step.
    pub fn cost_per_time_record(&self) -> Vec<f64> {
        self.steps.iter().map(|s| s.cost_this_step).collect()
    }

    /// Running total after each step.
    pub fn cumulative_cost_record(&self) -> Vec<f64> {
        self.steps
            .iter()
            .scan(0.0, |acc, s| {
                *acc += s.cost_this_step;
                Some(*acc)
            })
            .collect()
    }
}

/// The four-field record shape exchanged with the outer loop and reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryRecord {
    pub battery_level_record: Vec<f64>,
    pub action_record: Vec<f64>,
    pub cost_per_time_record: Vec<f64>,
    pub total_cost: f64,
}

impl From<&Trajectory> for TrajectoryRecord {
    fn from(t: &Trajectory) -> Self {
        Self {
            battery_level_record: t.battery_level_record(),
            action_record: t.action_record(),
            cost_per_time_record: t.cost_per_time_record(),
            total_cost: t.total_cost(),
        }
    }
}

impl Serialize for Trajectory {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TrajectoryRecord::from(self).serialize(serializer)
    }
}
