//! Post-hoc KPI computation from a trajectory.

use std::fmt;

use serde::Serialize;

use super::types::Trajectory;

/// Aggregate indicators derived from one simulation run.
///
/// Computed from the trajectory records rather than tracked during the run,
/// so reported numbers always agree with the step data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiReport {
    /// Number of simulated steps.
    pub steps: usize,
    /// Final cumulative cost.
    pub total_cost: f64,
    /// Total energy bought from the market.
    pub energy_imported: f64,
    /// `total_cost / energy_imported` (0 when nothing was imported).
    pub average_price_paid: f64,
    /// Sum of realized charge and discharge.
    pub battery_throughput: f64,
    /// Throughput over twice the capacity.
    pub equivalent_full_cycles: f64,
    /// Lowest post-step state of charge.
    pub min_state_of_charge: f64,
    /// Highest post-step state of charge.
    pub max_state_of_charge: f64,
    /// Steps with a net charge.
    pub charging_steps: usize,
    /// Steps with a net discharge.
    pub discharging_steps: usize,
}

impl KpiReport {
    /// Computes all KPIs from a completed trajectory.
    ///
    /// # Arguments
    ///
    /// * `trajectory` - Completed simulation run
    /// * `capacity` - Battery capacity for the cycle calculation
    pub fn from_trajectory(trajectory: &Trajectory, capacity: f64) -> Self {
        if trajectory.is_empty() {
            return Self::default();
        }

        let mut energy_imported = 0.0_f64;
        let mut throughput = 0.0_f64;
        let mut min_soc = f64::INFINITY;
        let mut max_soc = f64::NEG_INFINITY;
        let mut charging_steps = 0_usize;
        let mut discharging_steps = 0_usize;

        for s in trajectory.steps() {
            energy_imported += s.market_import;
            throughput += s.net_action.abs();
            min_soc = min_soc.min(s.state_of_charge_after);
            max_soc = max_soc.max(s.state_of_charge_after);
            if s.net_action > 0.0 {
                charging_steps += 1;
            } else if s.net_action < 0.0 {
                discharging_steps += 1;
            }
        }

        let total_cost = trajectory.total_cost();
        let average_price_paid = if energy_imported > 0.0 {
            total_cost / energy_imported
        } else {
            0.0
        };
        let equivalent_full_cycles = if capacity > 0.0 {
            throughput / (2.0 * capacity)
        } else {
            0.0
        };

        Self {
            steps: trajectory.len(),
            total_cost,
            energy_imported,
            average_price_paid,
            battery_throughput: throughput,
            equivalent_full_cycles,
            min_state_of_charge: min_soc,
            max_state_of_charge: max_soc,
            charging_steps,
            discharging_steps,
        }
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "Steps simulated:       {}", self.steps)?;
        writeln!(f, "Total cost:            {:.4}", self.total_cost)?;
        writeln!(f, "Energy imported:       {:.3}", self.energy_imported)?;
        writeln!(f, "Average price paid:    {:.4}", self.average_price_paid)?;
        writeln!(
            f,
            "Battery throughput:    {:.3} ({:.2} equiv. cycles)",
            self.battery_throughput, self.equivalent_full_cycles
        )?;
        writeln!(
            f,
            "State of charge range: {:.2} .. {:.2}",
            self.min_state_of_charge, self.max_state_of_charge
        )?;
        write!(
            f,
            "Charge/discharge steps: {}/{}",
            self.charging_steps, self.discharging_steps
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::controller::{ConstantController, IdleController};
    use crate::sim::engine::Engine;
    use crate::sim::price::PriceSeries;
    use crate::sim::types::SimConfig;

    fn run(prices: &[f64], action: f64) -> Trajectory {
        let mut engine = Engine::new(
            SimConfig::reference(),
            PriceSeries::new(prices.to_vec()).unwrap(),
        );
        engine.run_all(&mut ConstantController(action)).unwrap()
    }

    #[test]
    fn idle_run_has_no_throughput() {
        let mut engine = Engine::new(
            SimConfig::reference(),
            PriceSeries::new(vec![2.0; 4]).unwrap(),
        );
        let t = engine.run_all(&mut IdleController).unwrap();
        let kpi = KpiReport::from_trajectory(&t, 100.0);
        assert_eq!(kpi.battery_throughput, 0.0);
        assert_eq!(kpi.energy_imported, 20.0);
        assert_eq!(kpi.average_price_paid, 2.0);
        assert_eq!(kpi.charging_steps + kpi.discharging_steps, 0);
    }

    #[test]
    fn discharge_run_counts_cycles() {
        let t = run(&[1.0; 4], -5.0);
        let kpi = KpiReport::from_trajectory(&t, 100.0);
        assert_eq!(kpi.battery_throughput, 20.0);
        assert!((kpi.equivalent_full_cycles - 0.1).abs() < 1e-12);
        assert_eq!(kpi.min_state_of_charge, 30.0);
        assert_eq!(kpi.max_state_of_charge, 45.0);
        assert_eq!(kpi.discharging_steps, 4);
        assert_eq!(kpi.average_price_paid, 0.0);
    }

    #[test]
    fn empty_trajectory() {
        let kpi = KpiReport::from_trajectory(&Trajectory::default(), 100.0);
        assert_eq!(kpi, KpiReport::default());
    }

    #[test]
    fn display_has_total_cost_line() {
        let t = run(&[1.0, 1.0, 1.0], 0.0);
        let text = KpiReport::from_trajectory(&t, 100.0).to_string();
        assert!(text.contains("Total cost:            15.0000"));
    }
}
