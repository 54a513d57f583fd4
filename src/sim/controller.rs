//! Controller capability and the built-in reference controllers.

use super::types::Observation;

/// Error type a controller may fail with. The engine never inspects it.
pub type ControllerError = Box<dyn std::error::Error + Send + Sync>;

/// Anything that can turn the observable state into a requested action.
///
/// Called exactly once per timestep. Positive actions request charging,
/// negative actions request discharging; the engine clips whatever comes
/// back to what the battery can physically do. Controllers may keep private
/// state across calls.
pub trait Controller {
    /// Returns the requested action for the step described by `observation`.
    ///
    /// # Errors
    ///
    /// Any error aborts the run and is propagated unchanged to the caller.
    fn take_action(&mut self, observation: &Observation) -> Result<f64, ControllerError>;
}

/// Closure controllers, handy for one-off policies and tests.
impl<F> Controller for F
where
    F: FnMut(&Observation) -> Result<f64, ControllerError>,
{
    fn take_action(&mut self, observation: &Observation) -> Result<f64, ControllerError> {
        self(observation)
    }
}

/// Never touches the battery; all demand is bought from the market.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleController;

impl Controller for IdleController {
    fn take_action(&mut self, _observation: &Observation) -> Result<f64, ControllerError> {
        Ok(0.0)
    }
}

/// Requests the same action every step.
#[derive(Debug, Clone, Copy)]
pub struct ConstantController(pub f64);

impl Controller for ConstantController {
    fn take_action(&mut self, _observation: &Observation) -> Result<f64, ControllerError> {
        Ok(self.0)
    }
}

/// Price-band arbitrage: charge when cheap, discharge when expensive.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdController {
    /// Charge at `charge_rate` while the price is strictly below this.
    pub charge_below: f64,
    /// Discharge at `discharge_rate` while the price is strictly above this.
    pub discharge_above: f64,
    /// Requested charge per step (positive magnitude).
    pub charge_rate: f64,
    /// Requested discharge per step (positive magnitude).
    pub discharge_rate: f64,
}

impl ThresholdController {
    /// Action for a given price, ignoring the rest of the state.
    pub fn action_at_price(&self, price: f64) -> f64 {
        if price < self.charge_below {
            self.charge_rate
        } else if price > self.discharge_above {
            -self.discharge_rate
        } else {
            0.0
        }
    }
}

impl Controller for ThresholdController {
    fn take_action(&mut self, observation: &Observation) -> Result<f64, ControllerError> {
        Ok(self.action_at_price(observation.market_price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(price: f64) -> Observation {
        Observation {
            state_of_charge: 50.0,
            imported_energy: 0.0,
            market_price: price,
            total_cost: 0.0,
        }
    }

    #[test]
    fn idle_always_returns_zero() {
        let mut c = IdleController;
        assert_eq!(c.take_action(&obs(3.0)).ok(), Some(0.0));
    }

    #[test]
    fn threshold_charges_when_cheap() {
        let c = ThresholdController {
            charge_below: 2.0,
            discharge_above: 5.0,
            charge_rate: 10.0,
            discharge_rate: 5.0,
        };
        assert_eq!(c.action_at_price(1.0), 10.0);
    }

    #[test]
    fn threshold_discharges_when_expensive() {
        let c = ThresholdController {
            charge_below: 2.0,
            discharge_above: 5.0,
            charge_rate: 10.0,
            discharge_rate: 5.0,
        };
        assert_eq!(c.action_at_price(6.0), -5.0);
        assert_eq!(c.action_at_price(3.5), 0.0);
    }

    #[test]
    fn closures_can_keep_state() {
        let mut calls = 0;
        let mut c = |_: &Observation| -> Result<f64, ControllerError> {
            calls += 1;
            Ok(f64::from(calls))
        };
        assert_eq!(c.take_action(&obs(1.0)).ok(), Some(1.0));
        assert_eq!(c.take_action(&obs(1.0)).ok(), Some(2.0));
    }

    #[test]
    fn trait_objects_dispatch() {
        let mut c: Box<dyn Controller> = Box::new(ConstantController(-7.0));
        assert_eq!(c.take_action(&obs(1.0)).ok(), Some(-7.0));
    }
}
