//! Battery feasibility policy: turns a requested action into a realized one.

/// Energy actually moved by the battery in one step.
///
/// At most one of the two fields is non-zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Dispatch {
    /// Energy stored this step (>= 0).
    pub charge: f64,
    /// Energy released this step to serve demand (>= 0).
    pub discharge: f64,
}

impl Dispatch {
    /// Signed realized action (positive = charge).
    pub fn net(&self) -> f64 {
        self.charge - self.discharge
    }

    /// Market import needed to serve `demand` with this dispatch.
    ///
    /// Non-negative whenever the discharge was clipped to the demand.
    pub fn market_import(&self, demand: f64) -> f64 {
        demand - self.discharge + self.charge
    }
}

/// A lossless battery bounded by `[0, capacity]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Battery {
    /// Maximum state of charge.
    pub capacity: f64,
    /// Current stored energy.
    pub state_of_charge: f64,
}

impl Battery {
    /// Creates a battery at the given state of charge.
    ///
    /// # Panics
    ///
    /// Panics if the capacity is not positive or the state of charge is outside `[0, capacity]`.
    pub fn new(capacity: f64, state_of_charge: f64) -> Self {
        assert!(capacity > 0.0);
        assert!((0.0..=capacity).contains(&state_of_charge));
        Self {
            capacity,
            state_of_charge,
        }
    }

    /// Clips a requested action against the battery and the demand.
    ///
    /// Charge requests are limited to the remaining headroom. Anything else
    /// (discharge or no-op) is limited to both the stored energy and the
    /// demand, since discharged energy only offsets demand and is never sold.
    /// Infeasible requests are silently truncated, never rejected.
    pub fn clip(&self, action: f64, demand: f64) -> Dispatch {
        if action > 0.0 {
            Dispatch {
                charge: action.min(self.capacity - self.state_of_charge),
                discharge: 0.0,
            }
        } else {
            Dispatch {
                charge: 0.0,
                discharge: (-action).min(self.state_of_charge).min(demand),
            }
        }
    }

    /// Applies a clipped dispatch and returns how far the final clamp had to move
    /// the state of charge.
    ///
    /// The clamp only binds through rounding; a large correction means the
    /// dispatch did not come from [`Battery::clip`].
    pub fn apply(&mut self, dispatch: Dispatch) -> f64 {
        let unclamped = self.state_of_charge - dispatch.discharge + dispatch.charge;
        self.state_of_charge = unclamped.clamp(0.0, self.capacity);
        (self.state_of_charge - unclamped).abs()
    }
}
