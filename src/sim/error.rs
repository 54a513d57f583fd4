//! Errors surfaced by a simulation run.

use thiserror::Error;

use super::controller::ControllerError;

/// Why a run produced no trajectory.
///
/// Action clipping is not an error and never appears here.
#[derive(Debug, Error)]
pub enum SimError {
    /// The requested step range does not fit the loaded price series.
    #[error("invalid step range {start}..={end} for a price series of {horizon} steps")]
    InvalidRange {
        start: usize,
        end: usize,
        horizon: usize,
    },
    /// The controller itself failed.
    #[error("controller failed at step {step}: {source}")]
    Controller {
        step: usize,
        #[source]
        source: ControllerError,
    },
    /// The controller returned NaN or an infinity.
    #[error("controller returned a non-finite action ({action}) at step {step}")]
    NonFiniteAction { step: usize, action: f64 },
}

impl SimError {
    /// True when the failure originates in the controller rather than the input.
    pub fn is_controller_failure(&self) -> bool {
        matches!(self, Self::Controller { .. } | Self::NonFiniteAction { .. })
    }
}
