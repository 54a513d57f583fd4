//! API response and query types.

use serde::{Deserialize, Serialize};

use crate::meta::{AttemptState, MetaReport};
use crate::sim::kpi::KpiReport;
use crate::sim::types::{SimConfig, StepResult};

/// Combined state response: parameters, KPIs, and latest step.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub config: SimConfig,
    pub kpi: KpiReport,
    pub total_cost: f64,
    /// `null` when the served trajectory is empty.
    pub latest_step: Option<StepResult>,
}

/// One improvement-loop iteration, without its trajectory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationSummary {
    pub iteration: usize,
    pub state: AttemptState,
    pub policy: String,
    pub total_cost: f64,
    /// Relative saving over iteration 0.
    pub improvement: f64,
}

impl IterationSummary {
    /// Flattens a loop report, baseline first.
    pub fn from_report(report: &MetaReport) -> Vec<Self> {
        report
            .history
            .iter()
            .zip(report.improvements())
            .map(|(r, improvement)| Self {
                iteration: r.iteration,
                state: r.state,
                policy: r.policy.clone(),
                total_cost: r.total_cost(),
                improvement,
            })
            .collect()
    }
}

/// Optional range query parameters for the trajectory endpoint.
#[derive(Debug, Deserialize)]
pub struct TrajectoryQuery {
    /// First step (inclusive).
    pub from: Option<usize>,
    /// Last step (inclusive).
    pub to: Option<usize>,
}

/// Error response body for 400-class errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
