//! Policy-improvement loop.
//!
//! An author proposes a policy, the engine runs it over the configured
//! range, and the result joins the history the author sees next time.
//! Iteration 0 is always the idle baseline. A policy that fails to compile
//! or to run gets exactly one correction; a second failure ends the loop.

use std::fmt;
use std::fmt::Write as _;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::CandidateConfig;
use crate::policy;
use crate::sim::controller::{Controller, IdleController};
use crate::sim::engine::Engine;
use crate::sim::error::SimError;
use crate::sim::types::Trajectory;

/// Policy text recorded for iteration 0, which runs [`IdleController`].
pub const BASELINE_POLICY: &str = "0";

/// Error type a policy author may fail with.
pub type AuthorError = Box<dyn std::error::Error + Send + Sync>;

/// Source of new policies.
///
/// Implementations might call out to a text-generation service; the crate
/// ships [`ScriptedAuthor`], which replays a fixed list.
pub trait PolicyAuthor {
    /// Summarizes past results into a task for the next policy.
    ///
    /// # Errors
    ///
    /// Any error aborts the loop with [`MetaError::Author`].
    fn describe_task(
        &mut self,
        history: &[IterationRecord],
        current_policy: &str,
    ) -> Result<String, AuthorError>;

    /// Writes a policy for the given task.
    ///
    /// # Errors
    ///
    /// Any error aborts the loop with [`MetaError::Author`].
    fn write_policy(&mut self, task: &str) -> Result<String, AuthorError>;

    /// Repairs a policy that failed with `error`.
    ///
    /// # Errors
    ///
    /// Any error aborts the loop with [`MetaError::Author`].
    fn correct_policy(&mut self, failed_policy: &str, error: &str) -> Result<String, AuthorError>;
}

/// Where an iteration's policy ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    /// Written by the author and ran cleanly.
    Generated,
    /// Failed to compile or run; awaiting correction.
    Failed,
    /// Repaired after one failure and ran cleanly.
    Corrected,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Generated => "generated",
            Self::Failed => "failed",
            Self::Corrected => "corrected",
        })
    }
}

/// One completed iteration.
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub state: AttemptState,
    /// Policy that produced `trajectory`.
    pub policy: String,
    /// Error from the first attempt, for corrected iterations.
    pub first_failure: Option<String>,
    pub trajectory: Trajectory,
}

impl IterationRecord {
    pub fn total_cost(&self) -> f64 {
        self.trajectory.total_cost()
    }
}

#[derive(Debug, Error)]
pub enum MetaError {
    /// The engine rejected the run itself, independent of the policy.
    #[error("iteration {iteration}: {source}")]
    Simulation {
        iteration: usize,
        #[source]
        source: SimError,
    },
    #[error("iteration {iteration}: policy author failed: {source}")]
    Author {
        iteration: usize,
        #[source]
        source: AuthorError,
    },
    #[error(
        "iteration {iteration}: corrected policy failed ({second}) after the original failed ({first})"
    )]
    CorrectionFailed {
        iteration: usize,
        first: String,
        second: String,
    },
}

enum AttemptError {
    /// The policy is at fault and may be corrected.
    Rejected(String),
    Fatal(SimError),
}

/// Runs `controller` from a freshly reset engine.
fn run_from_reset<C: Controller + ?Sized>(
    engine: &mut Engine,
    controller: &mut C,
    start: usize,
    end: usize,
) -> Result<Trajectory, SimError> {
    engine.reset();
    engine.run(controller, start, end)
}

/// Compiles and runs one policy.
fn attempt(
    engine: &mut Engine,
    source: &str,
    start: usize,
    end: usize,
) -> Result<Trajectory, AttemptError> {
    let mut controller =
        policy::compile(source).map_err(|e| AttemptError::Rejected(e.to_string()))?;
    run_from_reset(engine, &mut controller, start, end)
        .map_err(|e| match e {
            e if e.is_controller_failure() => AttemptError::Rejected(e.to_string()),
            e => AttemptError::Fatal(e),
        })
}

/// Runs the baseline plus `iterations` author rounds over `start..=end`.
///
/// The engine is reset before every attempt, so all iterations start from
/// the same state of charge.
///
/// # Errors
///
/// * [`MetaError::CorrectionFailed`] when a corrected policy fails again.
/// * [`MetaError::Author`] when the author cannot produce a policy.
/// * [`MetaError::Simulation`] when the range does not fit the prices.
pub fn run_meta_loop<A: PolicyAuthor + ?Sized>(
    engine: &mut Engine,
    author: &mut A,
    iterations: usize,
    start: usize,
    end: usize,
) -> Result<MetaReport, MetaError> {
    let mut history: Vec<IterationRecord> = Vec::with_capacity(iterations + 1);

    let baseline = run_from_reset(engine, &mut IdleController, start, end)
        .map_err(|source| MetaError::Simulation {
            iteration: 0,
            source,
        })?;
    info!(iteration = 0, total_cost = baseline.total_cost(), "baseline evaluated");
    history.push(IterationRecord {
        iteration: 0,
        state: AttemptState::Generated,
        policy: BASELINE_POLICY.to_string(),
        first_failure: None,
        trajectory: baseline,
    });

    for iteration in 1..=iterations {
        let author_err = |source| MetaError::Author { iteration, source };
        let fatal = |source| MetaError::Simulation { iteration, source };

        let current = history.last().map_or(BASELINE_POLICY, |h| h.policy.as_str());
        let task = author.describe_task(&history, current).map_err(author_err)?;
        let mut policy = author.write_policy(&task).map_err(author_err)?;
        let mut state = AttemptState::Generated;
        let mut first_failure = None;

        let trajectory = match attempt(engine, &policy, start, end) {
            Ok(t) => t,
            Err(AttemptError::Fatal(e)) => return Err(fatal(e)),
            Err(AttemptError::Rejected(first)) => {
                state = AttemptState::Failed;
                warn!(iteration, %state, error = %first, "policy failed, requesting correction");

                policy = author.correct_policy(&policy, &first).map_err(author_err)?;
                state = AttemptState::Corrected;
                match attempt(engine, &policy, start, end) {
                    Ok(t) => {
                        first_failure = Some(first);
                        t
                    }
                    Err(AttemptError::Fatal(e)) => return Err(fatal(e)),
                    Err(AttemptError::Rejected(second)) => {
                        warn!(iteration, error = %second, "corrected policy failed");
                        return Err(MetaError::CorrectionFailed {
                            iteration,
                            first,
                            second,
                        });
                    }
                }
            }
        };

        info!(
            iteration,
            %state,
            total_cost = trajectory.total_cost(),
            "iteration evaluated"
        );
        history.push(IterationRecord {
            iteration,
            state,
            policy,
            first_failure,
            trajectory,
        });
    }

    Ok(MetaReport { history })
}

/// History of a completed loop with cost comparisons against the baseline.
#[derive(Debug, Clone, Serialize)]
pub struct MetaReport {
    pub history: Vec<IterationRecord>,
}

impl MetaReport {
    /// Total cost per iteration, baseline first.
    pub fn costs(&self) -> Vec<f64> {
        self.history.iter().map(IterationRecord::total_cost).collect()
    }

    /// Relative saving of each iteration over the baseline, `(c0 - ci) / c0`.
    ///
    /// All zeros when the baseline cost is zero.
    pub fn improvements(&self) -> Vec<f64> {
        let costs = self.costs();
        let c0 = costs.first().copied().unwrap_or(0.0);
        costs
            .iter()
            .map(|&ci| if c0 == 0.0 { 0.0 } else { (c0 - ci) / c0 })
            .collect()
    }

    /// Iteration with the lowest total cost; the earliest wins ties.
    pub fn best_iteration(&self) -> Option<&IterationRecord> {
        self.history
            .iter()
            .reduce(|best, r| if r.total_cost() < best.total_cost() { r } else { best })
    }
}

impl fmt::Display for MetaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Meta Loop Report ---")?;
        for (record, improvement) in self.history.iter().zip(self.improvements()) {
            writeln!(
                f,
                "Iteration {:>3}: cost={:>12.4} improvement={:>7.2}% [{}]",
                record.iteration,
                record.total_cost(),
                improvement * 100.0,
                record.state
            )?;
        }
        match self.best_iteration() {
            Some(best) => write!(
                f,
                "Best iteration:  {} (cost {:.4})",
                best.iteration,
                best.total_cost()
            ),
            None => write!(f, "Best iteration:  none"),
        }
    }
}

/// Replays candidates from configuration, one per iteration.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAuthor {
    candidates: Vec<CandidateConfig>,
    next: usize,
    pending_correction: Option<String>,
    tasks: Vec<String>,
}

impl ScriptedAuthor {
    pub fn new(candidates: Vec<CandidateConfig>) -> Self {
        Self {
            candidates,
            ..Self::default()
        }
    }

    /// Every task description produced so far.
    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }
}

impl PolicyAuthor for ScriptedAuthor {
    fn describe_task(
        &mut self,
        history: &[IterationRecord],
        current_policy: &str,
    ) -> Result<String, AuthorError> {
        let mut task = String::from(
            "Minimise total energy cost. Return one policy expression giving the \
             requested action (positive charges, negative discharges).\n",
        );
        writeln!(task, "Current policy:\n{current_policy}")?;
        writeln!(task, "Total cost by iteration:")?;
        for h in history {
            writeln!(task, "  {}: {:.4} [{}]", h.iteration, h.total_cost(), h.state)?;
        }
        if let Some(last) = history.last() {
            writeln!(task, "Last battery levels: {:?}", last.trajectory.battery_level_record())?;
            writeln!(task, "Last actions: {:?}", last.trajectory.action_record())?;
        }
        self.tasks.push(task.clone());
        Ok(task)
    }

    fn write_policy(&mut self, _task: &str) -> Result<String, AuthorError> {
        let candidate = self
            .candidates
            .get(self.next)
            .ok_or_else(|| format!("no scripted candidate left after {}", self.next))?;
        self.next += 1;
        self.pending_correction = candidate.correction.clone();
        Ok(candidate.policy.clone())
    }

    fn correct_policy(&mut self, _failed_policy: &str, error: &str) -> Result<String, AuthorError> {
        self.pending_correction
            .take()
            .ok_or_else(|| format!("no scripted correction for: {error}").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::price::PriceSeries;
    use crate::sim::types::SimConfig;

    fn engine() -> Engine {
        Engine::new(
            SimConfig::reference(),
            PriceSeries::new(vec![1.0, 1.0, 4.0, 4.0]).unwrap(),
        )
    }

    fn author(candidates: &[(&str, Option<&str>)]) -> ScriptedAuthor {
        ScriptedAuthor::new(
            candidates
                .iter()
                .map(|(p, c)| CandidateConfig {
                    policy: p.to_string(),
                    correction: c.map(str::to_string),
                })
                .collect(),
        )
    }

    #[test]
    fn baseline_then_generated() {
        let mut e = engine();
        let mut a = author(&[("if price < 2 then 10 else -5", None)]);
        let report = run_meta_loop(&mut e, &mut a, 1, 0, 3).unwrap();

        assert_eq!(report.history.len(), 2);
        assert_eq!(report.history[0].policy, BASELINE_POLICY);
        // baseline: 5 + 5 + 20 + 20
        assert_eq!(report.costs()[0], 50.0);
        // charge 10 twice at price 1, then cover demand from the battery
        assert_eq!(report.costs()[1], 30.0);
        assert_eq!(report.history[1].state, AttemptState::Generated);
        assert!((report.improvements()[1] - 0.4).abs() < 1e-12);
        assert_eq!(report.best_iteration().map(|r| r.iteration), Some(1));
    }

    #[test]
    fn failing_policy_is_corrected_once() {
        let mut e = engine();
        let mut a = author(&[("1 / cost", Some("0"))]);
        let report = run_meta_loop(&mut e, &mut a, 1, 0, 3).unwrap();

        let r = &report.history[1];
        assert_eq!(r.state, AttemptState::Corrected);
        assert_eq!(r.policy, "0");
        assert!(r.first_failure.as_deref().is_some_and(|m| m.contains("division by zero")));
    }

    #[test]
    fn compile_error_goes_through_correction() {
        let mut e = engine();
        let mut a = author(&[("price +", Some("-5"))]);
        let report = run_meta_loop(&mut e, &mut a, 1, 0, 3).unwrap();
        assert_eq!(report.history[1].state, AttemptState::Corrected);
    }

    #[test]
    fn second_failure_is_fatal() {
        let mut e = engine();
        let mut a = author(&[("bogus", Some("1 / cost"))]);
        let err = run_meta_loop(&mut e, &mut a, 1, 0, 3).unwrap_err();
        match err {
            MetaError::CorrectionFailed {
                iteration,
                first,
                second,
            } => {
                assert_eq!(iteration, 1);
                assert!(first.contains("unknown variable"));
                assert!(second.contains("division by zero"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_correction_is_an_author_error() {
        let mut e = engine();
        let mut a = author(&[("bogus", None)]);
        let err = run_meta_loop(&mut e, &mut a, 1, 0, 3).unwrap_err();
        assert!(matches!(err, MetaError::Author { iteration: 1, .. }));
    }

    #[test]
    fn invalid_range_is_reported_at_baseline() {
        let mut e = engine();
        let mut a = author(&[]);
        let err = run_meta_loop(&mut e, &mut a, 0, 0, 9).unwrap_err();
        assert!(matches!(err, MetaError::Simulation { iteration: 0, .. }));
    }

    #[test]
    fn recorded_baseline_policy_reproduces_baseline() {
        let mut e = engine();
        let report = run_meta_loop(&mut e, &mut author(&[]), 0, 0, 3).unwrap();
        let mut idle = policy::compile(BASELINE_POLICY).unwrap();
        e.reset();
        let replay = e.run(&mut idle, 0, 3).unwrap();
        assert_eq!(replay, report.history[0].trajectory);
    }

    #[test]
    fn overly_nested_policy_is_corrected() {
        let nested = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        let mut e = engine();
        let mut a = author(&[(nested.as_str(), Some("0"))]);
        let report = run_meta_loop(&mut e, &mut a, 1, 0, 3).unwrap();

        let r = &report.history[1];
        assert_eq!(r.state, AttemptState::Corrected);
        assert!(r.first_failure.as_deref().is_some_and(|m| m.contains("nested too deeply")));
    }

    #[test]
    fn every_iteration_starts_from_initial_soc() {
        let mut e = engine();
        let mut a = author(&[("-5", None), ("-5", None)]);
        let report = run_meta_loop(&mut e, &mut a, 2, 0, 3).unwrap();
        assert_eq!(report.costs()[1], report.costs()[2]);
        assert_eq!(report.history[2].trajectory.battery_level_record()[0], 45.0);
    }

    #[test]
    fn task_lists_history() {
        let mut e = engine();
        let mut a = author(&[("0", None), ("0", None)]);
        run_meta_loop(&mut e, &mut a, 2, 0, 3).unwrap();
        assert_eq!(a.tasks().len(), 2);
        assert!(a.tasks()[1].contains("  1: 50.0000 [generated]"));
    }

    #[test]
    fn zero_baseline_cost_means_zero_improvement() {
        let mut e = Engine::new(
            SimConfig::new(100.0, 50.0, 0.0),
            PriceSeries::new(vec![1.0, 2.0]).unwrap(),
        );
        let mut a = author(&[("-5", None)]);
        let report = run_meta_loop(&mut e, &mut a, 1, 0, 1).unwrap();
        assert_eq!(report.improvements(), vec![0.0, 0.0]);
    }

    #[test]
    fn report_display() {
        let mut e = engine();
        let mut a = author(&[("0", None)]);
        let text = run_meta_loop(&mut e, &mut a, 1, 0, 3).unwrap().to_string();
        assert!(text.contains("Iteration   0: cost="));
        assert!(text.contains("Best iteration:  0"));
    }
}
