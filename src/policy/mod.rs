//! Runtime-loaded controllers written in a small expression language.
//!
//! A policy is a single expression evaluated once per step. It reads the
//! observation (`soc`, `imported`, `price`, `cost`) and a few running
//! statistics the compiled controller keeps for itself (`step`,
//! `avg_price`, `min_price`, `max_price`), and returns the requested
//! action.
//!
//! ```text
//! # buy cheap, sell dear
//! if price < avg_price then min(10, 100 - soc)
//! else if price > avg_price then -5
//! else 0
//! ```

pub mod expr;

use thiserror::Error;

use crate::sim::controller::{Controller, ControllerError};
use crate::sim::types::Observation;

use expr::{Env, Expr};

/// Problems found while compiling policy source.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PolicyError {
    #[error("syntax error at byte {pos}: {message}")]
    Syntax { pos: usize, message: String },
    #[error("unknown variable `{name}` at byte {pos}")]
    UnknownVariable { name: String, pos: usize },
    #[error("unknown function `{name}` at byte {pos}")]
    UnknownFunction { name: String, pos: usize },
    #[error("`{name}` takes {expected} argument(s) but got {found} (byte {pos})")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
        pos: usize,
    },
    #[error("policy contains no expression")]
    Empty,
}

/// Failures while evaluating a compiled policy.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,
}

/// A compiled policy together with its private running statistics.
///
/// Cloning yields an independent controller that shares nothing with the
/// original except the parsed expression.
#[derive(Debug, Clone)]
pub struct PolicyController {
    source: String,
    expr: Expr,
    calls: usize,
    price_sum: f64,
    min_price: f64,
    max_price: f64,
}

impl PolicyController {
    /// Source text the controller was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of actions requested so far.
    pub fn calls(&self) -> usize {
        self.calls
    }

    fn observe(&mut self, observation: &Observation) -> Env {
        let price = observation.market_price;
        let step = self.calls;
        self.calls += 1;
        self.price_sum += price;
        self.min_price = self.min_price.min(price);
        self.max_price = self.max_price.max(price);

        Env {
            soc: observation.state_of_charge,
            imported: observation.imported_energy,
            price,
            cost: observation.total_cost,
            step: step as f64,
            avg_price: self.price_sum / self.calls as f64,
            min_price: self.min_price,
            max_price: self.max_price,
        }
    }
}

impl Controller for PolicyController {
    fn take_action(&mut self, observation: &Observation) -> Result<f64, ControllerError> {
        let env = self.observe(observation);
        Ok(self.expr.eval(&env)?)
    }
}

/// Compiles policy source into a fresh controller.
///
/// # Errors
///
/// Returns a [`PolicyError`] with the byte position of the first problem.
pub fn compile(source: &str) -> Result<PolicyController, PolicyError> {
    let expr = expr::parse(source)?;
    Ok(PolicyController {
        source: source.to_string(),
        expr,
        calls: 0,
        price_sum: 0.0,
        min_price: f64::INFINITY,
        max_price: f64::NEG_INFINITY,
    })
}
