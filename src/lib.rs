//! Battery energy-management simulator with a policy-improvement loop.
//!
//! The [`sim`] core advances a battery over a price series under a
//! [`Controller`](sim::controller::Controller), clipping requested actions to
//! what is physically possible and accounting the cost of the energy bought
//! from the market. [`policy`] compiles controllers from text, and [`meta`]
//! iterates on them against an idle baseline.

#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod io;
pub mod meta;
pub mod policy;
/// Simulation engine, battery model, controllers, and KPIs.
pub mod sim;
pub mod telemetry;
