/// Battery feasibility policy.
pub mod battery;
pub mod controller;
pub mod engine;
/// Run failure taxonomy.
pub mod error;
pub mod kpi;
/// Validated, shareable market prices.
pub mod price;
pub mod types;
