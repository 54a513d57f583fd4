//! CSV export for simulation trajectories.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::types::Trajectory;

/// Column header for trajectory export.
pub const HEADER: &[&str] = &[
    "step",
    "price",
    "state_of_charge",
    "net_action",
    "market_import",
    "cost",
    "total_cost",
];

/// Exports a trajectory to a CSV file at the given path.
///
/// Writes a header row followed by one row per step. `total_cost` is the
/// running total after that step. Output is deterministic for identical
/// inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(trajectory: &Trajectory, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_csv(trajectory, io::BufWriter::new(file))
}

/// Writes a trajectory as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(trajectory: &Trajectory, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(HEADER)?;

    let mut running = 0.0;
    for s in trajectory.steps() {
        running += s.cost_this_step;
        wtr.write_record(&[
            s.step.to_string(),
            format!("{:.6}", s.price),
            format!("{:.6}", s.state_of_charge_after),
            format!("{:.6}", s.net_action),
            format!("{:.6}", s.market_import),
            format!("{:.6}", s.cost_this_step),
            format!("{running:.6}"),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
