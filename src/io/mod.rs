//! File input and output: price series in, trajectories out.

pub mod export;
pub mod prices;
