//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use sdm_sim::config::{ConfigError, ScenarioConfig};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one policy over the price series and print the trajectory and KPIs.
    #[clap(name = "run")]
    Run(RunArgs),

    /// Iterate on scripted policies against the idle baseline.
    #[clap(name = "meta")]
    Meta(MetaArgs),
}

/// Where the scenario comes from, plus command-line overrides.
#[derive(ClapArgs)]
pub struct ScenarioArgs {
    /// Load scenario from a TOML file.
    #[clap(long, env = "SDM_SCENARIO", conflicts_with = "preset")]
    pub scenario: Option<PathBuf>,

    /// Use a built-in preset: reference, volatile, or flat.
    #[clap(long)]
    pub preset: Option<String>,

    /// Read prices from this CSV file (price in the second column).
    #[clap(long)]
    pub prices: Option<PathBuf>,

    /// The price CSV starts with a header row.
    #[clap(long, requires = "prices")]
    pub prices_header: bool,

    /// Override the synthetic price seed.
    #[clap(long)]
    pub seed: Option<u64>,

    /// First step to simulate.
    #[clap(long = "from")]
    pub start: Option<usize>,

    /// Last step to simulate (inclusive).
    #[clap(long = "to")]
    pub end: Option<usize>,

    #[clap(flatten)]
    pub serve: ServeArgs,
}

/// REST API options; empty without the `api` feature.
#[cfg(not(feature = "api"))]
#[derive(ClapArgs)]
pub struct ServeArgs {}

#[cfg(feature = "api")]
#[derive(ClapArgs)]
pub struct ServeArgs {
    /// Start the REST API after the run.
    #[clap(long)]
    pub serve: bool,

    /// API server port.
    #[clap(long, default_value = "3000", env = "SDM_PORT")]
    pub port: u16,
}

#[derive(ClapArgs)]
pub struct RunArgs {
    #[clap(flatten)]
    pub scenario: ScenarioArgs,

    /// Policy expression, overriding the scenario's.
    #[clap(long, conflicts_with = "policy_file", allow_hyphen_values = true)]
    pub policy: Option<String>,

    /// Read the policy expression from a file.
    #[clap(long)]
    pub policy_file: Option<PathBuf>,

    /// Export step results to CSV.
    #[clap(long)]
    pub telemetry_out: Option<PathBuf>,
}

#[derive(ClapArgs)]
pub struct MetaArgs {
    #[clap(flatten)]
    pub scenario: ScenarioArgs,

    /// Number of improvement iterations after the baseline.
    #[clap(long)]
    pub iterations: Option<usize>,
}

impl ScenarioArgs {
    /// Loads the scenario (`--scenario`, then `--preset`, then the reference
    /// preset) and applies the overrides.
    pub fn load(&self) -> Result<ScenarioConfig, ConfigError> {
        let mut cfg = match (&self.scenario, &self.preset) {
            (Some(path), _) => ScenarioConfig::from_toml_file(path)?,
            (None, Some(name)) => ScenarioConfig::from_preset(name)?,
            (None, None) => ScenarioConfig::reference(),
        };

        if let Some(path) = &self.prices {
            cfg.prices.source = "csv".to_string();
            cfg.prices.path = Some(path.clone());
            cfg.prices.has_header = self.prices_header;
        }
        if let Some(seed) = self.seed {
            cfg.prices.seed = seed;
        }
        if self.start.is_some() {
            cfg.simulation.start_index = self.start;
        }
        if self.end.is_some() {
            cfg.simulation.end_index = self.end;
        }
        Ok(cfg)
    }
}
