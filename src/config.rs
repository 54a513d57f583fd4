//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::io::prices::{PriceError, load_prices};
use crate::policy;
use crate::sim::price::PriceSeries;
use crate::sim::types::SimConfig;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the reference scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::reference`] for the built-in default.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Battery, demand, step range, and the policy to run.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Where prices come from.
    #[serde(default)]
    pub prices: PricesConfig,
    /// Policy-improvement loop parameters.
    #[serde(default)]
    pub meta: MetaConfig,
}

/// Battery, demand, and run parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Battery capacity (must be > 0).
    pub capacity: f64,
    /// Initial state of charge (must lie in `[0, capacity]`).
    pub initial_soc: f64,
    /// Fixed demand per step (must be >= 0).
    pub demand: f64,
    /// First step to simulate; defaults to 0.
    pub start_index: Option<usize>,
    /// Last step to simulate (inclusive); defaults to the last price.
    pub end_index: Option<usize>,
    /// Policy source for `run`.
    pub policy: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            capacity: 100.0,
            initial_soc: 50.0,
            demand: 5.0,
            start_index: None,
            end_index: None,
            policy: "if price < avg_price then min(10, 100 - soc) else -5".to_string(),
        }
    }
}

/// Price source parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PricesConfig {
    /// `"synthetic"` or `"csv"`.
    pub source: String,
    /// CSV file, required when `source = "csv"`.
    pub path: Option<PathBuf>,
    /// Whether the CSV file starts with a header row.
    pub has_header: bool,
    /// Number of synthetic steps (must be > 0).
    pub steps: usize,
    /// Synthetic daily period in steps (must be > 0).
    pub steps_per_day: usize,
    /// Synthetic mean price.
    pub base: f64,
    /// Synthetic daily swing.
    pub amplitude: f64,
    /// Synthetic noise standard deviation.
    pub noise_std: f64,
    /// Synthetic noise seed.
    pub seed: u64,
}

impl Default for PricesConfig {
    fn default() -> Self {
        Self {
            source: "synthetic".to_string(),
            path: None,
            has_header: false,
            steps: 48,
            steps_per_day: 24,
            base: 3.0,
            amplitude: 1.5,
            noise_std: 0.2,
            seed: 42,
        }
    }
}

/// One scripted policy candidate for the improvement loop.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CandidateConfig {
    /// Policy proposed for the iteration.
    pub policy: String,
    /// Replacement offered if the policy fails.
    #[serde(default)]
    pub correction: Option<String>,
}

impl CandidateConfig {
    fn new(policy: &str, correction: Option<&str>) -> Self {
        Self {
            policy: policy.to_string(),
            correction: correction.map(str::to_string),
        }
    }
}

/// Policy-improvement loop parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetaConfig {
    /// Improvement iterations after the baseline.
    pub iterations: usize,
    /// Scripted candidates, consumed one per iteration.
    pub candidates: Vec<CandidateConfig>,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            iterations: 3,
            candidates: vec![
                CandidateConfig::new("if price < avg_price then 10 else -5", None),
                CandidateConfig::new(
                    "if price < avg_price then 10 else -5 / (step - step)",
                    Some("if price < min_price + 0.5 then 15 else -5"),
                ),
                CandidateConfig::new(
                    "# fill up when cheap, sell down when dear\n\
                     if price < avg_price then min(10, 100 - soc)\n\
                     else if price > avg_price then -min(soc, 5)\n\
                     else 0",
                    None,
                ),
            ],
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.capacity"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl ScenarioConfig {
    /// The reference scenario: capacity 100, half full, demand 5, two
    /// synthetic days of moderately varying prices.
    pub fn reference() -> Self {
        Self::default()
    }

    /// Wide daily swing with heavy noise; rewards aggressive arbitrage.
    pub fn volatile() -> Self {
        Self {
            prices: PricesConfig {
                steps: 72,
                amplitude: 3.0,
                noise_std: 0.8,
                seed: 7,
                ..PricesConfig::default()
            },
            ..Self::default()
        }
    }

    /// Constant prices; no policy can beat the idle baseline.
    pub fn flat() -> Self {
        Self {
            prices: PricesConfig {
                amplitude: 0.0,
                noise_std: 0.0,
                ..PricesConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["reference", "volatile", "flat"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "reference" => Ok(Self::reference()),
            "volatile" => Ok(Self::volatile()),
            "flat" => Ok(Self::flat()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// A relative `prices.path` is resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        let mut cfg = Self::from_toml_str(&content)?;
        if let (Some(csv), Some(dir)) = (cfg.prices.path.as_mut(), path.parent()) {
            if csv.is_relative() {
                *csv = dir.join(&*csv);
            }
        }
        Ok(cfg)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Engine parameters. Call only on a validated configuration.
    pub fn sim_config(&self) -> SimConfig {
        let s = &self.simulation;
        SimConfig::new(s.capacity, s.initial_soc, s.demand)
    }

    /// Builds the configured price series.
    ///
    /// # Errors
    ///
    /// Returns a [`PriceError`] if the CSV file is unreadable or malformed,
    /// or if the source is unknown or lacks its path.
    pub fn load_prices(&self) -> Result<PriceSeries, PriceError> {
        let p = &self.prices;
        match (p.source.as_str(), &p.path) {
            ("csv", Some(path)) => load_prices(path, p.has_header),
            ("csv", None) => Err(PriceError::MissingPath),
            ("synthetic", _) => Ok(PriceSeries::synthetic(
                p.steps,
                p.steps_per_day,
                p.base,
                p.amplitude,
                p.noise_std,
                p.seed,
            )?),
            (other, _) => Err(PriceError::UnknownSource(other.to_string())),
        }
    }

    /// Inclusive step range for a series of `horizon` prices.
    pub fn step_range(&self, horizon: usize) -> (usize, usize) {
        let s = &self.simulation;
        (
            s.start_index.unwrap_or(0),
            s.end_index.unwrap_or(horizon.saturating_sub(1)),
        )
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid. Candidate policies
    /// are not compiled here; a broken candidate is a legitimate input to the
    /// correction path.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if !(s.capacity.is_finite() && s.capacity > 0.0) {
            errors.push(ConfigError::new("simulation.capacity", "must be > 0"));
        }
        if !(0.0..=s.capacity).contains(&s.initial_soc) {
            errors.push(ConfigError::new(
                "simulation.initial_soc",
                "must be in [0, simulation.capacity]",
            ));
        }
        if !(s.demand.is_finite() && s.demand >= 0.0) {
            errors.push(ConfigError::new("simulation.demand", "must be >= 0"));
        }
        if let (Some(start), Some(end)) = (s.start_index, s.end_index) {
            if start > end {
                errors.push(ConfigError::new(
                    "simulation.start_index",
                    "must be <= simulation.end_index",
                ));
            }
        }
        if let Err(e) = policy::compile(&s.policy) {
            errors.push(ConfigError::new("simulation.policy", e.to_string()));
        }

        let p = &self.prices;
        match p.source.as_str() {
            "csv" => {
                if p.path.is_none() {
                    errors.push(ConfigError::new(
                        "prices.path",
                        "required when prices.source = \"csv\"",
                    ));
                }
            }
            "synthetic" => {
                if p.steps == 0 {
                    errors.push(ConfigError::new("prices.steps", "must be > 0"));
                }
                if p.steps_per_day == 0 {
                    errors.push(ConfigError::new("prices.steps_per_day", "must be > 0"));
                }
                if !(p.base.is_finite() && p.base >= 0.0) {
                    errors.push(ConfigError::new("prices.base", "must be >= 0"));
                }
                if !(p.amplitude.is_finite() && p.amplitude >= 0.0) {
                    errors.push(ConfigError::new("prices.amplitude", "must be >= 0"));
                }
                if !(p.noise_std.is_finite() && p.noise_std >= 0.0) {
                    errors.push(ConfigError::new("prices.noise_std", "must be >= 0"));
                }
                if let Some(end) = s.end_index {
                    if p.steps > 0 && end >= p.steps {
                        errors.push(ConfigError::new(
                            "simulation.end_index",
                            "must be < prices.steps",
                        ));
                    }
                }
            }
            other => errors.push(ConfigError::new(
                "prices.source",
                format!("must be \"synthetic\" or \"csv\", got \"{other}\""),
            )),
        }

        let m = &self.meta;
        if m.iterations > m.candidates.len() {
            errors.push(ConfigError::new(
                "meta.iterations",
                format!(
                    "must be <= the number of meta.candidates ({})",
                    m.candidates.len()
                ),
            ));
        }

        errors
    }
}
