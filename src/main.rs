//! Simulator entry point: CLI wiring and config-driven engine construction.

mod cli;

use std::fs;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::info;

use sdm_sim::config::ScenarioConfig;
use sdm_sim::io::export::export_csv;
use sdm_sim::meta::{ScriptedAuthor, run_meta_loop};
use sdm_sim::policy;
use sdm_sim::sim::engine::Engine;
use sdm_sim::sim::kpi::KpiReport;
use sdm_sim::telemetry::init_tracing;

use crate::cli::{Args, Command, MetaArgs, RunArgs};

fn main() -> anyhow::Result<()> {
    init_tracing();

    match Args::parse().command {
        Command::Run(args) => run(args),
        Command::Meta(args) => meta(args),
    }
}

/// Reports every validation problem, then fails if there were any.
fn validate(scenario: &ScenarioConfig) -> anyhow::Result<()> {
    let errors = scenario.validate();
    if errors.is_empty() {
        return Ok(());
    }
    for e in &errors {
        eprintln!("{e}");
    }
    bail!("scenario has {} invalid field(s)", errors.len());
}

/// Loads prices and builds the engine for a validated scenario.
fn build_engine(scenario: &ScenarioConfig) -> anyhow::Result<(Engine, usize, usize)> {
    let prices = scenario.load_prices().context("failed to load prices")?;
    let (start, end) = scenario.step_range(prices.horizon());
    info!(
        horizon = prices.horizon(),
        start,
        end,
        source = %scenario.prices.source,
        "prices loaded"
    );
    Ok((Engine::new(scenario.sim_config(), prices), start, end))
}

fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut scenario = args.scenario.load()?;
    if let Some(policy) = args.policy {
        scenario.simulation.policy = policy;
    } else if let Some(path) = &args.policy_file {
        scenario.simulation.policy = fs::read_to_string(path)
            .with_context(|| format!("cannot read policy file \"{}\"", path.display()))?;
    }
    validate(&scenario)?;

    let (mut engine, start, end) = build_engine(&scenario)?;
    let mut controller = policy::compile(&scenario.simulation.policy)?;
    let trajectory = engine.run(&mut controller, start, end)?;
    let kpi = KpiReport::from_trajectory(&trajectory, scenario.simulation.capacity);

    for s in trajectory.steps() {
        println!("{s}");
    }
    println!("\n{kpi}");

    if let Some(path) = &args.telemetry_out {
        export_csv(&trajectory, path)
            .with_context(|| format!("failed to write CSV \"{}\"", path.display()))?;
        info!(path = %path.display(), "trajectory written");
    }

    #[cfg(feature = "api")]
    if args.scenario.serve.serve {
        let state = sdm_sim::api::AppState::from_run(*engine.config(), trajectory);
        serve(&args.scenario.serve, state)?;
    }

    Ok(())
}

fn meta(args: MetaArgs) -> anyhow::Result<()> {
    let mut scenario = args.scenario.load()?;
    if let Some(iterations) = args.iterations {
        scenario.meta.iterations = iterations;
    }
    validate(&scenario)?;

    let (mut engine, start, end) = build_engine(&scenario)?;
    let mut author = ScriptedAuthor::new(scenario.meta.candidates.clone());
    let report = run_meta_loop(
        &mut engine,
        &mut author,
        scenario.meta.iterations,
        start,
        end,
    )?;

    println!("{report}");
    if let Some(best) = report.best_iteration() {
        println!("\nBest policy:\n{}", best.policy);
        let kpi = KpiReport::from_trajectory(&best.trajectory, scenario.simulation.capacity);
        println!("\n{kpi}");
    }

    #[cfg(feature = "api")]
    if args.scenario.serve.serve {
        let state = sdm_sim::api::AppState::from_meta(*engine.config(), &report);
        serve(&args.scenario.serve, state)?;
    }

    Ok(())
}

#[cfg(feature = "api")]
fn serve(args: &cli::ServeArgs, state: sdm_sim::api::AppState) -> anyhow::Result<()> {
    use std::net::SocketAddr;
    use std::sync::Arc;

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let rt = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
    rt.block_on(sdm_sim::api::serve(Arc::new(state), addr))
        .context("API server failed")
}
