//! REST API over a completed run.
//!
//! Provides three GET endpoints:
//! - `/state`: scenario parameters, KPI report, and latest step
//! - `/trajectory`: step records with optional range filtering
//! - `/history`: per-iteration costs from the improvement loop

mod handlers;
mod types;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::meta::MetaReport;
use crate::sim::kpi::KpiReport;
use crate::sim::types::{SimConfig, Trajectory};

pub use types::{ErrorResponse, IterationSummary, StateResponse, TrajectoryQuery};

/// Immutable application state shared across all request handlers.
///
/// Built once after the run completes; everything is read-only so no locks
/// are needed.
pub struct AppState {
    /// Parameters the run used.
    pub config: SimConfig,
    /// KPIs of `trajectory`.
    pub kpi: KpiReport,
    /// The run being served.
    pub trajectory: Trajectory,
    /// Improvement-loop iterations; empty for a single run.
    pub history: Vec<IterationSummary>,
}

impl AppState {
    /// State for a single run.
    pub fn from_run(config: SimConfig, trajectory: Trajectory) -> Self {
        Self {
            kpi: KpiReport::from_trajectory(&trajectory, config.capacity),
            config,
            trajectory,
            history: Vec::new(),
        }
    }

    /// State for an improvement loop, serving its best iteration.
    pub fn from_meta(config: SimConfig, report: &MetaReport) -> Self {
        let trajectory = report
            .best_iteration()
            .map(|r| r.trajectory.clone())
            .unwrap_or_default();
        Self {
            history: IterationSummary::from_report(report),
            ..Self::from_run(config, trajectory)
        }
    }
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/state", get(handlers::get_state))
        .route("/trajectory", get(handlers::get_trajectory))
        .route("/history", get(handlers::get_history))
        .with_state(state)
}

/// Binds to the given address and serves the API until Ctrl+C.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(crate::telemetry::shutdown_signal())
        .await
}
