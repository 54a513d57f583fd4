//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::AppState;
use super::types::{ErrorResponse, IterationSummary, StateResponse, TrajectoryQuery};
use crate::sim::types::StepResult;

/// Returns scenario parameters, KPI report, and the latest step.
///
/// `GET /state` → 200 + `StateResponse` JSON
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    Json(StateResponse {
        config: state.config,
        kpi: state.kpi.clone(),
        total_cost: state.trajectory.total_cost(),
        latest_step: state.trajectory.steps().last().copied(),
    })
}

/// Returns step records, optionally filtered by step range.
///
/// `GET /trajectory` → 200 + `Vec<StepResult>` JSON
/// `GET /trajectory?from=N&to=M` → filtered range (inclusive)
/// `GET /trajectory?from=10&to=5` → 400 + `ErrorResponse`
pub async fn get_trajectory(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrajectoryQuery>,
) -> impl IntoResponse {
    let from = query.from.unwrap_or(0);
    let to = query.to.unwrap_or(usize::MAX);

    if from > to {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("`from` ({from}) must be <= `to` ({to})"),
            }),
        ));
    }

    let steps: Vec<StepResult> = state
        .trajectory
        .steps()
        .iter()
        .filter(|s| (from..=to).contains(&s.step))
        .copied()
        .collect();

    Ok(Json(steps))
}

/// Returns the improvement-loop summary.
///
/// `GET /history` → 200 + `Vec<IterationSummary>` JSON
pub async fn get_history(State(state): State<Arc<AppState>>) -> Json<Vec<IterationSummary>> {
    Json(state.history.clone())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    use super::*;
    use crate::api::router;
    use crate::sim::controller::ConstantController;
    use crate::sim::engine::Engine;
    use crate::sim::price::PriceSeries;
    use crate::sim::types::SimConfig;

    fn make_test_state() -> Arc<AppState> {
        let prices: Vec<f64> = (0..24).map(|t| 1.0 + (t % 6) as f64).collect();
        let mut engine = Engine::new(SimConfig::reference(), PriceSeries::new(prices).unwrap());
        let trajectory = engine.run_all(&mut ConstantController(-1.0)).unwrap();
        Arc::new(AppState::from_run(SimConfig::reference(), trajectory))
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let app = router(make_test_state());
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn state_returns_200() {
        let (status, json) = get_json("/state").await;
        assert_eq!(status, StatusCode::OK);
        assert!(json.get("config").is_some());
        assert!(json.get("kpi").is_some());
        assert_eq!(json["latest_step"]["step"], 23);
    }

    #[tokio::test]
    async fn trajectory_returns_all_steps() {
        let (status, json) = get_json("/trajectory").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().map(Vec::len), Some(24));
    }

    #[tokio::test]
    async fn trajectory_range_query() {
        let (status, json) = get_json("/trajectory?from=5&to=10").await;
        assert_eq!(status, StatusCode::OK);
        let steps = json.as_array().unwrap();
        assert_eq!(steps.len(), 6); // steps 5..=10
        assert_eq!(steps[0]["step"], 5);
        assert_eq!(steps[5]["step"], 10);
    }

    #[tokio::test]
    async fn trajectory_invalid_range_returns_400() {
        let (status, json) = get_json("/trajectory?from=10&to=5").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json.get("error").is_some());
    }

    #[tokio::test]
    async fn history_is_empty_for_single_run() {
        let (status, json) = get_json("/history").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().map(Vec::len), Some(0));
    }
}
