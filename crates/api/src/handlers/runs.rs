//! Handlers for the `/runs` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use wfm_comfyui::manager::ActiveRun;
use wfm_core::error::CoreError;
use wfm_db::models::workflow_run::WorkflowRun;
use wfm_db::repositories::WorkflowRunRepo;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Response body for `GET /runs`.
#[derive(Debug, Serialize)]
pub struct ActiveRunsResponse {
    pub runs: Vec<ActiveRun>,
}

/// GET /api/runs
///
/// Runs with a live instance in this server process.
pub async fn list_active_runs(State(state): State<AppState>) -> Json<ActiveRunsResponse> {
    Json(ActiveRunsResponse {
        runs: state.run_manager.active_runs().await,
    })
}

/// GET /api/runs/{run_id}
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> AppResult<Json<WorkflowRun>> {
    let run = WorkflowRunRepo::find_by_id(&state.pool, &run_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::not_found("Run", &run_id)))?;
    Ok(Json(run))
}

/// POST /api/runs/{run_id}/stop
///
/// Tear down a live run. 404 for an unknown run, 409 if it already ended.
pub async fn stop_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> AppResult<StatusCode> {
    state.run_manager.stop(&run_id).await?;
    tracing::info!(run_id = %run_id, "Run stopped by request");
    Ok(StatusCode::NO_CONTENT)
}
