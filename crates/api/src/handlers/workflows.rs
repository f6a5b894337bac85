//! Handlers for the `/workflows` resource.
//!
//! Workflow ids are integers in storage but strings on the wire; a path id
//! that does not parse is treated as an unknown workflow.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use wfm_core::error::CoreError;
use wfm_core::launch::{LaunchRequest, LaunchResult};
use wfm_core::types::DbId;
use wfm_core::workflow::{
    validate_workflow_description, validate_workflow_dir, validate_workflow_name, Workflow,
    WorkflowListResponse,
};
use wfm_db::models::workflow::{CreateWorkflow, WorkflowRecord};
use wfm_db::models::workflow_run::WorkflowRun;
use wfm_db::repositories::{WorkflowRepo, WorkflowRunRepo};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Response body for `GET /workflows/{id}/runs`.
#[derive(Debug, Serialize)]
pub struct RunListResponse {
    pub runs: Vec<WorkflowRun>,
}

/// GET /api/workflows
///
/// Every registered workflow, in registration order.
pub async fn list_workflows(
    State(state): State<AppState>,
) -> AppResult<Json<WorkflowListResponse>> {
    let records = WorkflowRepo::list(&state.pool).await?;
    let workflows = records.iter().map(WorkflowRecord::to_workflow).collect();
    Ok(Json(WorkflowListResponse { workflows }))
}

/// GET /api/workflows/{id}
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Workflow>> {
    let record = load_workflow(&state, &id).await?;
    Ok(Json(record.to_workflow()))
}

/// POST /api/workflows
///
/// Register an installed workflow directory. Returns 201 with the new
/// workflow, or 409 if the directory is already registered.
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(input): Json<CreateWorkflow>,
) -> AppResult<(StatusCode, Json<Workflow>)> {
    validate_workflow_name(&input.name)?;
    validate_workflow_description(input.description.as_deref())?;
    validate_workflow_dir(&input.workflow_dir)?;

    let record = WorkflowRepo::create(&state.pool, &input).await?;
    tracing::info!(workflow_id = record.id, name = %record.name, "Workflow registered");

    Ok((StatusCode::CREATED, Json(record.to_workflow())))
}

/// POST /api/workflows/{id}/run
///
/// Start a new ComfyUI instance for the workflow. The body is optional;
/// when present it may carry `{ "timeout": <ms> }`. Each call starts a
/// distinct run.
pub async fn launch_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<LaunchResult>)> {
    let request = parse_launch_request(&body)?;
    let workflow = load_workflow(&state, &id).await?;

    tracing::debug!(workflow_id = workflow.id, timeout = ?request.timeout, "Launch requested");
    let result = state.run_manager.launch(&workflow, request.timeout).await?;

    Ok((StatusCode::CREATED, Json(result)))
}

/// GET /api/workflows/{id}/runs
///
/// Run history for one workflow, newest first.
pub async fn list_workflow_runs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<RunListResponse>> {
    let workflow = load_workflow(&state, &id).await?;
    let runs = WorkflowRunRepo::list_by_workflow(&state.pool, workflow.id).await?;
    Ok(Json(RunListResponse { runs }))
}

async fn load_workflow(state: &AppState, id: &str) -> AppResult<WorkflowRecord> {
    let not_found = || AppError::Core(CoreError::not_found("Workflow", id));

    let db_id: DbId = id.trim().parse().map_err(|_| not_found())?;
    WorkflowRepo::find_by_id(&state.pool, db_id)
        .await?
        .ok_or_else(not_found)
}

/// An empty body means "no options".
fn parse_launch_request(body: &[u8]) -> AppResult<LaunchRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(LaunchRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid launch request body: {e}")))
}
