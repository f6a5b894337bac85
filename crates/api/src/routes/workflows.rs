use axum::routing::{get, post};
use axum::Router;

use crate::handlers::workflows;
use crate::state::AppState;

/// Routes mounted at `/workflows`.
///
/// ```text
/// GET   /              list_workflows
/// POST  /              create_workflow
/// GET   /{id}          get_workflow
/// POST  /{id}/run      launch_workflow
/// GET   /{id}/runs     list_workflow_runs
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(workflows::list_workflows).post(workflows::create_workflow),
        )
        .route("/{id}", get(workflows::get_workflow))
        .route("/{id}/run", post(workflows::launch_workflow))
        .route("/{id}/runs", get(workflows::list_workflow_runs))
}
