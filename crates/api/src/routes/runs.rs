use axum::routing::{get, post};
use axum::Router;

use crate::handlers::runs;
use crate::state::AppState;

/// Routes mounted at `/runs`.
///
/// ```text
/// GET   /                  list_active_runs
/// GET   /{run_id}          get_run
/// POST  /{run_id}/stop     stop_run
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(runs::list_active_runs))
        .route("/{run_id}", get(runs::get_run))
        .route("/{run_id}/stop", post(runs::stop_run))
}
