pub mod health;
pub mod runs;
pub mod workflows;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /workflows                         list, register
/// /workflows/{id}                    get
/// /workflows/{id}/run                launch a new run (POST)
/// /workflows/{id}/runs               run history
///
/// /runs                              live runs in this process
/// /runs/{run_id}                     get run record
/// /runs/{run_id}/stop                stop a live run (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/workflows", workflows::router())
        .nest("/runs", runs::router())
}
