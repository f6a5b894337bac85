use std::sync::Arc;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: wfm_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Owner of all live ComfyUI runs.
    pub run_manager: Arc<wfm_comfyui::manager::RunManager>,
}
