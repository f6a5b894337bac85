//! Workflow run entity.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use wfm_core::error::CoreError;
use wfm_core::launch::LaunchResult;
use wfm_core::run::RunStatus;
use wfm_core::types::{DbId, Timestamp};

/// One launched instance of a workflow.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowRun {
    /// UUID string, also returned to clients as `run_id`.
    pub id: String,
    pub workflow_id: DbId,
    pub status: String,
    pub host: Option<String>,
    pub port: Option<i64>,
    /// Timeout hint sent by the client, stored as received.
    pub timeout_ms: Option<i64>,
    pub run_dir: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
}

/// DTO for recording a new (pending) run.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkflowRun {
    /// Run id chosen by the caller (a UUID string).
    pub id: String,
    pub workflow_id: DbId,
    pub timeout_ms: Option<i64>,
    pub run_dir: Option<String>,
}

impl WorkflowRun {
    pub fn run_status(&self) -> Result<RunStatus, CoreError> {
        self.status.parse()
    }

    /// Connection details, present once the run is addressable.
    pub fn launch_result(&self) -> Option<LaunchResult> {
        let host = self.host.clone()?;
        let port = u16::try_from(self.port?).ok()?;
        Some(LaunchResult {
            run_id: self.id.clone(),
            host,
            port,
        })
    }
}
