//! Repository for the `workflow_runs` table.
//!
//! Status updates are conditional on the current status so that a run
//! only ever moves forward (`pending -> running -> stopped`, or to
//! `failed` from either live state). An update that does not apply
//! returns `Ok(None)`.

use chrono::Utc;
use sqlx::SqlitePool;
use wfm_core::run::RunStatus;
use wfm_core::types::DbId;

use crate::models::workflow_run::{CreateWorkflowRun, WorkflowRun};

/// Column list for `workflow_runs` queries.
const COLUMNS: &str = "\
    id, workflow_id, status, host, port, timeout_ms, run_dir, \
    error_message, created_at, updated_at";

/// Provides query operations for workflow runs.
pub struct WorkflowRunRepo;

impl WorkflowRunRepo {
    // ── Queries ──────────────────────────────────────────────────────

    /// Record a new pending run, returning the inserted row.
    pub async fn create(
        pool: &SqlitePool,
        input: &CreateWorkflowRun,
    ) -> Result<WorkflowRun, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_runs (id, workflow_id, status, timeout_ms, run_dir, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowRun>(&query)
            .bind(&input.id)
            .bind(input.workflow_id)
            .bind(RunStatus::Pending.as_str())
            .bind(input.timeout_ms)
            .bind(&input.run_dir)
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }

    /// Find a run by its ID.
    pub async fn find_by_id(
        pool: &SqlitePool,
        id: &str,
    ) -> Result<Option<WorkflowRun>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflow_runs WHERE id = ?1");
        sqlx::query_as::<_, WorkflowRun>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List the runs of one workflow, newest first.
    pub async fn list_by_workflow(
        pool: &SqlitePool,
        workflow_id: DbId,
    ) -> Result<Vec<WorkflowRun>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_runs \
             WHERE workflow_id = ?1 \
             ORDER BY created_at DESC, id ASC"
        );
        sqlx::query_as::<_, WorkflowRun>(&query)
            .bind(workflow_id)
            .fetch_all(pool)
            .await
    }

    /// List all runs currently in `status`, oldest first.
    pub async fn list_by_status(
        pool: &SqlitePool,
        status: RunStatus,
    ) -> Result<Vec<WorkflowRun>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM workflow_runs WHERE status = ?1 ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, WorkflowRun>(&query)
            .bind(status.as_str())
            .fetch_all(pool)
            .await
    }

    // ── Status transitions ───────────────────────────────────────────

    /// `pending -> running`, recording where the instance listens.
    pub async fn mark_running(
        pool: &SqlitePool,
        id: &str,
        host: &str,
        port: u16,
    ) -> Result<Option<WorkflowRun>, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_runs \
             SET status = 'running', host = ?2, port = ?3, updated_at = ?4 \
             WHERE id = ?1 AND status = 'pending' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowRun>(&query)
            .bind(id)
            .bind(host)
            .bind(i64::from(port))
            .bind(Utc::now())
            .fetch_optional(pool)
            .await
    }

    /// `running -> stopped`.
    pub async fn mark_stopped(
        pool: &SqlitePool,
        id: &str,
    ) -> Result<Option<WorkflowRun>, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_runs \
             SET status = 'stopped', updated_at = ?2 \
             WHERE id = ?1 AND status = 'running' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowRun>(&query)
            .bind(id)
            .bind(Utc::now())
            .fetch_optional(pool)
            .await
    }

    /// `pending | running -> failed`, with a reason.
    pub async fn mark_failed(
        pool: &SqlitePool,
        id: &str,
        error_message: &str,
    ) -> Result<Option<WorkflowRun>, sqlx::Error> {
        let query = format!(
            "UPDATE workflow_runs \
             SET status = 'failed', error_message = ?2, updated_at = ?3 \
             WHERE id = ?1 AND status IN ('pending', 'running') \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowRun>(&query)
            .bind(id)
            .bind(error_message)
            .bind(Utc::now())
            .fetch_optional(pool)
            .await
    }
}
