//! Repository for the `workflows` table.

use chrono::Utc;
use sqlx::SqlitePool;
use wfm_core::types::DbId;

use crate::models::workflow::{CreateWorkflow, WorkflowRecord};

/// Column list for `workflows` queries.
const COLUMNS: &str = "id, name, description, workflow_dir, created_at, updated_at";

/// Provides query operations for installed workflows.
pub struct WorkflowRepo;

impl WorkflowRepo {
    /// List all workflows ordered by ID.
    pub async fn list(pool: &SqlitePool) -> Result<Vec<WorkflowRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflows ORDER BY id ASC");
        sqlx::query_as::<_, WorkflowRecord>(&query)
            .fetch_all(pool)
            .await
    }

    /// Find a workflow by its ID.
    pub async fn find_by_id(
        pool: &SqlitePool,
        id: DbId,
    ) -> Result<Option<WorkflowRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflows WHERE id = ?1");
        sqlx::query_as::<_, WorkflowRecord>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Register a workflow, returning the inserted row.
    pub async fn create(
        pool: &SqlitePool,
        input: &CreateWorkflow,
    ) -> Result<WorkflowRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflows (name, description, workflow_dir, created_at) \
             VALUES (?1, ?2, ?3, ?4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkflowRecord>(&query)
            .bind(input.name.trim())
            .bind(&input.description)
            .bind(&input.workflow_dir)
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }
}
