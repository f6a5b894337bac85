//! Workflow registry entity.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use wfm_core::types::{DbId, Timestamp};
use wfm_core::workflow::Workflow;

/// An installed workflow. Only metadata lives here; the workflow itself is
/// a directory on disk.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowRecord {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub workflow_dir: String,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
}

/// DTO for registering a workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkflow {
    pub name: String,
    pub description: Option<String>,
    pub workflow_dir: String,
}

impl WorkflowRecord {
    /// The client-facing shape. Registry-only columns travel as extra fields.
    pub fn to_workflow(&self) -> Workflow {
        let mut extra = Map::new();
        extra.insert("workflow_dir".into(), Value::String(self.workflow_dir.clone()));
        extra.insert("created_at".into(), Value::String(self.created_at.to_rfc3339()));
        if let Some(updated_at) = self.updated_at {
            extra.insert("updated_at".into(), Value::String(updated_at.to_rfc3339()));
        }

        Workflow {
            id: self.id.to_string(),
            name: Some(self.name.clone()),
            description: self.description.clone(),
            extra,
        }
    }
}
