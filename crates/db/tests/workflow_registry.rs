//! Integration tests for the workflow and workflow-run repositories.
//!
//! Each test gets a fresh in-memory SQLite database with migrations applied.

use assert_matches::assert_matches;
use wfm_core::run::RunStatus;
use wfm_db::models::workflow::CreateWorkflow;
use wfm_db::models::workflow_run::CreateWorkflowRun;
use wfm_db::repositories::{WorkflowRepo, WorkflowRunRepo};
use wfm_db::DbPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn test_pool() -> DbPool {
    let pool = wfm_db::create_memory_pool().await.unwrap();
    wfm_db::run_migrations(&pool).await.unwrap();
    pool
}

fn new_workflow(name: &str, dir: &str) -> CreateWorkflow {
    CreateWorkflow {
        name: name.to_string(),
        description: Some(format!("{name} workflow")),
        workflow_dir: dir.to_string(),
    }
}

fn new_run(workflow_id: i64) -> CreateWorkflowRun {
    CreateWorkflowRun {
        id: uuid::Uuid::new_v4().to_string(),
        workflow_id,
        timeout_ms: Some(30_000),
        run_dir: None,
    }
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_passes_on_fresh_database() {
    let pool = test_pool().await;
    wfm_db::health_check(&pool).await.unwrap();
}

#[tokio::test]
async fn create_and_list_preserves_insertion_order() {
    let pool = test_pool().await;

    let sticker = WorkflowRepo::create(&pool, &new_workflow("sticker", "/srv/wf/sticker"))
        .await
        .unwrap();
    let general = WorkflowRepo::create(&pool, &new_workflow("general_v1", "/srv/wf/general"))
        .await
        .unwrap();

    let listed = WorkflowRepo::list(&pool).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|w| w.id).collect();
    assert_eq!(ids, vec![sticker.id, general.id]);
    assert_eq!(listed[0].name, "sticker");
    assert_eq!(listed[0].description.as_deref(), Some("sticker workflow"));
}

#[tokio::test]
async fn find_missing_workflow_returns_none() {
    let pool = test_pool().await;
    assert!(WorkflowRepo::find_by_id(&pool, 404).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_workflow_dir_is_rejected() {
    let pool = test_pool().await;
    WorkflowRepo::create(&pool, &new_workflow("a", "/srv/wf/same"))
        .await
        .unwrap();
    let err = WorkflowRepo::create(&pool, &new_workflow("b", "/srv/wf/same"))
        .await
        .unwrap_err();
    assert_matches!(err, sqlx::Error::Database(_));
}

#[tokio::test]
async fn record_maps_to_client_workflow() {
    let pool = test_pool().await;
    let record = WorkflowRepo::create(&pool, &new_workflow("sticker", "/srv/wf/sticker"))
        .await
        .unwrap();

    let workflow = record.to_workflow();
    assert_eq!(workflow.id, record.id.to_string());
    assert_eq!(workflow.name.as_deref(), Some("sticker"));
    assert_eq!(workflow.extra["workflow_dir"], "/srv/wf/sticker");
    assert!(workflow.extra.contains_key("created_at"));
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_lifecycle_pending_running_stopped() {
    let pool = test_pool().await;
    let wf = WorkflowRepo::create(&pool, &new_workflow("sticker", "/srv/wf/sticker"))
        .await
        .unwrap();

    let run = WorkflowRunRepo::create(&pool, &new_run(wf.id)).await.unwrap();
    assert_eq!(run.run_status().unwrap(), RunStatus::Pending);
    assert_eq!(run.timeout_ms, Some(30_000));
    assert!(run.launch_result().is_none());

    let running = WorkflowRunRepo::mark_running(&pool, &run.id, "10.0.0.5", 9001)
        .await
        .unwrap()
        .expect("pending run should start");
    assert_eq!(running.run_status().unwrap(), RunStatus::Running);
    let result = running.launch_result().unwrap();
    assert_eq!(result.frame_url(), "http://10.0.0.5:9001");
    assert_eq!(result.run_id, run.id);

    let stopped = WorkflowRunRepo::mark_stopped(&pool, &run.id)
        .await
        .unwrap()
        .expect("running run should stop");
    assert_eq!(stopped.run_status().unwrap(), RunStatus::Stopped);
    assert!(stopped.updated_at.is_some());
}

#[tokio::test]
async fn terminal_runs_do_not_transition() {
    let pool = test_pool().await;
    let wf = WorkflowRepo::create(&pool, &new_workflow("sticker", "/srv/wf/sticker"))
        .await
        .unwrap();
    let run = WorkflowRunRepo::create(&pool, &new_run(wf.id)).await.unwrap();

    let failed = WorkflowRunRepo::mark_failed(&pool, &run.id, "spawn failed")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.error_message.as_deref(), Some("spawn failed"));

    assert!(WorkflowRunRepo::mark_running(&pool, &run.id, "h", 1)
        .await
        .unwrap()
        .is_none());
    assert!(WorkflowRunRepo::mark_stopped(&pool, &run.id)
        .await
        .unwrap()
        .is_none());
    assert!(WorkflowRunRepo::mark_failed(&pool, &run.id, "again")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn pending_run_cannot_be_stopped() {
    let pool = test_pool().await;
    let wf = WorkflowRepo::create(&pool, &new_workflow("sticker", "/srv/wf/sticker"))
        .await
        .unwrap();
    let run = WorkflowRunRepo::create(&pool, &new_run(wf.id)).await.unwrap();

    assert!(WorkflowRunRepo::mark_stopped(&pool, &run.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn repeated_launches_create_distinct_runs() {
    let pool = test_pool().await;
    let wf = WorkflowRepo::create(&pool, &new_workflow("sticker", "/srv/wf/sticker"))
        .await
        .unwrap();

    let first = WorkflowRunRepo::create(&pool, &new_run(wf.id)).await.unwrap();
    let second = WorkflowRunRepo::create(&pool, &new_run(wf.id)).await.unwrap();
    assert_ne!(first.id, second.id);

    let runs = WorkflowRunRepo::list_by_workflow(&pool, wf.id).await.unwrap();
    assert_eq!(runs.len(), 2);

    let pending = WorkflowRunRepo::list_by_status(&pool, RunStatus::Pending)
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);
}

#[tokio::test]
async fn run_for_unknown_workflow_violates_foreign_key() {
    let pool = test_pool().await;
    let err = WorkflowRunRepo::create(&pool, &new_run(999)).await.unwrap_err();
    assert_matches!(err, sqlx::Error::Database(_));
}
