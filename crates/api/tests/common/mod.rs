//! Shared helpers for API integration tests.
//!
//! Each test gets its own in-memory SQLite database with migrations applied
//! and a [`RunManager`] backed by a fake launcher, so no ComfyUI process is
//! ever started.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use wfm_api::config::ServerConfig;
use wfm_api::router::build_app_router;
use wfm_api::state::AppState;
use wfm_comfyui::config::LauncherConfig;
use wfm_comfyui::launcher::{InstanceLauncher, LaunchSpec, RunningInstance};
use wfm_comfyui::manager::RunManager;
use wfm_comfyui::runner::RunnerError;
use wfm_db::DbPool;

/// Host every fake run reports back to clients.
pub const PUBLIC_HOST: &str = "10.0.0.5";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
    }
}

/// Launcher config with a port range unlikely to collide with the host.
pub fn test_launcher_config() -> LauncherConfig {
    LauncherConfig {
        public_host: PUBLIC_HOST.to_string(),
        port_range: 21100..=21199,
        run_root: std::env::temp_dir().join("wfm-api-tests"),
        max_lifetime: Duration::from_secs(3600),
        ..LauncherConfig::default()
    }
}

/// Launcher that starts nothing. Flip `fail` to make launches error.
#[derive(Default)]
pub struct FakeLauncher {
    pub fail: AtomicBool,
    pub launches: AtomicUsize,
    pub teardowns: Arc<AtomicUsize>,
}

struct FakeInstance {
    teardowns: Arc<AtomicUsize>,
}

#[async_trait]
impl InstanceLauncher for FakeLauncher {
    async fn launch(&self, _spec: LaunchSpec) -> Result<Box<dyn RunningInstance>, RunnerError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RunnerError::ExitedEarly("exit status: 1".into()));
        }
        Ok(Box::new(FakeInstance {
            teardowns: Arc::clone(&self.teardowns),
        }))
    }
}

#[async_trait]
impl RunningInstance for FakeInstance {
    async fn teardown(&mut self) -> Result<(), RunnerError> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Everything a test needs to drive and inspect the service.
pub struct TestApp {
    pub router: Router,
    pub pool: DbPool,
    pub launcher: Arc<FakeLauncher>,
    pub run_manager: Arc<RunManager>,
}

/// Build the full application router on a fresh database.
///
/// Uses [`build_app_router`] so integration tests exercise the same
/// middleware stack (CORS, request ID, timeout, tracing, panic recovery)
/// that production uses.
pub async fn build_test_app() -> TestApp {
    let pool = wfm_db::create_memory_pool().await.unwrap();
    wfm_db::run_migrations(&pool).await.unwrap();

    let launcher = Arc::new(FakeLauncher::default());
    let run_manager = RunManager::start(
        pool.clone(),
        Arc::clone(&launcher) as Arc<dyn InstanceLauncher>,
        &test_launcher_config(),
    )
    .await;

    let config = test_config();
    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        run_manager: Arc::clone(&run_manager),
    };

    TestApp {
        router: build_app_router(state, &config),
        pool,
        launcher,
        run_manager,
    }
}

/// Register a workflow through the API and return its string id.
pub async fn register_workflow(app: &TestApp, name: &str, dir: &str) -> String {
    let response = post_json(
        app.router.clone(),
        "/api/workflows",
        serde_json::json!({ "name": name, "workflow_dir": dir }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    json["id"].as_str().unwrap().to_string()
}

/// Send a GET request.
pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request with a JSON body.
pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request with no body.
pub async fn post_empty(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
