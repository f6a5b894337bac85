//! The seam between run bookkeeping and actually starting an instance.
//!
//! [`RunManager`](crate::manager::RunManager) only talks to
//! [`InstanceLauncher`]; production uses [`ProcessLauncher`], which spawns
//! ComfyUI and waits for it to answer HTTP.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::ComfyUIApi;
use crate::runner::{ProcessRunner, ProcessSpec, RunnerError};

/// Interval between readiness probes during startup.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Request to start one instance.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub run_id: String,
    pub workflow_dir: PathBuf,
    pub run_dir: PathBuf,
    pub port: u16,
}

/// Starts instances.
#[async_trait]
pub trait InstanceLauncher: Send + Sync {
    /// Start an instance and return once it is serving.
    async fn launch(&self, spec: LaunchSpec) -> Result<Box<dyn RunningInstance>, RunnerError>;
}

/// A started instance that can be torn down.
#[async_trait]
pub trait RunningInstance: Send + Sync {
    async fn teardown(&mut self) -> Result<(), RunnerError>;
}

// ---------------------------------------------------------------------------
// Process-backed launcher
// ---------------------------------------------------------------------------

/// Launches ComfyUI as a child process of this server.
pub struct ProcessLauncher {
    python: String,
    bind_host: String,
    startup_timeout: Duration,
    http: reqwest::Client,
}

impl ProcessLauncher {
    pub fn new(python: String, bind_host: String, startup_timeout: Duration) -> Self {
        Self {
            python,
            bind_host,
            startup_timeout,
            http: reqwest::Client::new(),
        }
    }

    /// Poll until the instance answers, the process dies, or the startup
    /// deadline passes.
    async fn wait_ready(
        &self,
        runner: &mut ProcessRunner,
        api: &ComfyUIApi,
    ) -> Result<(), RunnerError> {
        let deadline = tokio::time::Instant::now() + self.startup_timeout;

        loop {
            if let Some(status) = runner.exit_status() {
                return Err(RunnerError::ExitedEarly(status));
            }
            if api.is_ready().await {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(RunnerError::StartupTimeout(self.startup_timeout));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Address the readiness probe connects to. A wildcard bind is probed
    /// over loopback.
    fn probe_host(&self) -> &str {
        match self.bind_host.as_str() {
            "0.0.0.0" | "::" => "127.0.0.1",
            other => other,
        }
    }
}

#[async_trait]
impl InstanceLauncher for ProcessLauncher {
    async fn launch(&self, spec: LaunchSpec) -> Result<Box<dyn RunningInstance>, RunnerError> {
        let process_spec = ProcessSpec {
            python: self.python.clone(),
            workflow_dir: spec.workflow_dir,
            run_dir: spec.run_dir,
            bind_host: self.bind_host.clone(),
            port: spec.port,
        };

        let mut runner = ProcessRunner::spawn(&process_spec).await?;
        let api = ComfyUIApi::with_client(
            self.http.clone(),
            format!("http://{}:{}", self.probe_host(), spec.port),
        );

        if let Err(e) = self.wait_ready(&mut runner, &api).await {
            tracing::warn!(
                run_id = %spec.run_id,
                log = %runner.log_path().display(),
                error = %e,
                "ComfyUI failed to start",
            );
            if let Err(teardown_err) = runner.teardown().await {
                tracing::error!(run_id = %spec.run_id, error = %teardown_err, "Cleanup after failed start");
            }
            return Err(e);
        }

        tracing::info!(run_id = %spec.run_id, pid = ?runner.pid(), "ComfyUI ready");
        Ok(Box::new(ProcessInstance { runner, api }))
    }
}

struct ProcessInstance {
    runner: ProcessRunner,
    api: ComfyUIApi,
}

#[async_trait]
impl RunningInstance for ProcessInstance {
    async fn teardown(&mut self) -> Result<(), RunnerError> {
        if let Err(e) = self.api.interrupt().await {
            tracing::debug!(error = %e, "Interrupt before teardown failed");
        }
        self.runner.teardown().await
    }
}
