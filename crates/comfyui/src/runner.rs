//! Spawning and tearing down a ComfyUI process.
//!
//! A run executes `{python} main.py --listen {host} --port {port}` inside
//! the workflow's `ComfyUI` directory. Output goes to `{run_dir}/log`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

/// Grace period between the terminate signal and a forced kill.
pub const PROC_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from spawning or stopping an instance.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Workflow directory {0} does not exist")]
    MissingWorkflowDir(PathBuf),

    #[error("Failed to prepare run directory: {0}")]
    RunDir(std::io::Error),

    #[error("Failed to spawn ComfyUI: {0}")]
    Spawn(std::io::Error),

    #[error("ComfyUI exited during startup with {0}")]
    ExitedEarly(String),

    #[error("ComfyUI did not become ready within {0:?}")]
    StartupTimeout(Duration),

    #[error("Failed to stop ComfyUI: {0}")]
    Teardown(std::io::Error),
}

/// Everything needed to start one instance.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub python: String,
    pub workflow_dir: PathBuf,
    pub run_dir: PathBuf,
    pub bind_host: String,
    pub port: u16,
}

impl ProcessSpec {
    /// The directory `main.py` runs from: `{workflow_dir}/ComfyUI` when it
    /// exists, else the workflow directory itself.
    pub fn working_dir(&self) -> PathBuf {
        let comfy = self.workflow_dir.join("ComfyUI");
        if comfy.is_dir() {
            comfy
        } else {
            self.workflow_dir.clone()
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.run_dir.join("log")
    }

    pub fn args(&self) -> Vec<String> {
        vec![
            "main.py".into(),
            "--listen".into(),
            self.bind_host.clone(),
            "--port".into(),
            self.port.to_string(),
        ]
    }
}

/// A spawned ComfyUI process.
#[derive(Debug)]
pub struct ProcessRunner {
    child: Child,
    log_path: PathBuf,
}

impl ProcessRunner {
    /// Start the process described by `spec`.
    pub async fn spawn(spec: &ProcessSpec) -> Result<Self, RunnerError> {
        if !spec.workflow_dir.is_dir() {
            return Err(RunnerError::MissingWorkflowDir(spec.workflow_dir.clone()));
        }
        tokio::fs::create_dir_all(&spec.run_dir)
            .await
            .map_err(RunnerError::RunDir)?;

        let log_path = spec.log_path();
        let log = std::fs::File::create(&log_path).map_err(RunnerError::RunDir)?;
        let log_err = log.try_clone().map_err(RunnerError::RunDir)?;

        let working_dir = spec.working_dir();
        tracing::info!(
            python = %spec.python,
            cwd = %working_dir.display(),
            port = spec.port,
            "Spawning ComfyUI",
        );

        let child = Command::new(&spec.python)
            .args(spec.args())
            .current_dir(&working_dir)
            .env("PYTHONENCODING", "utf-8")
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true)
            .spawn()
            .map_err(RunnerError::Spawn)?;

        Ok(Self { child, log_path })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// If the process has already exited, describe how.
    pub fn exit_status(&mut self) -> Option<String> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.to_string()),
            Ok(None) => None,
            Err(e) => Some(format!("unknown status ({e})")),
        }
    }

    /// Terminate, wait up to [`PROC_SHUTDOWN_TIMEOUT`], then force kill.
    pub async fn teardown(&mut self) -> Result<(), RunnerError> {
        if self.exit_status().is_some() {
            return Ok(());
        }

        self.terminate();

        match tokio::time::timeout(PROC_SHUTDOWN_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(pid = ?self.pid(), %status, "ComfyUI terminated");
                Ok(())
            }
            Ok(Err(e)) => Err(RunnerError::Teardown(e)),
            Err(_elapsed) => {
                tracing::warn!(pid = ?self.pid(), "ComfyUI ignored terminate, killing");
                self.child.kill().await.map_err(RunnerError::Teardown)
            }
        }
    }

    #[cfg(unix)]
    fn terminate(&mut self) {
        if let Some(pid) = self.child.id() {
            // SAFETY: plain signal delivery to a child we own.
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc != 0 {
                tracing::warn!(pid, "SIGTERM delivery failed");
            }
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) {
        let _ = self.child.start_kill();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    /// A workflow dir whose `main.py` is a shell script, run with `sh`.
    fn fake_workflow(script: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), script).unwrap();
        dir
    }

    fn spec_for(workflow: &Path, run_dir: &Path) -> ProcessSpec {
        ProcessSpec {
            python: "sh".into(),
            workflow_dir: workflow.to_path_buf(),
            run_dir: run_dir.to_path_buf(),
            bind_host: "127.0.0.1".into(),
            port: 8188,
        }
    }

    #[test]
    fn args_match_comfyui_cli() {
        let spec = spec_for(Path::new("/w"), Path::new("/r"));
        assert_eq!(
            spec.args(),
            ["main.py", "--listen", "127.0.0.1", "--port", "8188"]
        );
        assert_eq!(spec.log_path(), Path::new("/r/log"));
    }

    #[test]
    fn working_dir_prefers_comfyui_subdir() {
        let workflow = tempfile::tempdir().unwrap();
        let spec = spec_for(workflow.path(), Path::new("/r"));
        assert_eq!(spec.working_dir(), workflow.path());

        std::fs::create_dir(workflow.path().join("ComfyUI")).unwrap();
        assert_eq!(spec.working_dir(), workflow.path().join("ComfyUI"));
    }

    #[tokio::test]
    async fn missing_workflow_dir_is_rejected() {
        let run = tempfile::tempdir().unwrap();
        let spec = spec_for(Path::new("/definitely/not/here"), run.path());
        assert_matches!(
            ProcessRunner::spawn(&spec).await,
            Err(RunnerError::MissingWorkflowDir(_))
        );
    }

    #[tokio::test]
    async fn output_goes_to_log_file() {
        let workflow = fake_workflow("echo \"started on $4\"\n");
        let run = tempfile::tempdir().unwrap();
        let spec = spec_for(workflow.path(), &run.path().join("r1"));

        let mut runner = ProcessRunner::spawn(&spec).await.unwrap();
        runner.child.wait().await.unwrap();

        let log = std::fs::read_to_string(runner.log_path()).unwrap();
        assert!(log.contains("started on 8188"), "log was: {log}");
    }

    #[tokio::test]
    async fn teardown_stops_long_running_process() {
        let workflow = fake_workflow("sleep 30\n");
        let run = tempfile::tempdir().unwrap();
        let spec = spec_for(workflow.path(), run.path());

        let mut runner = ProcessRunner::spawn(&spec).await.unwrap();
        assert!(runner.exit_status().is_none());

        runner.teardown().await.unwrap();
        assert!(runner.exit_status().is_some());
    }

    #[tokio::test]
    async fn exit_status_reports_early_exit() {
        let workflow = fake_workflow("exit 3\n");
        let run = tempfile::tempdir().unwrap();
        let spec = spec_for(workflow.path(), run.path());

        let mut runner = ProcessRunner::spawn(&spec).await.unwrap();
        runner.child.wait().await.unwrap();
        let status = runner.exit_status().expect("process exited");
        assert!(status.contains('3'), "status was: {status}");
    }
}
