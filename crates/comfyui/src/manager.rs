//! Run registry and lifecycle orchestration.
//!
//! [`RunManager`] turns "launch workflow X" into a recorded run with its
//! own ComfyUI instance and port. Each live run has a lifetime timer; when
//! it fires the instance is torn down and the run marked `stopped`.
//!
//! Lifecycle events are broadcast via a [`tokio::sync::broadcast`]
//! channel. Call [`RunManager::subscribe`] to receive them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use wfm_core::launch::LaunchResult;
use wfm_core::run::RunStatus;
use wfm_core::types::DbId;
use wfm_db::models::workflow::WorkflowRecord;
use wfm_db::models::workflow_run::CreateWorkflowRun;
use wfm_db::repositories::WorkflowRunRepo;
use wfm_db::DbPool;

use crate::config::LauncherConfig;
use crate::events::{RunEvent, StopReason};
use crate::launcher::{InstanceLauncher, LaunchSpec, RunningInstance};
use crate::ports::PortAllocator;
use crate::runner::RunnerError;

/// Broadcast channel capacity for run events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Error message recorded for runs orphaned by a server restart.
const ORPHANED_RUN_MESSAGE: &str = "server restarted while the run was live";

/// Owns every live run started by this process.
///
/// Created once at startup via [`RunManager::start`]. The returned `Arc`
/// can be cheaply cloned into request handlers.
pub struct RunManager {
    runs: RwLock<HashMap<String, RunSlot>>,
    pool: DbPool,
    launcher: Arc<dyn InstanceLauncher>,
    ports: PortAllocator,
    public_host: String,
    run_root: PathBuf,
    max_lifetime: Duration,
    event_tx: broadcast::Sender<RunEvent>,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
}

/// Registry entry for a run started by this process.
enum RunSlot {
    /// The instance is still coming up.
    Starting,
    Live(ManagedRun),
}

/// Internal bookkeeping for one live run.
struct ManagedRun {
    workflow_id: DbId,
    port: u16,
    instance: Box<dyn RunningInstance>,
    /// Cancels this run's lifetime timer (child of the master token).
    cancel: CancellationToken,
}

/// A snapshot of one live run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ActiveRun {
    pub run_id: String,
    pub workflow_id: DbId,
    pub port: u16,
}

/// Errors that can occur when interacting with the manager.
#[derive(Debug, thiserror::Error)]
pub enum RunManagerError {
    #[error("No free port left in the configured range")]
    PortsExhausted,

    #[error("Failed to start ComfyUI: {0}")]
    LaunchFailed(#[from] RunnerError),

    #[error("Run {0} not found")]
    RunNotFound(String),

    #[error("Run {run_id} is already {status}")]
    AlreadyFinished { run_id: String, status: RunStatus },

    #[error("Run {0} is still starting")]
    StillStarting(String),

    #[error("Launch aborted: {0}")]
    Aborted(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RunManager {
    /// Build the manager and fail any runs a previous process left live.
    pub async fn start(
        pool: DbPool,
        launcher: Arc<dyn InstanceLauncher>,
        config: &LauncherConfig,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let manager = Arc::new(Self {
            runs: RwLock::new(HashMap::new()),
            pool,
            launcher,
            ports: PortAllocator::new(config.bind_host.clone(), config.port_range.clone()),
            public_host: config.public_host.clone(),
            run_root: config.run_root.clone(),
            max_lifetime: config.max_lifetime,
            event_tx,
            cancel: CancellationToken::new(),
        });

        manager.fail_orphaned_runs().await;
        manager
    }

    /// Subscribe to run lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.event_tx.subscribe()
    }

    /// Snapshot of all live runs, ordered by run id. Runs still starting
    /// are not listed.
    pub async fn active_runs(&self) -> Vec<ActiveRun> {
        let runs = self.runs.read().await;
        let mut active: Vec<_> = runs
            .iter()
            .filter_map(|(run_id, slot)| match slot {
                RunSlot::Live(managed) => Some(ActiveRun {
                    run_id: run_id.clone(),
                    workflow_id: managed.workflow_id,
                    port: managed.port,
                }),
                RunSlot::Starting => None,
            })
            .collect();
        active.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        active
    }

    /// Start a new run of `workflow`.
    ///
    /// Every call creates a distinct run, even for the same workflow.
    /// `timeout_ms` is the client's hint and is stored as received.
    ///
    /// The launch runs on its own task. Dropping the returned future does
    /// not abandon the run: it still ends up `running` or `failed`, and its
    /// port is released on failure.
    pub async fn launch(
        self: &Arc<Self>,
        workflow: &WorkflowRecord,
        timeout_ms: Option<u64>,
    ) -> Result<LaunchResult, RunManagerError> {
        let manager = Arc::clone(self);
        let workflow = workflow.clone();

        tokio::spawn(async move { manager.launch_run(workflow, timeout_ms).await })
            .await
            .map_err(|e| RunManagerError::Aborted(e.to_string()))?
    }

    /// Stop a run at a client's request.
    pub async fn stop(&self, run_id: &str) -> Result<(), RunManagerError> {
        self.stop_with_reason(run_id, StopReason::Requested).await
    }

    /// Tear down every live run. Waits for each teardown to finish.
    ///
    /// Launches still in flight are cancelled and end `failed`.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down run manager");
        self.cancel.cancel();

        let drained: Vec<_> = self.runs.write().await.drain().collect();
        for (run_id, slot) in drained {
            // Starting runs see the cancelled token and fail themselves.
            if let RunSlot::Live(managed) = slot {
                tracing::info!(run_id = %run_id, "Stopping run");
                self.finish_run(&run_id, managed, StopReason::Shutdown).await;
            }
        }

        tracing::info!("Run manager shut down complete");
    }

    // ---- private helpers ----

    async fn launch_run(
        self: Arc<Self>,
        workflow: WorkflowRecord,
        timeout_ms: Option<u64>,
    ) -> Result<LaunchResult, RunManagerError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let run_cancel = self.cancel.child_token();
        self.runs
            .write()
            .await
            .insert(run_id.clone(), RunSlot::Starting);

        let (port, instance) = match self
            .start_instance(&run_id, &workflow, timeout_ms, &run_cancel)
            .await
        {
            Ok(started) => started,
            Err(e) => {
                self.runs.write().await.remove(&run_id);
                return Err(e);
            }
        };

        let managed = ManagedRun {
            workflow_id: workflow.id,
            port,
            instance,
            cancel: run_cancel.clone(),
        };

        {
            let mut runs = self.runs.write().await;
            if !run_cancel.is_cancelled() {
                runs.insert(run_id.clone(), RunSlot::Live(managed));
                drop(runs);
                return Ok(self.announce_started(run_id, workflow.id, port, run_cancel));
            }
            runs.remove(&run_id);
        }

        // Shutdown began after the instance came up.
        self.finish_run(&run_id, managed, StopReason::Shutdown).await;
        Err(RunManagerError::Aborted("run manager is shutting down".into()))
    }

    /// Record the run, take a port and bring the instance up. Every failure
    /// releases the port and leaves the record `failed`.
    async fn start_instance(
        &self,
        run_id: &str,
        workflow: &WorkflowRecord,
        timeout_ms: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<(u16, Box<dyn RunningInstance>), RunManagerError> {
        let run_dir = self.run_root.join(run_id);

        WorkflowRunRepo::create(
            &self.pool,
            &CreateWorkflowRun {
                id: run_id.to_string(),
                workflow_id: workflow.id,
                timeout_ms: timeout_ms.and_then(|t| i64::try_from(t).ok()),
                run_dir: Some(run_dir.display().to_string()),
            },
        )
        .await?;

        let Some(port) = self.ports.allocate() else {
            self.fail_run(run_id, &RunManagerError::PortsExhausted.to_string())
                .await;
            return Err(RunManagerError::PortsExhausted);
        };

        tracing::info!(run_id, workflow_id = workflow.id, port, "Launching workflow run");

        let spec = LaunchSpec {
            run_id: run_id.to_string(),
            workflow_dir: PathBuf::from(&workflow.workflow_dir),
            run_dir,
            port,
        };

        let launched = tokio::select! {
            launched = self.launcher.launch(spec) => launched,
            _ = cancel.cancelled() => {
                self.ports.release(port);
                let err = RunManagerError::Aborted("run manager is shutting down".into());
                self.fail_run(run_id, &err.to_string()).await;
                return Err(err);
            }
        };

        let instance = match launched {
            Ok(instance) => instance,
            Err(e) => {
                self.ports.release(port);
                self.fail_run(run_id, &e.to_string()).await;
                return Err(e.into());
            }
        };

        match WorkflowRunRepo::mark_running(&self.pool, run_id, &self.public_host, port).await {
            Ok(Some(_)) => Ok((port, instance)),
            Ok(None) => {
                // The record left `pending` while the instance was starting.
                self.discard_instance(run_id, port, instance).await;
                let status = WorkflowRunRepo::find_by_id(&self.pool, run_id)
                    .await?
                    .and_then(|run| run.run_status().ok())
                    .unwrap_or(RunStatus::Failed);
                tracing::warn!(run_id, %status, "Run finished before its instance came up");
                Err(RunManagerError::AlreadyFinished {
                    run_id: run_id.to_string(),
                    status,
                })
            }
            Err(e) => {
                self.discard_instance(run_id, port, instance).await;
                self.fail_run(run_id, &e.to_string()).await;
                Err(e.into())
            }
        }
    }

    /// Start the lifetime timer and tell subscribers the run is live.
    fn announce_started(
        self: &Arc<Self>,
        run_id: String,
        workflow_id: DbId,
        port: u16,
        cancel: CancellationToken,
    ) -> LaunchResult {
        self.spawn_lifetime_timer(run_id.clone(), cancel);

        let _ = self.event_tx.send(RunEvent::RunStarted {
            run_id: run_id.clone(),
            workflow_id,
            host: self.public_host.clone(),
            port,
        });

        LaunchResult {
            run_id,
            host: self.public_host.clone(),
            port,
        }
    }

    /// Tear down an instance that never made it into the registry.
    async fn discard_instance(&self, run_id: &str, port: u16, mut instance: Box<dyn RunningInstance>) {
        if let Err(e) = instance.teardown().await {
            tracing::error!(run_id, error = %e, "Teardown of unregistered instance failed");
        }
        self.ports.release(port);
    }

    async fn stop_with_reason(
        &self,
        run_id: &str,
        reason: StopReason,
    ) -> Result<(), RunManagerError> {
        let managed = {
            let mut runs = self.runs.write().await;
            if matches!(runs.get(run_id), Some(RunSlot::Starting)) {
                return Err(RunManagerError::StillStarting(run_id.to_string()));
            }
            match runs.remove(run_id) {
                Some(RunSlot::Live(managed)) => Some(managed),
                _ => None,
            }
        };

        match managed {
            Some(managed) => {
                self.finish_run(run_id, managed, reason).await;
                Ok(())
            }
            None => {
                // Not live in this process: report based on the record.
                let run = WorkflowRunRepo::find_by_id(&self.pool, run_id)
                    .await?
                    .ok_or_else(|| RunManagerError::RunNotFound(run_id.to_string()))?;
                let status = run.run_status().unwrap_or(RunStatus::Failed);
                if status.is_terminal() {
                    return Err(RunManagerError::AlreadyFinished {
                        run_id: run_id.to_string(),
                        status,
                    });
                }
                // Live status with no instance behind it.
                WorkflowRunRepo::mark_failed(&self.pool, run_id, ORPHANED_RUN_MESSAGE).await?;
                Err(RunManagerError::AlreadyFinished {
                    run_id: run_id.to_string(),
                    status: RunStatus::Failed,
                })
            }
        }
    }

    /// Tear down an instance already removed from the registry.
    async fn finish_run(&self, run_id: &str, mut managed: ManagedRun, reason: StopReason) {
        managed.cancel.cancel();

        if let Err(e) = managed.instance.teardown().await {
            tracing::error!(run_id, error = %e, "Teardown failed");
        }
        self.ports.release(managed.port);

        match WorkflowRunRepo::mark_stopped(&self.pool, run_id).await {
            Ok(Some(_)) => {}
            Ok(None) => tracing::warn!(run_id, "Run was not in running state when stopped"),
            Err(e) => tracing::error!(run_id, error = %e, "Failed to record run stop"),
        }

        tracing::info!(run_id, ?reason, "Run stopped");
        let _ = self.event_tx.send(RunEvent::RunStopped {
            run_id: run_id.to_string(),
            reason,
        });
    }

    async fn fail_run(&self, run_id: &str, error: &str) {
        if let Err(e) = WorkflowRunRepo::mark_failed(&self.pool, run_id, error).await {
            tracing::error!(run_id, error = %e, "Failed to record run failure");
        }
        tracing::warn!(run_id, error, "Run failed to start");
        let _ = self.event_tx.send(RunEvent::RunFailed {
            run_id: run_id.to_string(),
            error: error.to_string(),
        });
    }

    /// Tear the run down once its lifetime elapses, unless stopped first.
    fn spawn_lifetime_timer(self: &Arc<Self>, run_id: String, cancel: CancellationToken) {
        let manager: Weak<Self> = Arc::downgrade(self);
        let lifetime = self.max_lifetime;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(lifetime) => {
                    let Some(manager) = manager.upgrade() else { return };
                    tracing::info!(run_id = %run_id, "Run lifetime expired");
                    if let Err(e) = manager.stop_with_reason(&run_id, StopReason::LifetimeExpired).await {
                        tracing::debug!(run_id = %run_id, error = %e, "Lifetime stop skipped");
                    }
                }
            }
        });
    }

    /// Runs left `pending`/`running` by a previous process have no instance
    /// any more; mark them failed.
    async fn fail_orphaned_runs(&self) {
        for status in [RunStatus::Pending, RunStatus::Running] {
            let orphans = match WorkflowRunRepo::list_by_status(&self.pool, status).await {
                Ok(list) => list,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load orphaned runs");
                    return;
                }
            };
            for run in orphans {
                tracing::warn!(run_id = %run.id, %status, "Failing orphaned run");
                if let Err(e) =
                    WorkflowRunRepo::mark_failed(&self.pool, &run.id, ORPHANED_RUN_MESSAGE).await
                {
                    tracing::error!(run_id = %run.id, error = %e, "Failed to mark orphaned run");
                }
            }
        }
    }
}
