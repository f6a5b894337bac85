//! Run lifecycle events broadcast by the [`RunManager`](crate::manager::RunManager).

use serde::Serialize;
use wfm_core::types::DbId;

/// Why a running instance was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Requested,
    LifetimeExpired,
    Shutdown,
}

/// A lifecycle event for one run.
#[derive(Debug, Clone, Serialize)]
pub enum RunEvent {
    /// The instance answered HTTP and the run is addressable.
    RunStarted {
        run_id: String,
        workflow_id: DbId,
        host: String,
        port: u16,
    },

    /// The instance was torn down.
    RunStopped { run_id: String, reason: StopReason },

    /// The run could not be started.
    RunFailed { run_id: String, error: String },
}
