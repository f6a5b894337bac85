//! Launch request and response bodies for `POST /api/workflows/{id}/run`.

use serde::{Deserialize, Serialize};

/// Timeout hint the dashboard sends with every launch (milliseconds).
///
/// Advisory only: the client never enforces it.
pub const DEFAULT_LAUNCH_TIMEOUT_MS: u64 = 30_000;

/// Optional body of a launch request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl LaunchRequest {
    pub fn with_timeout_ms(timeout: u64) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Connection details of a freshly started run.
///
/// Unknown response fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchResult {
    pub run_id: String,
    pub host: String,
    pub port: u16,
}

impl LaunchResult {
    /// Address of the embedded frame: `http://{host}:{port}`, taken from
    /// the response fields verbatim.
    pub fn frame_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
