//! HTTP client for the workflow API.
//!
//! Two calls: list the installed workflows and launch one. Listing goes
//! through a [`Memo`] keyed by request URL, shared by every clone of the
//! client.

use std::sync::Arc;

use wfm_core::error::CoreError;
use wfm_core::launch::{LaunchRequest, LaunchResult};
use wfm_core::workflow::WorkflowList;

use crate::memo::Memo;

/// Errors from talking to the workflow API.
///
/// Cheap to clone so one failed request can be reported to every caller
/// that was waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(Arc<reqwest::Error>),

    /// The server answered with a non-2xx status code.
    #[error("API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response body was not the expected shape.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The base URL cannot carry a request path.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(Arc::new(err))
    }
}

impl From<CoreError> for ClientError {
    fn from(err: CoreError) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Client for `GET /api/workflows` and `POST /api/workflows/{id}/run`.
#[derive(Clone)]
pub struct WorkflowsClient {
    client: reqwest::Client,
    base_url: String,
    lists: Arc<Memo<WorkflowList, ClientError>>,
}

impl WorkflowsClient {
    /// Create a client for the API at `base_url`, e.g.
    /// `http://127.0.0.1:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            lists: Arc::new(Memo::new()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of the workflow collection.
    pub fn workflows_url(&self) -> String {
        format!("{}/api/workflows", self.base_url)
    }

    /// URL that launches the workflow `id`.
    /// The id is percent-encoded as a single path segment.
    pub fn launch_url(&self, id: &str) -> Result<reqwest::Url, ClientError> {
        let workflows_url = self.workflows_url();
        let mut url = reqwest::Url::parse(&workflows_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{workflows_url}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(workflows_url.clone()))?
            .pop_if_empty()
            .push(id)
            .push("run");
        Ok(url)
    }

    /// Fetch the workflow list.
    ///
    /// Concurrent calls share one request. Records that fail validation
    /// come back in [`WorkflowList::quarantined`] instead of failing the
    /// whole list.
    pub async fn list_workflows(&self) -> Result<WorkflowList, ClientError> {
        let url = self.workflows_url();
        let client = self.client.clone();
        let request_url = url.clone();

        self.lists
            .fetch(&url, move || async move {
                tracing::debug!(url = %request_url, "Fetching workflow list");
                let response = client.get(&request_url).send().await?;
                let body: serde_json::Value = Self::parse_response(response).await?;
                let list = WorkflowList::from_response(body)?;
                if !list.quarantined.is_empty() {
                    tracing::warn!(
                        count = list.quarantined.len(),
                        "Quarantined malformed workflow records",
                    );
                }
                Ok::<_, ClientError>(list)
            })
            .await
    }

    /// Last successfully fetched workflow list, without a request.
    pub fn cached_workflows(&self) -> Option<WorkflowList> {
        self.lists.cached(&self.workflows_url())
    }

    /// Launch workflow `id`. The request body carries the advisory timeout
    /// if one is set.
    pub async fn launch_workflow(
        &self,
        id: &str,
        request: &LaunchRequest,
    ) -> Result<LaunchResult, ClientError> {
        let url = self.launch_url(id)?;
        tracing::debug!(url = %url, timeout = ?request.timeout, "Launching workflow");

        let response = self.client.post(url).json(request).send().await?;
        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ClientError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ClientError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let client = WorkflowsClient::new("http://127.0.0.1:3000/");
        assert_eq!(client.base_url(), "http://127.0.0.1:3000");
        assert_eq!(client.workflows_url(), "http://127.0.0.1:3000/api/workflows");
        assert_eq!(
            client.launch_url("w1").unwrap().as_str(),
            "http://127.0.0.1:3000/api/workflows/w1/run"
        );
    }

    #[test]
    fn launch_url_encodes_the_id_as_one_segment() {
        let client = WorkflowsClient::new("http://127.0.0.1:3000");
        assert_eq!(
            client.launch_url("a/b?c#d").unwrap().as_str(),
            "http://127.0.0.1:3000/api/workflows/a%2Fb%3Fc%23d/run"
        );
        assert_eq!(
            client.launch_url("two words").unwrap().as_str(),
            "http://127.0.0.1:3000/api/workflows/two%20words/run"
        );
    }

    #[test]
    fn unparseable_base_is_an_invalid_url() {
        let client = WorkflowsClient::new("not a url");
        assert!(matches!(client.launch_url("w1"), Err(ClientError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_request_error() {
        // Port 9 (discard) never serves HTTP.
        let client = WorkflowsClient::new("http://127.0.0.1:9");
        let err = client.list_workflows().await.unwrap_err();
        assert!(matches!(err, ClientError::Request(_)));
        assert!(client.cached_workflows().is_none());
    }
}
