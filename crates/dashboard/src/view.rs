//! Dashboard view state.
//!
//! The page is either loading, failed, or a list of cards. Each card owns
//! the launch state of exactly one workflow; launching or retrying touches
//! that card and no other.
//!
//! A launch is three steps so several cards can launch at once:
//! [`Dashboard::begin_launch`] marks the card pending and hands out a
//! [`LaunchTicket`], [`LaunchTicket::send`] talks to the API without
//! borrowing the dashboard, and [`Dashboard::complete_launch`] records the
//! outcome on the card it came from.
//!
//! Card launch states:
//!
//! ```text
//! idle --launch--> pending --ok--> has-result --launch--> pending
//!                     |
//!                     +--err--> failed --retry--> pending
//! ```

use wfm_core::error::CoreError;
use wfm_core::launch::{LaunchRequest, LaunchResult, DEFAULT_LAUNCH_TIMEOUT_MS};
use wfm_core::workflow::{QuarantinedRecord, Workflow, WorkflowList};

use crate::client::{ClientError, WorkflowsClient};

// ---------------------------------------------------------------------------
// Card
// ---------------------------------------------------------------------------

/// Launch state of one card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchState {
    Idle,
    Pending,
    HasResult(LaunchResult),
    Failed { message: String },
}

impl LaunchState {
    pub fn result(&self) -> Option<&LaunchResult> {
        match self {
            Self::HasResult(result) => Some(result),
            _ => None,
        }
    }
}

/// One workflow and its launch state.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub workflow: Workflow,
    pub launch: LaunchState,
}

impl Card {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            launch: LaunchState::Idle,
        }
    }

    pub fn id(&self) -> &str {
        &self.workflow.id
    }

    /// Enter `pending`. A card already waiting on a launch refuses.
    pub fn begin_launch(&mut self) -> Result<(), CoreError> {
        if self.launch == LaunchState::Pending {
            return Err(CoreError::Conflict(format!(
                "workflow {} is already launching",
                self.workflow.id
            )));
        }
        self.launch = LaunchState::Pending;
        Ok(())
    }

    /// Retry after a failed launch. Only valid from `failed`.
    pub fn begin_retry(&mut self) -> Result<(), CoreError> {
        match self.launch {
            LaunchState::Failed { .. } => {
                self.launch = LaunchState::Pending;
                Ok(())
            }
            _ => Err(CoreError::Conflict(format!(
                "workflow {} has no failed launch to retry",
                self.workflow.id
            ))),
        }
    }

    /// Leave `pending` with the outcome of the launch request.
    pub fn complete_launch(
        &mut self,
        outcome: Result<LaunchResult, ClientError>,
    ) -> Result<(), CoreError> {
        if self.launch != LaunchState::Pending {
            return Err(CoreError::Conflict(format!(
                "workflow {} has no launch in flight",
                self.workflow.id
            )));
        }
        self.launch = match outcome {
            Ok(result) => LaunchState::HasResult(result),
            Err(e) => LaunchState::Failed {
                message: e.to_string(),
            },
        };
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// State of the workflow list.
#[derive(Debug, Clone, PartialEq)]
pub enum ListState {
    Loading,
    Failed { message: String },
    Loaded {
        cards: Vec<Card>,
        quarantined: Vec<QuarantinedRecord>,
    },
}

impl ListState {
    fn loaded(list: WorkflowList) -> Self {
        Self::Loaded {
            cards: list.workflows.into_iter().map(Card::new).collect(),
            quarantined: list.quarantined,
        }
    }

    pub fn cards(&self) -> &[Card] {
        match self {
            Self::Loaded { cards, .. } => cards,
            _ => &[],
        }
    }

    pub fn card(&self, id: &str) -> Option<&Card> {
        self.cards().iter().find(|card| card.id() == id)
    }

    pub fn card_mut(&mut self, id: &str) -> Option<&mut Card> {
        match self {
            Self::Loaded { cards, .. } => cards.iter_mut().find(|card| card.id() == id),
            _ => None,
        }
    }
}

/// A launch request for one card, detached from the [`Dashboard`].
#[must_use = "a ticket leaves its card pending until its outcome is completed"]
pub struct LaunchTicket {
    workflow_id: String,
    client: WorkflowsClient,
    request: LaunchRequest,
}

impl LaunchTicket {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Send the launch request.
    pub async fn send(self) -> LaunchOutcome {
        let result = self
            .client
            .launch_workflow(&self.workflow_id, &self.request)
            .await;
        match &result {
            Ok(launched) => tracing::info!(
                workflow_id = %self.workflow_id,
                run_id = %launched.run_id,
                "Workflow launched"
            ),
            Err(e) => tracing::warn!(workflow_id = %self.workflow_id, error = %e, "Workflow launch failed"),
        }

        LaunchOutcome {
            workflow_id: self.workflow_id,
            result,
        }
    }
}

/// What came back for one [`LaunchTicket`].
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub workflow_id: String,
    pub result: Result<LaunchResult, ClientError>,
}

/// The workflow dashboard: one list, one card per workflow.
pub struct Dashboard {
    client: WorkflowsClient,
    state: ListState,
    launch_request: LaunchRequest,
}

impl Dashboard {
    /// A dashboard that sends the default advisory timeout with launches.
    pub fn new(client: WorkflowsClient) -> Self {
        Self::with_launch_request(client, LaunchRequest::with_timeout_ms(DEFAULT_LAUNCH_TIMEOUT_MS))
    }

    pub fn with_launch_request(client: WorkflowsClient, launch_request: LaunchRequest) -> Self {
        Self {
            client,
            state: ListState::Loading,
            launch_request,
        }
    }

    pub fn state(&self) -> &ListState {
        &self.state
    }

    /// Load the workflow list.
    ///
    /// Reuses the client's last known list when there is one; otherwise
    /// fetches. A failed fetch is final for this dashboard.
    pub async fn mount(&mut self) -> &ListState {
        if let Some(list) = self.client.cached_workflows() {
            tracing::debug!("Mounting from cached workflow list");
            self.state = ListState::loaded(list);
            return &self.state;
        }

        self.state = ListState::Loading;
        self.state = match self.client.list_workflows().await {
            Ok(list) => {
                tracing::info!(count = list.workflows.len(), "Workflow list loaded");
                ListState::loaded(list)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Workflow list failed to load");
                ListState::Failed {
                    message: e.to_string(),
                }
            }
        };
        &self.state
    }

    /// Mark card `id` pending and return the request to send for it.
    pub fn begin_launch(&mut self, id: &str) -> Result<LaunchTicket, CoreError> {
        self.card_mut(id)?.begin_launch()?;
        Ok(self.ticket(id))
    }

    /// Like [`Dashboard::begin_launch`], for a card whose launch failed.
    pub fn begin_retry(&mut self, id: &str) -> Result<LaunchTicket, CoreError> {
        self.card_mut(id)?.begin_retry()?;
        Ok(self.ticket(id))
    }

    /// Record a launch outcome on the card it was issued for.
    pub fn complete_launch(&mut self, outcome: LaunchOutcome) -> Result<&Card, CoreError> {
        let card = self.card_mut(&outcome.workflow_id)?;
        card.complete_launch(outcome.result)?;
        Ok(card)
    }

    /// Launch the workflow shown on card `id` and wait for the outcome.
    pub async fn launch(&mut self, id: &str) -> Result<&Card, CoreError> {
        let outcome = self.begin_launch(id)?.send().await;
        self.complete_launch(outcome)
    }

    /// Retry a failed launch on card `id` and wait for the outcome.
    pub async fn retry(&mut self, id: &str) -> Result<&Card, CoreError> {
        let outcome = self.begin_retry(id)?.send().await;
        self.complete_launch(outcome)
    }

    fn ticket(&self, id: &str) -> LaunchTicket {
        LaunchTicket {
            workflow_id: id.to_string(),
            client: self.client.clone(),
            request: self.launch_request.clone(),
        }
    }

    fn card_mut(&mut self, id: &str) -> Result<&mut Card, CoreError> {
        self.state
            .card_mut(id)
            .ok_or_else(|| CoreError::not_found("Workflow", id))
    }
}
