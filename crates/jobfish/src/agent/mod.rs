//! Outbound calls to the remote browser-automation agent.
//!
//! [`AgentClient`] is the seam the orchestrator depends on; [`http`] holds
//! the production implementation. Neither performs retries.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::jobs::{Job, JobBoard};

pub mod error;
pub mod goal;
pub mod http;
pub mod sse;

pub use error::AgentError;
pub use http::HttpAgentClient;

fn default_boards() -> Vec<JobBoard> {
    vec![JobBoard::Greenhouse, JobBoard::Lever, JobBoard::Indeed]
}

fn default_true() -> bool {
    true
}

fn default_max_results() -> u32 {
    5
}

/// What to search for, and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub query: String,
    #[serde(default)]
    pub location: String,
    #[serde(default = "default_boards")]
    pub boards: Vec<JobBoard>,
    #[serde(default = "default_true")]
    pub remote_ok: bool,
    #[serde(default)]
    pub min_salary: Option<u32>,
    /// Per-board cap on the number of postings requested.
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            location: location.into(),
            boards: default_boards(),
            remote_ok: true,
            min_salary: None,
            max_results: default_max_results(),
        }
    }

    pub fn with_boards(mut self, boards: Vec<JobBoard>) -> Self {
        self.boards = boards;
        self
    }
}

/// Applicant details forwarded verbatim to the agent.
///
/// Never stored and never logged; `Debug` only shows the name initial.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantProfile {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub location: String,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub years_experience: u32,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub education: String,
    #[serde(default)]
    pub most_recent_role: String,
    #[serde(default)]
    pub most_recent_company: String,
}

impl fmt::Debug for ApplicantProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let initial = self.full_name.chars().next().unwrap_or('?');
        f.debug_struct("ApplicantProfile")
            .field("full_name", &format_args!("{}***", initial))
            .field("email", &crate::sanitize::redact_email(&self.email))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub jobs: Vec<Job>,
    /// Live view of the browsing session the agent opened to search.
    pub streaming_url: Option<String>,
}

/// How an agent run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteOutcome {
    pub success: bool,
    pub message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub result_url: Option<String>,
}

impl RemoteOutcome {
    pub fn submitted(result: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            message: None,
            result,
            result_url: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            result: None,
            result_url: None,
        }
    }
}

/// Resolves once the agent reports the end of an acknowledged run.
///
/// Resolves to `None` if the run's stream ended without a verdict; the
/// application then stays `streaming` until something else finalizes it.
#[derive(Debug)]
pub struct CompletionHandle {
    rx: oneshot::Receiver<RemoteOutcome>,
}

/// Sending half of a [`CompletionHandle`].
#[derive(Debug)]
pub struct CompletionSender {
    tx: oneshot::Sender<RemoteOutcome>,
}

impl CompletionHandle {
    pub fn channel() -> (CompletionSender, CompletionHandle) {
        let (tx, rx) = oneshot::channel();
        (CompletionSender { tx }, CompletionHandle { rx })
    }

    pub async fn wait(self) -> Option<RemoteOutcome> {
        self.rx.await.ok()
    }
}

impl CompletionSender {
    /// Delivers the outcome. Returns `false` if nobody is waiting.
    pub fn complete(self, outcome: RemoteOutcome) -> bool {
        self.tx.send(outcome).is_ok()
    }
}

/// What the agent said when it accepted an apply request.
#[derive(Debug)]
pub enum ApplyCompletion {
    /// The run already finished before a live session was offered.
    Immediate(RemoteOutcome),
    /// The run is ongoing; the handle fires when it ends.
    Pending(CompletionHandle),
    /// The agent gives no completion signal for this run.
    Unknown,
}

#[derive(Debug)]
pub struct ApplyResult {
    /// The agent's id for the run, when it assigned one.
    pub remote_id: Option<String>,
    pub streaming_url: Option<String>,
    pub completion: ApplyCompletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteState {
    Running,
    Completed,
    Failed,
}

/// Answer to a status check on a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteStatus {
    pub state: RemoteState,
    pub result_url: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// The remote automation agent.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Searches the query's boards for postings.
    async fn search(&self, query: &SearchQuery) -> Result<SearchResult, AgentError>;

    /// Starts an application run for `job`. Returns once the agent has
    /// acknowledged the run, not when the run finishes.
    async fn apply(&self, job: &Job, applicant: &ApplicantProfile)
        -> Result<ApplyResult, AgentError>;
}

/// Reports the state of an agent run, for polling collaborators.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn check_status(&self, remote_id: &str) -> Result<RemoteStatus, AgentError>;
}
