//! The orchestration core: search and apply intents, dedup, and the apply
//! state machine.
//!
//! An apply intent moves its application through
//! `pending → streaming → {submitted, failed}` (or straight to a terminal
//! status). The dedup check and the append run under a per-job lock; the
//! agent call runs under a global permit so the agent is never asked for
//! more than `max_concurrent_applies` sessions at once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::agent::{
    AgentClient, AgentError, ApplicantProfile, ApplyCompletion, ApplyResult, CompletionHandle,
    RemoteOutcome, SearchQuery,
};
use crate::broadcast::{ApplicationEvent, ApplicationEventBroadcaster};
use crate::config::OrchestratorConfig;
use crate::db::{search_repo, Database};
use crate::jobs::{Job, JobStore};
use crate::ledger::{
    Application, ApplicationLedger, ApplicationStatus, ApplicationUpdate, FailureKind,
    FailureReason, LedgerError,
};
use crate::sanitize::redact_email;

mod autopilot;
pub mod error;
pub mod history;
pub mod job_locks;
pub mod status_poller;

pub use autopilot::{AutopilotOutcome, AutopilotReport, AutopilotResult};
pub use error::{Entity, OrchestratorError};
pub use history::SearchRecord;
pub use job_locks::JobLocks;
pub use status_poller::{PollReport, StatusPoller};

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Tunables for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Upper bound on apply calls in flight at the agent.
    pub max_concurrent_applies: usize,
    /// Deadline for a whole search call.
    pub search_timeout: Duration,
    /// Deadline for the agent to acknowledge an apply call. The run itself
    /// may continue long after.
    pub apply_ack_timeout: Duration,
    /// Pause between autopilot apply attempts.
    pub autopilot_pause: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for OrchestratorSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            max_concurrent_applies: config.max_concurrent_applies.max(1),
            search_timeout: Duration::from_secs(config.search_timeout_secs),
            apply_ack_timeout: Duration::from_secs(config.apply_ack_timeout_secs),
            autopilot_pause: Duration::from_millis(config.autopilot_pause_ms),
        }
    }
}

/// Result of a search intent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub search_id: String,
    pub jobs: Vec<Job>,
    /// Live view of the agent's search session, for display only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming_url: Option<String>,
    /// A newer search finished first; these jobs were not stored.
    pub superseded: bool,
}

/// Terminal outcome reported for a streaming application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalOutcome {
    Submitted,
    Failed,
}

/// Arguments to [`Orchestrator::finalize`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finalization {
    pub outcome: FinalOutcome,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

impl Finalization {
    pub fn submitted() -> Self {
        Self {
            outcome: FinalOutcome::Submitted,
            message: None,
            result_url: None,
            result: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: FinalOutcome::Failed,
            message: Some(message.into()),
            result_url: None,
            result: None,
        }
    }

    fn into_update(self) -> ApplicationUpdate {
        let update = match self.outcome {
            FinalOutcome::Submitted => ApplicationUpdate::new(ApplicationStatus::Submitted),
            FinalOutcome::Failed => ApplicationUpdate::failed(FailureReason::new(
                FailureKind::AgentReported,
                self.message
                    .unwrap_or_else(|| "agent reported failure".to_string()),
            )),
        };
        update
            .with_result_url(self.result_url)
            .with_result(self.result)
    }
}

impl From<RemoteOutcome> for Finalization {
    fn from(outcome: RemoteOutcome) -> Self {
        Self {
            outcome: if outcome.success {
                FinalOutcome::Submitted
            } else {
                FinalOutcome::Failed
            },
            message: outcome.message,
            result_url: outcome.result_url,
            result: outcome.result,
        }
    }
}

struct Inner {
    agent: Arc<dyn AgentClient>,
    jobs: Arc<JobStore>,
    ledger: Arc<ApplicationLedger>,
    locks: JobLocks,
    apply_permits: Arc<Semaphore>,
    settings: OrchestratorSettings,
    events: ApplicationEventBroadcaster,
    history: Option<Database>,
}

/// Accepts search and apply intents and answers queries for the UI layer.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        agent: Arc<dyn AgentClient>,
        jobs: Arc<JobStore>,
        ledger: Arc<ApplicationLedger>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self::builder(agent, jobs, ledger, settings).build()
    }

    pub fn builder(
        agent: Arc<dyn AgentClient>,
        jobs: Arc<JobStore>,
        ledger: Arc<ApplicationLedger>,
        settings: OrchestratorSettings,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            agent,
            jobs,
            ledger,
            settings,
            events: None,
            history: None,
        }
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.inner.jobs
    }

    pub fn ledger(&self) -> &Arc<ApplicationLedger> {
        &self.inner.ledger
    }

    pub fn events(&self) -> &ApplicationEventBroadcaster {
        &self.inner.events
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.inner.settings
    }

    /// Runs a search and replaces the job store with its results.
    ///
    /// Dropping the returned future before the agent answers discards the
    /// result. A result that finishes after a newer search is returned
    /// with `superseded` set and is not stored.
    pub async fn search(&self, query: SearchQuery) -> Result<SearchOutcome> {
        let generation = self.inner.jobs.next_generation();
        let span = tracing::info_span!(
            "orchestrator.search",
            generation,
            boards = query.boards.len(),
        );

        async {
            let result = tokio::time::timeout(
                self.inner.settings.search_timeout,
                self.inner.agent.search(&query),
            )
            .await
            .map_err(|_| {
                OrchestratorError::AgentUnavailable(format!(
                    "search timed out after {}s",
                    self.inner.settings.search_timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                tracing::warn!(error = %e, "Search failed");
                OrchestratorError::from(e)
            })?;

            let (snapshot, installed) = self.inner.jobs.offer(generation, result.jobs);
            if !installed {
                tracing::info!("Search was superseded by a newer one");
            }

            let outcome = SearchOutcome {
                search_id: uuid::Uuid::new_v4().to_string(),
                jobs: snapshot.jobs().to_vec(),
                streaming_url: result.streaming_url,
                superseded: !installed,
            };
            if installed {
                self.record_search(&query, &outcome);
            }
            tracing::info!(count = outcome.jobs.len(), "Search finished");
            Ok::<_, OrchestratorError>(outcome)
        }
        .instrument(span)
        .await
    }

    /// Current job store contents, in search order.
    pub fn list_jobs(&self) -> Vec<Job> {
        self.inner.jobs.list()
    }

    /// Applies to a job from the current search results.
    ///
    /// Returns the application whenever one was created, including when
    /// the agent failed or timed out (it is then `failed` with a reason).
    /// Fails with `DuplicateInFlight` if the job already has a pending or
    /// streaming application.
    ///
    /// Once the application exists the agent call runs to completion even
    /// if this future is dropped; in-flight applies cannot be cancelled.
    pub async fn apply(&self, job_id: &str, applicant: &ApplicantProfile) -> Result<Application> {
        let job = self.inner.jobs.get(job_id)?;

        let application = {
            let _guard = self.inner.locks.lock(job_id).await;
            if let Some(existing) = self.inner.ledger.find_non_terminal_by_job(job_id) {
                tracing::debug!(
                    job_id,
                    application_id = %existing.id,
                    "Apply rejected, already in flight"
                );
                return Err(OrchestratorError::DuplicateInFlight {
                    application_id: existing.id,
                    status: existing.status,
                });
            }
            let application = self
                .inner
                .ledger
                .append(Application::for_job(&job))
                .map_err(|e| self.append_error(e))?;
            self.inner.events.send(ApplicationEvent::created(&application));
            application
        };

        let span = tracing::info_span!(
            "orchestrator.apply",
            application_id = %application.id,
            job_id = %job.id,
            applicant = %redact_email(&applicant.email),
        );
        let inner = Arc::clone(&self.inner);
        let application_id = application.id.clone();
        let applicant = applicant.clone();
        let task = tokio::spawn(
            async move { inner.drive_apply(application_id, job, applicant).await }
                .instrument(span),
        );

        match task.await {
            Ok(result) => Ok(result?),
            Err(e) => {
                tracing::error!(error = %e, application_id = %application.id, "Apply task failed");
                let update = ApplicationUpdate::failed(FailureReason::new(
                    FailureKind::AgentUnavailable,
                    "apply task aborted",
                ));
                self.inner
                    .transition(&application.id, update)
                    .or_else(|_| self.inner.ledger.get(&application.id))
                    .map_err(OrchestratorError::from)
            }
        }
    }

    /// Moves a streaming application to a terminal status.
    ///
    /// `id` may be the local application id or the agent's run id.
    pub fn finalize(&self, id: &str, finalization: Finalization) -> Result<Application> {
        self.inner.finalize(id, finalization)
    }

    /// All applications, most recent first.
    pub fn list_applications(&self) -> Vec<Application> {
        self.inner.ledger.list()
    }

    pub fn get_application(&self, id: &str) -> Result<Application> {
        Ok(self.inner.ledger.get(id)?)
    }

    /// Most recent searches first. Empty without a database.
    pub fn list_searches(&self, limit: u32) -> Result<Vec<SearchRecord>> {
        let Some(db) = &self.inner.history else {
            return Ok(Vec::new());
        };
        let rows = search_repo::list_recent(db, limit)?;
        Ok(rows.into_iter().map(SearchRecord::from_row).collect())
    }

    fn record_search(&self, query: &SearchQuery, outcome: &SearchOutcome) {
        let Some(db) = &self.inner.history else {
            return;
        };
        let record = SearchRecord {
            id: outcome.search_id.clone(),
            query: query.query.clone(),
            location: query.location.clone(),
            boards: query.boards.clone(),
            streaming_url: outcome.streaming_url.clone(),
            result_count: u32::try_from(outcome.jobs.len()).unwrap_or(u32::MAX),
            jobs: outcome.jobs.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = record
            .to_row()
            .and_then(|row| search_repo::insert(db, &row))
        {
            tracing::error!(error = %e, "Failed to record search history");
        }
    }

    fn append_error(&self, e: LedgerError) -> OrchestratorError {
        match e {
            LedgerError::Conflict {
                job_id,
                application_id,
            } => {
                let status = self
                    .inner
                    .ledger
                    .find_non_terminal_by_job(&job_id)
                    .map(|a| a.status)
                    .unwrap_or(ApplicationStatus::Pending);
                OrchestratorError::DuplicateInFlight {
                    application_id,
                    status,
                }
            }
            other => other.into(),
        }
    }
}

impl Inner {
    /// Calls the agent for an appended application and records the answer.
    async fn drive_apply(
        self: Arc<Self>,
        application_id: String,
        job: Job,
        applicant: ApplicantProfile,
    ) -> std::result::Result<Application, LedgerError> {
        let permit = Arc::clone(&self.apply_permits).acquire_owned().await;
        let _permit = match permit {
            Ok(p) => p,
            Err(_) => {
                return self.fail(
                    &application_id,
                    FailureReason::new(FailureKind::AgentUnavailable, "apply queue closed"),
                );
            }
        };

        let deadline = self.settings.apply_ack_timeout;
        let answer = tokio::time::timeout(deadline, self.agent.apply(&job, &applicant)).await;

        match answer {
            Ok(Ok(result)) => self.acknowledge(&application_id, result),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Agent apply call failed");
                let kind = match e {
                    AgentError::Unavailable(_) => FailureKind::AgentUnavailable,
                    AgentError::Rejected { .. } | AgentError::InvalidResponse(_) => {
                        FailureKind::AgentRejected
                    }
                };
                self.fail(&application_id, FailureReason::new(kind, e.to_string()))
            }
            Err(_) => {
                tracing::warn!(deadline_secs = deadline.as_secs_f64(), "Agent apply call timed out");
                self.fail(
                    &application_id,
                    FailureReason::new(
                        FailureKind::Timeout,
                        format!("no acknowledgement within {}s", deadline.as_secs_f64()),
                    ),
                )
            }
        }
    }

    fn acknowledge(
        self: &Arc<Self>,
        application_id: &str,
        result: ApplyResult,
    ) -> std::result::Result<Application, LedgerError> {
        let ApplyResult {
            remote_id,
            streaming_url,
            completion,
        } = result;

        let Some(streaming_url) = streaming_url else {
            // No live session: the agent finished synchronously.
            let update = match completion {
                ApplyCompletion::Immediate(outcome) => {
                    Finalization::from(outcome).into_update()
                }
                ApplyCompletion::Pending(_) | ApplyCompletion::Unknown => {
                    ApplicationUpdate::new(ApplicationStatus::Submitted)
                }
            };
            return self.record(application_id, update.with_remote_id(remote_id));
        };

        let update = ApplicationUpdate::new(ApplicationStatus::Streaming)
            .with_remote_id(remote_id)
            .with_streaming_url(Some(streaming_url));
        let application = self.record(application_id, update)?;
        tracing::info!(status = %application.status, "Agent acknowledged apply");

        Ok(match completion {
            ApplyCompletion::Immediate(outcome) => self
                .finalize_quietly(application_id, Finalization::from(outcome))
                .unwrap_or(application),
            ApplyCompletion::Pending(handle) => {
                self.watch_completion(application.id.clone(), handle);
                application
            }
            ApplyCompletion::Unknown => application,
        })
    }

    fn watch_completion(self: &Arc<Self>, application_id: String, handle: CompletionHandle) {
        let inner = Arc::clone(self);
        tokio::spawn(
            async move {
                match handle.wait().await {
                    Some(outcome) => {
                        inner.finalize_quietly(&application_id, Finalization::from(outcome));
                    }
                    None => {
                        tracing::debug!(
                            application_id = %application_id,
                            "Run ended without a verdict, leaving application streaming"
                        );
                    }
                }
            }
            .in_current_span(),
        );
    }

    fn finalize(&self, id: &str, finalization: Finalization) -> Result<Application> {
        let current = match self.ledger.get(id) {
            Ok(app) => app,
            Err(LedgerError::NotFound(_)) => {
                self.ledger
                    .find_by_remote_id(id)
                    .ok_or_else(|| OrchestratorError::NotFound {
                        entity: Entity::Application,
                        id: id.to_string(),
                    })?
            }
            Err(e) => return Err(e.into()),
        };

        match current.status {
            ApplicationStatus::Streaming => {}
            status if status.is_terminal() => {
                tracing::debug!(application_id = %current.id, %status, "Finalize on terminal application ignored");
                return Err(OrchestratorError::AlreadyFinalized {
                    application_id: current.id,
                    status,
                });
            }
            from => {
                let to = match finalization.outcome {
                    FinalOutcome::Submitted => ApplicationStatus::Submitted,
                    FinalOutcome::Failed => ApplicationStatus::Failed,
                };
                return Err(OrchestratorError::InvalidTransition {
                    application_id: current.id,
                    from,
                    to,
                });
            }
        }

        let application = self.transition(&current.id, finalization.into_update())?;
        tracing::info!(
            application_id = %application.id,
            status = %application.status,
            "Application finalized"
        );
        Ok(application)
    }

    /// Finalize for internal callers that race each other; losing the
    /// race is expected.
    fn finalize_quietly(&self, id: &str, finalization: Finalization) -> Option<Application> {
        match self.finalize(id, finalization) {
            Ok(app) => Some(app),
            Err(OrchestratorError::AlreadyFinalized { .. }) => {
                tracing::debug!(application_id = id, "Already finalized elsewhere");
                None
            }
            Err(e) => {
                tracing::warn!(application_id = id, error = %e, "Could not finalize application");
                None
            }
        }
    }

    fn transition(&self, id: &str, update: ApplicationUpdate) -> std::result::Result<Application, LedgerError> {
        let previous = self.ledger.get(id)?.status;
        let application = self.ledger.update(id, update)?;
        self.events
            .send(ApplicationEvent::status_changed(previous, &application));
        Ok(application)
    }

    /// Records an agent-driven transition. The ledger only refuses it if
    /// something else already finalized the application, in which case the
    /// current record is returned.
    fn record(&self, id: &str, update: ApplicationUpdate) -> std::result::Result<Application, LedgerError> {
        self.transition(id, update).or_else(|e| {
            tracing::warn!(application_id = id, error = %e, "Ledger refused transition");
            self.ledger.get(id)
        })
    }

    fn fail(&self, id: &str, reason: FailureReason) -> std::result::Result<Application, LedgerError> {
        self.record(id, ApplicationUpdate::failed(reason))
    }
}

/// Assembles an [`Orchestrator`] with optional collaborators.
pub struct OrchestratorBuilder {
    agent: Arc<dyn AgentClient>,
    jobs: Arc<JobStore>,
    ledger: Arc<ApplicationLedger>,
    settings: OrchestratorSettings,
    events: Option<ApplicationEventBroadcaster>,
    history: Option<Database>,
}

impl OrchestratorBuilder {
    pub fn events(mut self, events: ApplicationEventBroadcaster) -> Self {
        self.events = Some(events);
        self
    }

    /// Records completed searches in `db`.
    pub fn search_history(mut self, db: Database) -> Self {
        self.history = Some(db);
        self
    }

    pub fn build(self) -> Orchestrator {
        let permits = self.settings.max_concurrent_applies.max(1);
        Orchestrator {
            inner: Arc::new(Inner {
                agent: self.agent,
                jobs: self.jobs,
                ledger: self.ledger,
                locks: JobLocks::new(),
                apply_permits: Arc::new(Semaphore::new(permits)),
                settings: self.settings,
                events: self.events.unwrap_or_default(),
                history: self.history,
            }),
        }
    }
}
