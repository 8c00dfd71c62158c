//! Search-then-apply in one intent.

use serde::Serialize;

use crate::agent::{ApplicantProfile, SearchQuery};
use crate::ledger::{Application, ApplicationStatus};

use super::{Entity, Orchestrator, OrchestratorError, Result};

/// What happened to one job during an autopilot run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AutopilotResult {
    Applied {
        application: Application,
    },
    #[serde(rename_all = "camelCase")]
    AlreadyApplying {
        application_id: String,
        status: ApplicationStatus,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutopilotOutcome {
    pub job_id: String,
    pub job_title: String,
    pub company: String,
    #[serde(flatten)]
    pub result: AutopilotResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutopilotReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_streaming_url: Option<String>,
    pub jobs_found: usize,
    pub attempted: usize,
    /// Applications that reached the agent without failing.
    pub applied: usize,
    /// The search results were replaced by another search before every
    /// planned apply ran; the remaining jobs were skipped.
    pub superseded: bool,
    pub outcomes: Vec<AutopilotOutcome>,
}

impl Orchestrator {
    /// Searches, then applies to the first `max_applications` jobs one at a
    /// time, pausing between attempts.
    ///
    /// Only a failed search fails the run; per-job problems are reported in
    /// the outcomes. Applies stop as soon as the job store no longer holds
    /// this run's search results.
    pub async fn autopilot(
        &self,
        query: SearchQuery,
        applicant: &ApplicantProfile,
        max_applications: usize,
    ) -> Result<AutopilotReport> {
        let search = self.search(query).await?;
        let jobs_found = search.jobs.len();
        tracing::info!(jobs_found, max_applications, "Autopilot search finished");

        let mut outcomes = Vec::new();
        let mut superseded = search.superseded;
        if superseded {
            tracing::warn!("Autopilot search was superseded, no applications attempted");
        }

        let planned = if superseded { 0 } else { max_applications };
        for (i, job) in search.jobs.iter().take(planned).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings().autopilot_pause).await;
            }

            let result = match self.apply(&job.id, applicant).await {
                Ok(application) => AutopilotResult::Applied { application },
                Err(OrchestratorError::NotFound {
                    entity: Entity::Job,
                    ..
                }) => {
                    tracing::warn!(
                        job_id = %job.id,
                        "Job store was replaced during autopilot, stopping"
                    );
                    superseded = true;
                    break;
                }
                Err(OrchestratorError::DuplicateInFlight {
                    application_id,
                    status,
                }) => AutopilotResult::AlreadyApplying {
                    application_id,
                    status,
                },
                Err(e) => AutopilotResult::Error {
                    message: e.to_string(),
                },
            };
            outcomes.push(AutopilotOutcome {
                job_id: job.id.clone(),
                job_title: job.title.clone(),
                company: job.company.clone(),
                result,
            });
        }

        let applied = outcomes
            .iter()
            .filter(|o| {
                matches!(
                    &o.result,
                    AutopilotResult::Applied { application }
                        if application.status != ApplicationStatus::Failed
                )
            })
            .count();
        tracing::info!(attempted = outcomes.len(), applied, "Autopilot finished");

        Ok(AutopilotReport {
            search_streaming_url: search.streaming_url,
            jobs_found,
            attempted: outcomes.len(),
            applied,
            superseded,
            outcomes,
        })
    }
}
