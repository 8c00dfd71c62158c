//! Scripted agent for orchestrator tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use jobfish::agent::{
    ApplyCompletion, ApplyResult, CompletionHandle, CompletionSender, RemoteOutcome, RemoteState,
    RemoteStatus,
};
use jobfish::{
    AgentClient, AgentError, ApplicantProfile, Job, SearchQuery, SearchResult, StatusSource,
};

/// How the agent answers an apply call.
#[derive(Debug, Clone)]
pub enum ApplyScript {
    /// Live session, no completion signal.
    Streaming,
    /// Live session; the run ends when the test calls `MockAgent::complete`.
    StreamingWithHandle,
    /// Finished before any live session was offered.
    Immediate { success: bool },
    Reject(String),
    Unavailable,
    /// Never answers.
    Hang,
}

pub struct MockAgent {
    search_results: Mutex<HashMap<String, Vec<Job>>>,
    search_delays: Mutex<HashMap<String, Duration>>,
    default_jobs: Mutex<Vec<Job>>,
    search_error: Mutex<Option<AgentError>>,
    scripts: Mutex<HashMap<String, ApplyScript>>,
    default_script: Mutex<ApplyScript>,
    apply_delay: Mutex<Duration>,
    completions: Mutex<HashMap<String, CompletionSender>>,
    statuses: Mutex<HashMap<String, RemoteStatus>>,
    search_calls: AtomicUsize,
    apply_calls: AtomicUsize,
    status_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAgent {
    pub fn new() -> Self {
        Self {
            search_results: Mutex::new(HashMap::new()),
            search_delays: Mutex::new(HashMap::new()),
            default_jobs: Mutex::new(Vec::new()),
            search_error: Mutex::new(None),
            scripts: Mutex::new(HashMap::new()),
            default_script: Mutex::new(ApplyScript::Streaming),
            apply_delay: Mutex::new(Duration::ZERO),
            completions: Mutex::new(HashMap::new()),
            statuses: Mutex::new(HashMap::new()),
            search_calls: AtomicUsize::new(0),
            apply_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Jobs returned for any query without a specific result.
    pub fn with_jobs(self, jobs: Vec<Job>) -> Self {
        *self.default_jobs.lock().unwrap() = jobs;
        self
    }

    pub fn with_search_result(self, query: &str, jobs: Vec<Job>, delay: Duration) -> Self {
        self.search_results
            .lock()
            .unwrap()
            .insert(query.to_string(), jobs);
        self.search_delays
            .lock()
            .unwrap()
            .insert(query.to_string(), delay);
        self
    }

    pub fn with_search_error(self, error: AgentError) -> Self {
        *self.search_error.lock().unwrap() = Some(error);
        self
    }

    pub fn with_default_script(self, script: ApplyScript) -> Self {
        *self.default_script.lock().unwrap() = script;
        self
    }

    pub fn with_script(self, job_id: &str, script: ApplyScript) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(job_id.to_string(), script);
        self
    }

    pub fn with_apply_delay(self, delay: Duration) -> Self {
        *self.apply_delay.lock().unwrap() = delay;
        self
    }

    /// Ends a run started with `ApplyScript::StreamingWithHandle`.
    pub fn complete(&self, remote_id: &str, outcome: RemoteOutcome) -> bool {
        let sender = self.completions.lock().unwrap().remove(remote_id);
        sender.map(|s| s.complete(outcome)).unwrap_or(false)
    }

    /// Drops the completion sender, as if the run's stream broke.
    pub fn drop_stream(&self, remote_id: &str) {
        self.completions.lock().unwrap().remove(remote_id);
    }

    pub fn set_status(&self, remote_id: &str, state: RemoteState) {
        self.statuses.lock().unwrap().insert(
            remote_id.to_string(),
            RemoteStatus {
                state,
                result_url: Some(format!("https://replay.example/{}", remote_id)),
                result: None,
                error: (state == RemoteState::Failed).then(|| "form rejected".to_string()),
            },
        );
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Highest number of apply calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn script_for(&self, job_id: &str) -> ApplyScript {
        self.scripts
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .unwrap_or_else(|| self.default_script.lock().unwrap().clone())
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AgentClient for MockAgent {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResult, AgentError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self
            .search_delays
            .lock()
            .unwrap()
            .get(&query.query)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.search_error.lock().unwrap().clone() {
            return Err(error);
        }

        let jobs = self
            .search_results
            .lock()
            .unwrap()
            .get(&query.query)
            .cloned()
            .unwrap_or_else(|| self.default_jobs.lock().unwrap().clone());
        Ok(SearchResult {
            jobs,
            streaming_url: Some(format!("https://live.example/search/{}", query.query)),
        })
    }

    async fn apply(
        &self,
        job: &Job,
        _applicant: &ApplicantProfile,
    ) -> Result<ApplyResult, AgentError> {
        let call = self.apply_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let delay = *self.apply_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let remote_id = format!("run-{}-{}", job.id, call);
        let streaming_url = format!("https://live.example/run/{}", remote_id);
        match self.script_for(&job.id) {
            ApplyScript::Streaming => Ok(ApplyResult {
                remote_id: Some(remote_id),
                streaming_url: Some(streaming_url),
                completion: ApplyCompletion::Unknown,
            }),
            ApplyScript::StreamingWithHandle => {
                let (sender, handle) = CompletionHandle::channel();
                self.completions
                    .lock()
                    .unwrap()
                    .insert(remote_id.clone(), sender);
                Ok(ApplyResult {
                    remote_id: Some(remote_id),
                    streaming_url: Some(streaming_url),
                    completion: ApplyCompletion::Pending(handle),
                })
            }
            ApplyScript::Immediate { success } => {
                let outcome = if success {
                    RemoteOutcome::submitted(Some(serde_json::json!({"confirmation": "ok"})))
                } else {
                    RemoteOutcome::failed("position closed")
                };
                Ok(ApplyResult {
                    remote_id: Some(remote_id),
                    streaming_url: None,
                    completion: ApplyCompletion::Immediate(outcome),
                })
            }
            ApplyScript::Reject(message) => Err(AgentError::rejected(message)),
            ApplyScript::Unavailable => {
                Err(AgentError::Unavailable("connection refused".to_string()))
            }
            ApplyScript::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl StatusSource for MockAgent {
    async fn check_status(&self, remote_id: &str) -> Result<RemoteStatus, AgentError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .get(remote_id)
            .cloned()
            .ok_or_else(|| AgentError::rejected(format!("unknown run {}", remote_id)))
    }
}
