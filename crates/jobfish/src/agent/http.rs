//! [`AgentClient`] over the agent's HTTP + SSE API.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Instrument;

use crate::config::AgentConfig;
use crate::jobs::{Job, JobBoard};
use crate::sanitize::{redact_email, redact_url_credentials, truncate_body};
use crate::secrets::resolve_secret;

use super::goal::{build_apply_goal, build_search_goal};
use super::sse::{error_message, AgentEvent, SseDecoder};
use super::{
    AgentClient, AgentError, ApplicantProfile, ApplyCompletion, ApplyResult, CompletionHandle,
    CompletionSender, RemoteOutcome, RemoteState, RemoteStatus, SearchQuery, SearchResult,
    StatusSource,
};

const RUN_SSE_PATH: &str = "/v1/automation/run-sse";
const RUNS_PATH: &str = "/v1/runs";
const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Serialize)]
struct RunRequest<'a> {
    url: &'a str,
    goal: &'a str,
    proxy_config: ProxyConfig,
}

#[derive(Serialize)]
struct ProxyConfig {
    enabled: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunResponse {
    #[serde(default)]
    status: String,
    #[serde(default, alias = "result")]
    result_json: Option<Value>,
    #[serde(default, alias = "replayUrl")]
    result_url: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

/// Talks to the automation agent over HTTP.
///
/// Only the connect phase carries a client-side timeout: runs stream for
/// minutes, so call deadlines belong to the caller.
pub struct HttpAgentClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    proxy_enabled: bool,
}

impl HttpAgentClient {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        connect_timeout: Duration,
        proxy_enabled: bool,
    ) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("jobfish/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AgentError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            proxy_enabled,
        })
    }

    /// Builds a client from configuration, resolving the API key from the
    /// configured value, file or environment variable.
    pub fn from_config(config: &AgentConfig) -> crate::error::Result<Self> {
        let api_key = resolve_secret(
            config.api_key.as_deref(),
            config.api_key_file.as_deref(),
            config.api_key_env.as_deref(),
        )?;
        let client = Self::new(
            &config.base_url,
            api_key,
            Duration::from_secs(config.connect_timeout_secs),
            config.proxy_enabled,
        )?;
        tracing::info!(
            base_url = %redact_url_credentials(&client.base_url),
            proxy = client.proxy_enabled,
            "Agent client configured"
        );
        Ok(client)
    }

    async fn open_run(&self, url: &str, goal: &str) -> Result<RunStream, AgentError> {
        let body = RunRequest {
            url,
            goal,
            proxy_config: ProxyConfig {
                enabled: self.proxy_enabled,
            },
        };
        let response = self
            .client
            .post(format!("{}{}", self.base_url, RUN_SSE_PATH))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;
        let response = check_response(response).await?;

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(RunStream::new(body))
    }

    async fn search_board(
        &self,
        board: JobBoard,
        query: &SearchQuery,
    ) -> Result<(Vec<Job>, Option<String>), AgentError> {
        let goal = build_search_goal(query);
        let mut run = self.open_run(board.search_url(), &goal).await?;
        let mut streaming_url = None;

        while let Some(event) = run.next_event().await? {
            match event {
                AgentEvent::StreamingUrl { streaming_url: url } => {
                    streaming_url.get_or_insert(url);
                }
                AgentEvent::Complete {
                    status,
                    result_json,
                    error,
                } => {
                    if status != "COMPLETED" {
                        let message = error
                            .as_ref()
                            .map(error_message)
                            .unwrap_or_else(|| format!("search ended with status {}", status));
                        return Err(AgentError::rejected(truncate_body(&message)));
                    }
                    let mut jobs = parse_jobs(board, result_json.as_ref(), &query.location);
                    jobs.truncate(query.max_results as usize);
                    return Ok((jobs, streaming_url));
                }
                AgentEvent::Progress { purpose } => {
                    tracing::trace!(board = %board, purpose = ?purpose, "Search progress");
                }
                _ => {}
            }
        }

        Err(AgentError::Unavailable(
            "search stream ended before completion".to_string(),
        ))
    }

    async fn fetch_run(&self, remote_id: &str) -> Result<RunResponse, AgentError> {
        let response = self
            .client
            .get(format!("{}{}/{}", self.base_url, RUNS_PATH, remote_id))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(map_transport_error)?;
        let response = check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| AgentError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResult, AgentError> {
        let boards = if query.boards.is_empty() {
            vec![JobBoard::Indeed]
        } else {
            query.boards.clone()
        };
        let span = tracing::info_span!("agent.search", boards = boards.len());

        async {
            let runs = boards.iter().map(|&board| self.search_board(board, query));
            let outcomes = futures_util::future::join_all(runs).await;

            let mut jobs = Vec::new();
            let mut streaming_url = None;
            let mut first_error = None;
            let mut succeeded = 0usize;
            for (board, outcome) in boards.iter().zip(outcomes) {
                match outcome {
                    Ok((found, url)) => {
                        succeeded += 1;
                        tracing::debug!(board = %board, count = found.len(), "Board search finished");
                        jobs.extend(found);
                        if streaming_url.is_none() {
                            streaming_url = url;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(board = %board, error = %e, "Board search failed");
                        first_error.get_or_insert(e);
                    }
                }
            }

            match first_error {
                Some(e) if succeeded == 0 => Err(e),
                _ => Ok(SearchResult {
                    jobs,
                    streaming_url,
                }),
            }
        }
        .instrument(span)
        .await
    }

    async fn apply(
        &self,
        job: &Job,
        applicant: &ApplicantProfile,
    ) -> Result<ApplyResult, AgentError> {
        let span = tracing::info_span!(
            "agent.apply",
            job_id = %job.id,
            board = %job.board,
            applicant = %redact_email(&applicant.email),
        );

        async {
            let goal = build_apply_goal(applicant, &job.title, &job.company);
            let mut run = self.open_run(&job.apply_url, &goal).await?;
            let mut remote_id = None;

            while let Some(event) = run.next_event().await? {
                match event {
                    AgentEvent::Started { run_id } => {
                        tracing::debug!(remote_id = ?run_id, "Agent run started");
                        remote_id = run_id;
                    }
                    AgentEvent::StreamingUrl { streaming_url } => {
                        let (tx, handle) = CompletionHandle::channel();
                        tokio::spawn(drain_run(run, tx).in_current_span());
                        return Ok(ApplyResult {
                            remote_id,
                            streaming_url: Some(streaming_url),
                            completion: ApplyCompletion::Pending(handle),
                        });
                    }
                    AgentEvent::Complete {
                        status,
                        result_json,
                        error,
                    } => {
                        let outcome = outcome_from_complete(&status, result_json, error);
                        if !outcome.success {
                            return Err(AgentError::rejected(
                                outcome.message.unwrap_or_else(|| "application failed".to_string()),
                            ));
                        }
                        return Ok(ApplyResult {
                            remote_id,
                            streaming_url: None,
                            completion: ApplyCompletion::Immediate(outcome),
                        });
                    }
                    _ => {}
                }
            }

            Err(AgentError::Unavailable(
                "apply stream ended before acknowledgement".to_string(),
            ))
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl StatusSource for HttpAgentClient {
    async fn check_status(&self, remote_id: &str) -> Result<RemoteStatus, AgentError> {
        let run = self.fetch_run(remote_id).await?;
        let state = match run.status.to_ascii_uppercase().as_str() {
            "COMPLETED" => RemoteState::Completed,
            "FAILED" | "CANCELLED" | "CANCELED" | "TIMED_OUT" | "ERROR" => RemoteState::Failed,
            _ => RemoteState::Running,
        };
        // A run can complete while its own payload reports failure.
        let state = match (&state, &run.result_json) {
            (RemoteState::Completed, Some(result)) if reports_failure(result) => RemoteState::Failed,
            _ => state,
        };

        Ok(RemoteStatus {
            state,
            result_url: run.result_url,
            error: run.error.as_ref().map(error_message).map(|m| truncate_body(&m)),
            result: run.result_json,
        })
    }
}

/// An open run's event stream.
struct RunStream {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    ready: VecDeque<AgentEvent>,
    finished: bool,
}

impl RunStream {
    fn new(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> Self {
        Self {
            body,
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
            finished: false,
        }
    }

    /// Next event, or `None` once the stream has ended.
    async fn next_event(&mut self) -> Result<Option<AgentEvent>, AgentError> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Ok(Some(event));
            }
            if self.finished {
                return Ok(None);
            }
            match self.body.next().await {
                Some(Ok(chunk)) => {
                    let events = self.decoder.push(&chunk);
                    self.ready
                        .extend(events.iter().filter_map(|data| AgentEvent::parse(data)));
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(AgentError::Unavailable(format!("stream interrupted: {}", e)));
                }
                None => {
                    self.finished = true;
                    if let Some(data) = self.decoder.finish() {
                        self.ready.extend(AgentEvent::parse(&data));
                    }
                }
            }
        }
    }
}

/// Reads an acknowledged run to its end and reports the verdict.
async fn drain_run(mut run: RunStream, tx: CompletionSender) {
    loop {
        match run.next_event().await {
            Ok(Some(AgentEvent::Complete {
                status,
                result_json,
                error,
            })) => {
                let outcome = outcome_from_complete(&status, result_json, error);
                tracing::debug!(success = outcome.success, "Agent run completed");
                if !tx.complete(outcome) {
                    tracing::debug!("Nobody is waiting for the run's completion");
                }
                return;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::info!("Agent run stream ended without a verdict");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Lost the agent run stream");
                return;
            }
        }
    }
}

fn outcome_from_complete(status: &str, result: Option<Value>, error: Option<Value>) -> RemoteOutcome {
    let completed = status == "COMPLETED";
    let success = completed && !result.as_ref().is_some_and(reports_failure);

    let message = if success {
        None
    } else {
        let message = error
            .as_ref()
            .map(error_message)
            .or_else(|| {
                result
                    .as_ref()
                    .and_then(|r| r.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("run ended with status {}", status));
        Some(truncate_body(&message))
    };

    RemoteOutcome {
        success,
        message,
        result,
        result_url: None,
    }
}

/// The apply goal asks the agent for `{"success": bool, ...}`.
fn reports_failure(result: &Value) -> bool {
    result.get("success").and_then(Value::as_bool) == Some(false)
}

/// Reads a search payload: a bare array, or an object with `jobs`.
/// Entries without an application URL are dropped.
fn parse_jobs(board: JobBoard, result: Option<&Value>, fallback_location: &str) -> Vec<Job> {
    let entries: &[Value] = match result {
        Some(Value::Array(items)) => items.as_slice(),
        Some(Value::Object(map)) => match map.get("jobs") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    entries
        .iter()
        .filter_map(|entry| {
            let field = |names: &[&str]| {
                names
                    .iter()
                    .find_map(|n| entry.get(*n).and_then(Value::as_str))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };
            let apply_url = field(&["application_url", "applicationUrl", "apply_url", "url"])?;
            Some(Job {
                id: Job::stable_id(board, &apply_url),
                title: field(&["title"]).unwrap_or_else(|| "Position".to_string()),
                company: field(&["company"]).unwrap_or_else(|| "Company".to_string()),
                location: field(&["location"]).unwrap_or_else(|| fallback_location.to_string()),
                board,
                apply_url,
                description: field(&["description"]),
                posted_date: field(&["posted_date", "postedDate"]),
            })
        })
        .collect()
}

fn map_transport_error(e: reqwest::Error) -> AgentError {
    let kind = if e.is_timeout() {
        "timed out"
    } else if e.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    AgentError::Unavailable(format!("{}: {}", kind, e.without_url()))
}

async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, AgentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = truncate_body(&body);
    if status.is_server_error() {
        Err(AgentError::Unavailable(format!("HTTP {}: {}", status.as_u16(), message)))
    } else {
        Err(AgentError::Rejected {
            status: Some(status.as_u16()),
            message,
        })
    }
}
