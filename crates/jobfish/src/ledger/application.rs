//! The application record and its status machine.

use std::fmt;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::db::application_repo::ApplicationRow;
use crate::db::DatabaseError;
use crate::jobs::{Job, JobBoard};

use super::error::LedgerError;

/// Lifecycle status of an application.
///
/// `Pending` covers the window between accepting an apply intent and the
/// agent's acknowledgement (the apply call is in flight or queued for a
/// permit). `Submitted` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Streaming,
    Submitted,
    Failed,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Streaming => "streaming",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Submitted | ApplicationStatus::Failed)
    }

    /// `pending → streaming → {submitted, failed}`, or straight from
    /// `pending` to a terminal status. Nothing leaves a terminal status.
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, next),
            (Pending, Streaming) | (Pending, Submitted) | (Pending, Failed)
                | (Streaming, Submitted)
                | (Streaming, Failed)
        )
    }

    fn parse(s: &str, id: &str) -> Self {
        match s {
            "pending" => ApplicationStatus::Pending,
            "streaming" => ApplicationStatus::Streaming,
            "submitted" => ApplicationStatus::Submitted,
            "failed" => ApplicationStatus::Failed,
            other => {
                log::warn!(
                    "Unknown application status '{}' for {}, treating as failed",
                    other,
                    id
                );
                ApplicationStatus::Failed
            }
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an application ended in `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The agent could not be reached.
    AgentUnavailable,
    /// The agent answered with an error.
    AgentRejected,
    /// The apply call did not acknowledge before its deadline.
    Timeout,
    /// The process stopped while the apply call was outstanding.
    Interrupted,
    /// The agent finished the session and reported failure.
    AgentReported,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::AgentUnavailable => "agent_unavailable",
            FailureKind::AgentRejected => "agent_rejected",
            FailureKind::Timeout => "timeout",
            FailureKind::Interrupted => "interrupted",
            FailureKind::AgentReported => "agent_reported",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "agent_unavailable" => Some(FailureKind::AgentUnavailable),
            "agent_rejected" => Some(FailureKind::AgentRejected),
            "timeout" => Some(FailureKind::Timeout),
            "interrupted" => Some(FailureKind::Interrupted),
            "agent_reported" => Some(FailureKind::AgentReported),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReason {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

/// One apply attempt. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub job_id: String,
    pub job_title: String,
    pub company: String,
    pub board: JobBoard,
    pub apply_url: String,
    pub status: ApplicationStatus,
    /// The agent's own id for the run, once it has acknowledged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Application {
    /// Creates a pending application for `job` with a fresh local id.
    pub fn for_job(job: &Job) -> Self {
        let now = now_micros();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job.id.clone(),
            job_title: job.title.clone(),
            company: job.company.clone(),
            board: job.board,
            apply_url: job.apply_url.clone(),
            status: ApplicationStatus::Pending,
            remote_id: None,
            streaming_url: None,
            result_url: None,
            failure: None,
            result: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Applies a status change, enforcing the transition rules. Optional
    /// fields in `update` only overwrite when present.
    pub(crate) fn apply_update(&mut self, update: ApplicationUpdate) -> Result<(), LedgerError> {
        if self.status.is_terminal() {
            return Err(LedgerError::AlreadyFinalized {
                id: self.id.clone(),
                status: self.status,
            });
        }
        if !self.status.can_transition_to(update.status) {
            return Err(LedgerError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: update.status,
            });
        }

        self.status = update.status;
        self.updated_at = update.at;
        if update.status.is_terminal() {
            self.completed_at = Some(update.at);
        }
        if update.remote_id.is_some() {
            self.remote_id = update.remote_id;
        }
        if update.streaming_url.is_some() {
            self.streaming_url = update.streaming_url;
        }
        if update.result_url.is_some() {
            self.result_url = update.result_url;
        }
        if update.failure.is_some() {
            self.failure = update.failure;
        }
        if update.result.is_some() {
            self.result = update.result;
        }
        Ok(())
    }

    pub(crate) fn to_row(&self) -> Result<ApplicationRow, DatabaseError> {
        let result = self
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DatabaseError::Serialization {
                column: "result",
                source: e,
            })?;

        Ok(ApplicationRow {
            id: self.id.clone(),
            job_id: self.job_id.clone(),
            job_title: self.job_title.clone(),
            company: self.company.clone(),
            board: self.board.as_str().to_string(),
            apply_url: self.apply_url.clone(),
            status: self.status.as_str().to_string(),
            remote_id: self.remote_id.clone(),
            streaming_url: self.streaming_url.clone(),
            result_url: self.result_url.clone(),
            failure_kind: self.failure.as_ref().map(|f| f.kind.as_str().to_string()),
            failure_message: self.failure.as_ref().map(|f| f.message.clone()),
            result,
            created_at: format_timestamp(self.created_at),
            updated_at: format_timestamp(self.updated_at),
            completed_at: self.completed_at.map(format_timestamp),
        })
    }

    pub(crate) fn from_row(row: ApplicationRow) -> Self {
        let status = ApplicationStatus::parse(&row.status, &row.id);
        let board = row.board.parse::<JobBoard>().unwrap_or_else(|e| {
            log::warn!("{} on application {}, defaulting to indeed", e, row.id);
            JobBoard::Indeed
        });
        let failure = match (row.failure_kind.as_deref(), row.failure_message) {
            (Some(kind), message) => Some(FailureReason {
                kind: FailureKind::parse(kind).unwrap_or(FailureKind::AgentReported),
                message: message.unwrap_or_default(),
            }),
            (None, _) => None,
        };
        let result = row.result.as_deref().and_then(|s| match serde_json::from_str(s) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Unreadable result payload on application {}: {}", row.id, e);
                None
            }
        });
        let created_at = parse_timestamp(&row.created_at);

        Self {
            job_id: row.job_id,
            job_title: row.job_title,
            company: row.company,
            board,
            apply_url: row.apply_url,
            status,
            remote_id: row.remote_id,
            streaming_url: row.streaming_url,
            result_url: row.result_url,
            failure,
            result,
            created_at,
            updated_at: parse_timestamp(&row.updated_at),
            completed_at: row.completed_at.as_deref().map(parse_timestamp),
            id: row.id,
        }
    }
}

/// A status change plus whatever the agent reported alongside it.
#[derive(Debug, Clone)]
pub struct ApplicationUpdate {
    pub status: ApplicationStatus,
    pub remote_id: Option<String>,
    pub streaming_url: Option<String>,
    pub result_url: Option<String>,
    pub failure: Option<FailureReason>,
    pub result: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

impl ApplicationUpdate {
    pub fn new(status: ApplicationStatus) -> Self {
        Self {
            status,
            remote_id: None,
            streaming_url: None,
            result_url: None,
            failure: None,
            result: None,
            at: now_micros(),
        }
    }

    pub fn failed(reason: FailureReason) -> Self {
        Self::new(ApplicationStatus::Failed).with_failure(reason)
    }

    pub fn with_remote_id(mut self, remote_id: Option<String>) -> Self {
        self.remote_id = remote_id;
        self
    }

    pub fn with_streaming_url(mut self, url: Option<String>) -> Self {
        self.streaming_url = url;
        self
    }

    pub fn with_result_url(mut self, url: Option<String>) -> Self {
        self.result_url = url;
        self
    }

    pub fn with_failure(mut self, reason: FailureReason) -> Self {
        self.failure = Some(reason);
        self
    }

    pub fn with_result(mut self, result: Option<serde_json::Value>) -> Self {
        self.result = result;
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }
}

/// Current time at the precision the database keeps.
fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    // Fixed width, so lexical order in SQLite matches chronological order.
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("parse_timestamp: failed to parse '{}': {}", s, e);
            DateTime::<Utc>::UNIX_EPOCH
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ApplicationStatus::*;

    fn job() -> Job {
        Job {
            id: "J1".to_string(),
            title: "Platform Engineer".to_string(),
            company: "Initech".to_string(),
            location: "Remote".to_string(),
            board: JobBoard::Greenhouse,
            apply_url: "https://boards.greenhouse.io/initech/1".to_string(),
            description: None,
            posted_date: None,
        }
    }

    #[test]
    fn test_transition_table() {
        let all = [Pending, Streaming, Submitted, Failed];
        let allowed = [
            (Pending, Streaming),
            (Pending, Submitted),
            (Pending, Failed),
            (Streaming, Submitted),
            (Streaming, Failed),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_for_job_starts_pending() {
        let app = Application::for_job(&job());
        assert_eq!(app.status, Pending);
        assert_eq!(app.job_id, "J1");
        assert!(app.completed_at.is_none());
        assert!(!app.id.is_empty());
    }

    #[test]
    fn test_terminal_update_sets_completed_at() {
        let mut app = Application::for_job(&job());
        app.apply_update(
            ApplicationUpdate::new(Streaming)
                .with_streaming_url(Some("https://viewer.example/1".to_string())),
        )
        .unwrap();
        assert!(app.completed_at.is_none());

        app.apply_update(ApplicationUpdate::new(Submitted)).unwrap();
        assert_eq!(app.status, Submitted);
        assert!(app.completed_at.is_some());
        // Streaming URL survives an update that does not carry one.
        assert_eq!(app.streaming_url.as_deref(), Some("https://viewer.example/1"));
    }

    #[test]
    fn test_no_transition_out_of_terminal() {
        let mut app = Application::for_job(&job());
        app.apply_update(ApplicationUpdate::failed(FailureReason::new(
            FailureKind::Timeout,
            "no ack",
        )))
        .unwrap();
        let completed_at = app.completed_at;

        let err = app.apply_update(ApplicationUpdate::new(Submitted)).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyFinalized { status: Failed, .. }));
        assert_eq!(app.status, Failed);
        assert_eq!(app.completed_at, completed_at);
    }

    #[test]
    fn test_streaming_cannot_go_back_to_pending() {
        let mut app = Application::for_job(&job());
        app.apply_update(ApplicationUpdate::new(Streaming)).unwrap();
        let err = app.apply_update(ApplicationUpdate::new(Pending)).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidTransition {
                from: Streaming,
                to: Pending,
                ..
            }
        ));
    }

    #[test]
    fn test_row_conversion_keeps_fields() {
        let mut app = Application::for_job(&job());
        app.apply_update(
            ApplicationUpdate::failed(FailureReason::new(FailureKind::AgentRejected, "captcha"))
                .with_result(Some(serde_json::json!({"success": false}))),
        )
        .unwrap();

        let row = app.to_row().unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.failure_kind.as_deref(), Some("agent_rejected"));
        assert_eq!(row.board, "greenhouse");

        let back = Application::from_row(row);
        assert_eq!(back.status, Failed);
        assert_eq!(back.failure, app.failure);
        assert_eq!(back.result, app.result);
        assert_eq!(back.created_at, app.created_at);
        assert_eq!(back.completed_at, app.completed_at);
    }

    #[test]
    fn test_from_row_tolerates_unknown_values() {
        let mut row = Application::for_job(&job()).to_row().unwrap();
        row.status = "exploded".to_string();
        row.board = "monster".to_string();
        row.result = Some("{not json".to_string());

        let app = Application::from_row(row);
        assert_eq!(app.status, Failed);
        assert_eq!(app.board, JobBoard::Indeed);
        assert!(app.result.is_none());
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let earlier = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = earlier + chrono::Duration::microseconds(1500);
        assert!(format_timestamp(earlier) < format_timestamp(later));
    }
}
