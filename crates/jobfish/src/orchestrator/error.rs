//! Errors surfaced by orchestrator operations.

use thiserror::Error;

use crate::agent::AgentError;
use crate::db::DatabaseError;
use crate::jobs::JobNotFound;
use crate::ledger::{ApplicationStatus, LedgerError};

/// Kinds of thing an operation can fail to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Job,
    Application,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Job => write!(f, "Job"),
            Entity::Application => write!(f, "Application"),
        }
    }
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// The agent could not be reached or did not answer in time.
    #[error("Agent unavailable: {0}")]
    AgentUnavailable(String),

    /// The agent answered with an error, passed through verbatim.
    #[error("Agent rejected the request: {0}")]
    AgentRejected(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    /// An apply is already running for this job.
    #[error("Already applying: application {application_id} is {status}")]
    DuplicateInFlight {
        application_id: String,
        status: ApplicationStatus,
    },

    #[error("Application {application_id} is already {status}")]
    AlreadyFinalized {
        application_id: String,
        status: ApplicationStatus,
    },

    #[error("Application {application_id} cannot move from {from} to {to}")]
    InvalidTransition {
        application_id: String,
        from: ApplicationStatus,
        to: ApplicationStatus,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<AgentError> for OrchestratorError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Unavailable(msg) => OrchestratorError::AgentUnavailable(msg),
            AgentError::Rejected { message, .. } => OrchestratorError::AgentRejected(message),
            AgentError::InvalidResponse(msg) => OrchestratorError::AgentRejected(msg),
        }
    }
}

impl From<JobNotFound> for OrchestratorError {
    fn from(e: JobNotFound) -> Self {
        OrchestratorError::NotFound {
            entity: Entity::Job,
            id: e.0,
        }
    }
}

impl From<DatabaseError> for OrchestratorError {
    fn from(e: DatabaseError) -> Self {
        OrchestratorError::Storage(e.to_string())
    }
}

impl From<LedgerError> for OrchestratorError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound(id) => OrchestratorError::NotFound {
                entity: Entity::Application,
                id,
            },
            LedgerError::Conflict {
                application_id, ..
            } => OrchestratorError::DuplicateInFlight {
                application_id,
                // Only non-terminal applications conflict.
                status: ApplicationStatus::Pending,
            },
            LedgerError::AlreadyFinalized { id, status } => OrchestratorError::AlreadyFinalized {
                application_id: id,
                status,
            },
            LedgerError::InvalidTransition { id, from, to } => {
                OrchestratorError::InvalidTransition {
                    application_id: id,
                    from,
                    to,
                }
            }
            LedgerError::DuplicateId(id) => {
                OrchestratorError::Storage(format!("duplicate application id {}", id))
            }
            LedgerError::Storage(e) => OrchestratorError::Storage(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_mapping() {
        assert!(matches!(
            OrchestratorError::from(AgentError::Unavailable("down".into())),
            OrchestratorError::AgentUnavailable(m) if m == "down"
        ));
        assert!(matches!(
            OrchestratorError::from(AgentError::Rejected {
                status: Some(400),
                message: "bad url".into()
            }),
            OrchestratorError::AgentRejected(m) if m == "bad url"
        ));
        assert!(matches!(
            OrchestratorError::from(AgentError::InvalidResponse("eh".into())),
            OrchestratorError::AgentRejected(_)
        ));
    }

    #[test]
    fn test_not_found_display() {
        let err = OrchestratorError::from(JobNotFound("zzz".to_string()));
        assert_eq!(err.to_string(), "Job not found: zzz");
        let err = OrchestratorError::from(LedgerError::NotFound("a1".to_string()));
        assert_eq!(err.to_string(), "Application not found: a1");
    }
}
