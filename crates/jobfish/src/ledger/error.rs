//! Ledger error types.

use thiserror::Error;

use crate::db::DatabaseError;

use super::application::ApplicationStatus;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Application not found: {0}")]
    NotFound(String),

    #[error("Application id already exists: {0}")]
    DuplicateId(String),

    /// An append would create a second non-terminal application for a job.
    #[error("Job {job_id} already has an application in flight: {application_id}")]
    Conflict {
        job_id: String,
        application_id: String,
    },

    #[error("Application {id} is already {status}")]
    AlreadyFinalized {
        id: String,
        status: ApplicationStatus,
    },

    #[error("Application {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: ApplicationStatus,
        to: ApplicationStatus,
    },

    #[error("Ledger storage error: {0}")]
    Storage(#[from] DatabaseError),
}
