//! Job search and application orchestration over a remote
//! browser-automation agent.
//!
//! The [`Orchestrator`] accepts search and apply intents, delegates them to
//! an [`AgentClient`], keeps the latest search results in a [`JobStore`]
//! and records every apply attempt in the [`ApplicationLedger`].

pub mod agent;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod logging;
pub mod orchestrator;
pub mod sanitize;
pub mod secrets;

pub use agent::{
    AgentClient, AgentError, ApplicantProfile, HttpAgentClient, SearchQuery, SearchResult,
    StatusSource,
};
pub use broadcast::{ApplicationEvent, ApplicationEventBroadcaster};
pub use config::{load_config, load_config_or_default, Config};
pub use db::Database;
pub use error::{ConfigError, JobfishError, Result};
pub use jobs::{Job, JobBoard, JobStore};
pub use ledger::{Application, ApplicationLedger, ApplicationStatus, FailureKind, FailureReason};
pub use orchestrator::{
    AutopilotReport, Entity, Finalization, FinalOutcome, Orchestrator, OrchestratorError,
    OrchestratorSettings, SearchOutcome, SearchRecord, StatusPoller,
};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
