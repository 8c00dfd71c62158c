//! Shared test utilities for jobfish integration tests.
//!
//! This module provides:
//! - `MockAgent`, a scripted stand-in for the remote automation agent
//! - `TestHarness` wiring an orchestrator over the mock, optionally on disk
//! - Builders for jobs, applicants and settings

pub mod agent;
pub mod builders;
pub mod harness;

pub use agent::{ApplyScript, MockAgent};
pub use builders::*;
pub use harness::TestHarness;
