//! Test harness for orchestrator integration tests.
//!
//! Wires an `Orchestrator` over a `MockAgent`, either memory-only or backed
//! by a SQLite file in a temporary directory so a test can "restart" the
//! process by building a second harness over the same directory.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use jobfish::{
    Application, ApplicationLedger, ApplicationStatus, Database, JobStore, Orchestrator,
    OrchestratorSettings,
};

use super::agent::MockAgent;
use super::builders::fast_settings;

pub struct TestHarness {
    pub agent: Arc<MockAgent>,
    pub orchestrator: Orchestrator,
    pub db: Option<Database>,
}

impl TestHarness {
    /// Memory-only harness with short deadlines.
    pub fn new(agent: MockAgent) -> Self {
        Self::with_settings(agent, fast_settings())
    }

    pub fn with_settings(agent: MockAgent, settings: OrchestratorSettings) -> Self {
        let agent = Arc::new(agent);
        let orchestrator = Orchestrator::new(
            agent.clone(),
            Arc::new(JobStore::new()),
            Arc::new(ApplicationLedger::new()),
            settings,
        );
        Self {
            agent,
            orchestrator,
            db: None,
        }
    }

    /// Harness backed by `dir/jobfish.db`, restoring whatever a previous
    /// harness left there.
    pub fn persistent(agent: MockAgent, dir: &Path) -> Self {
        let db = Database::open(&Self::db_path(dir)).expect("Failed to open database");
        let ledger = ApplicationLedger::with_database(db.clone());
        ledger
            .load_from_database()
            .expect("Failed to restore ledger");

        let agent = Arc::new(agent);
        let orchestrator = Orchestrator::builder(
            agent.clone(),
            Arc::new(JobStore::new()),
            Arc::new(ledger),
            fast_settings(),
        )
        .search_history(db.clone())
        .build();
        Self {
            agent,
            orchestrator,
            db: Some(db),
        }
    }

    pub fn db_path(dir: &Path) -> PathBuf {
        dir.join("jobfish.db")
    }

    /// Searches with a query the mock answers from its default jobs.
    pub async fn search_default(&self) {
        self.orchestrator
            .search(jobfish::SearchQuery::new("software engineer", "Remote"))
            .await
            .expect("search failed");
    }

    /// Polls the ledger until `id` reaches `status`, or panics after `limit`.
    pub async fn wait_for_status(
        &self,
        id: &str,
        status: ApplicationStatus,
        limit: Duration,
    ) -> Application {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let app = self
                .orchestrator
                .get_application(id)
                .expect("application missing");
            if app.status == status {
                return app;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "application {} stayed {} instead of reaching {}",
                    id, app.status, status
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Polls until some application for `job_id` exists.
    pub async fn wait_for_application(&self, job_id: &str, limit: Duration) -> Application {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            if let Some(app) = self
                .orchestrator
                .list_applications()
                .into_iter()
                .find(|a| a.job_id == job_id)
            {
                return app;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("no application for job {}", job_id);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
