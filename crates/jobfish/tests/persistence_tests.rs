//! Ledger and search history survive a restart.

mod common;

use common::{applicant, jobs, MockAgent, TestHarness};
use jobfish::{Application, ApplicationStatus, FailureKind, Finalization, OrchestratorError};
use tempfile::TempDir;

#[tokio::test]
async fn test_restart_restores_ledger_and_interrupts_pending() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let all = jobs(3);

    let (streaming_id, pending_id, submitted_id) = {
        let harness = TestHarness::persistent(MockAgent::new().with_jobs(all.clone()), temp_dir.path());
        harness.search_default().await;

        let streaming = harness
            .orchestrator
            .apply(&all[0].id, &applicant())
            .await
            .unwrap();

        // An apply whose agent call never came back before the "crash".
        let pending = harness
            .orchestrator
            .ledger()
            .append(Application::for_job(&all[1]))
            .unwrap();

        let submitted = harness
            .orchestrator
            .apply(&all[2].id, &applicant())
            .await
            .unwrap();
        harness
            .orchestrator
            .finalize(&submitted.id, Finalization::submitted())
            .unwrap();

        (streaming.id, pending.id, submitted.id)
    };

    let harness = TestHarness::persistent(MockAgent::new().with_jobs(all.clone()), temp_dir.path());
    let restored = harness.orchestrator.list_applications();
    assert_eq!(restored.len(), 3);

    let streaming = harness.orchestrator.get_application(&streaming_id).unwrap();
    assert_eq!(streaming.status, ApplicationStatus::Streaming);
    assert!(streaming.remote_id.is_some());

    let pending = harness.orchestrator.get_application(&pending_id).unwrap();
    assert_eq!(pending.status, ApplicationStatus::Failed);
    assert_eq!(pending.failure.unwrap().kind, FailureKind::Interrupted);

    let submitted = harness.orchestrator.get_application(&submitted_id).unwrap();
    assert_eq!(submitted.status, ApplicationStatus::Submitted);
    assert!(submitted.completed_at.is_some());

    // Dedup still holds for the run that was streaming before the restart.
    harness.search_default().await;
    let err = harness
        .orchestrator
        .apply(&all[0].id, &applicant())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::DuplicateInFlight { ref application_id, .. } if *application_id == streaming_id
    ));

    // The interrupted job is free again.
    let retry = harness
        .orchestrator
        .apply(&all[1].id, &applicant())
        .await
        .unwrap();
    assert_ne!(retry.id, pending_id);
}

#[tokio::test]
async fn test_finalize_survives_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let all = jobs(1);

    let app_id = {
        let harness = TestHarness::persistent(MockAgent::new().with_jobs(all.clone()), temp_dir.path());
        harness.search_default().await;
        let app = harness
            .orchestrator
            .apply(&all[0].id, &applicant())
            .await
            .unwrap();
        let finalization = Finalization {
            result_url: Some("https://replay.example/abc".to_string()),
            result: Some(serde_json::json!({"submitted": true})),
            ..Finalization::submitted()
        };
        harness.orchestrator.finalize(&app.id, finalization).unwrap();
        app.id
    };

    let harness = TestHarness::persistent(MockAgent::new(), temp_dir.path());
    let app = harness.orchestrator.get_application(&app_id).unwrap();
    assert_eq!(app.status, ApplicationStatus::Submitted);
    assert_eq!(app.result_url.as_deref(), Some("https://replay.example/abc"));
    assert_eq!(app.result, Some(serde_json::json!({"submitted": true})));

    let err = harness
        .orchestrator
        .finalize(&app_id, Finalization::failed("late"))
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::AlreadyFinalized { .. }));
}

#[tokio::test]
async fn test_search_history_is_recorded() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    {
        let harness = TestHarness::persistent(MockAgent::new().with_jobs(jobs(2)), temp_dir.path());
        harness.search_default().await;
    }

    let harness = TestHarness::persistent(MockAgent::new().with_jobs(jobs(1)), temp_dir.path());
    harness.search_default().await;

    let history = harness.orchestrator.list_searches(10).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].result_count, 1);
    assert_eq!(history[1].result_count, 2);
    assert_eq!(history[1].jobs, jobs(2));
    assert_eq!(history[0].query, "software engineer");

    assert_eq!(harness.orchestrator.list_searches(1).unwrap().len(), 1);
}
