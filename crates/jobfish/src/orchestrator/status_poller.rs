//! Periodic status checks for streaming applications.
//!
//! Complements the completion stream: when the agent's stream is lost or
//! the process restarts mid-run, polling the run's status is the only way
//! an application leaves `streaming`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

use crate::agent::{RemoteState, StatusSource};
use crate::ledger::ApplicationStatus;

use super::{Finalization, FinalOutcome, Orchestrator, OrchestratorError};

const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(15);

/// Counts from one polling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub checked: usize,
    pub finalized: usize,
    pub still_running: usize,
    pub errors: usize,
}

pub struct StatusPoller {
    orchestrator: Orchestrator,
    source: Arc<dyn StatusSource>,
    interval: Duration,
    status_timeout: Duration,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl StatusPoller {
    pub fn new(orchestrator: Orchestrator, source: Arc<dyn StatusSource>, interval: Duration) -> Self {
        Self {
            orchestrator,
            source,
            interval,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Sets the deadline for each status check. A check that misses it
    /// counts as an error and the pass moves on.
    pub fn with_status_timeout(mut self, status_timeout: Duration) -> Self {
        self.status_timeout = status_timeout;
        self
    }

    /// Checks every streaming application that has a remote id once, and
    /// finalizes the ones whose run has ended.
    pub async fn poll_once(&self) -> PollReport {
        poll_once(&self.orchestrator, self.source.as_ref(), self.status_timeout).await
    }

    /// Starts the polling loop on the current runtime.
    /// Accepts a trigger receiver for manual poll requests.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let source = Arc::clone(&self.source);
        let shutdown = Arc::clone(&self.shutdown);
        let wake = Arc::clone(&self.wake);
        let interval = self.interval;
        let status_timeout = self.status_timeout;

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            timer.tick().await; // skip immediate first tick

            loop {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                tokio::select! {
                    _ = timer.tick() => {},
                    Ok(()) = trigger_rx.recv() => {
                        tracing::info!("Manual status poll triggered");
                    },
                    _ = wake.notified() => {},
                }

                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                let report = poll_once(&orchestrator, source.as_ref(), status_timeout).await;
                if report.checked > 0 {
                    tracing::debug!(
                        checked = report.checked,
                        finalized = report.finalized,
                        errors = report.errors,
                        "Status poll finished"
                    );
                }
            }
            tracing::info!("Status poller stopped");
        })
    }

    /// Signals the loop to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}

async fn poll_once(
    orchestrator: &Orchestrator,
    source: &dyn StatusSource,
    status_timeout: Duration,
) -> PollReport {
    let mut report = PollReport::default();
    let streaming = orchestrator
        .ledger()
        .list_by_status(ApplicationStatus::Streaming);

    for application in streaming {
        let Some(remote_id) = application.remote_id.as_deref() else {
            continue;
        };
        report.checked += 1;

        let check = tokio::time::timeout(status_timeout, source.check_status(remote_id));
        let status = match check.await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                tracing::warn!(application_id = %application.id, error = %e, "Status check failed");
                report.errors += 1;
                continue;
            }
            Err(_) => {
                tracing::warn!(
                    application_id = %application.id,
                    timeout_secs = status_timeout.as_secs_f64(),
                    "Status check timed out"
                );
                report.errors += 1;
                continue;
            }
        };

        let outcome = match status.state {
            RemoteState::Running => {
                report.still_running += 1;
                continue;
            }
            RemoteState::Completed => FinalOutcome::Submitted,
            RemoteState::Failed => FinalOutcome::Failed,
        };
        let finalization = Finalization {
            outcome,
            message: status.error,
            result_url: status.result_url,
            result: status.result,
        };

        match orchestrator.finalize(&application.id, finalization) {
            Ok(_) => report.finalized += 1,
            Err(OrchestratorError::AlreadyFinalized { .. }) => {
                tracing::debug!(application_id = %application.id, "Finalized by completion stream first");
            }
            Err(e) => {
                tracing::warn!(application_id = %application.id, error = %e, "Could not finalize polled application");
                report.errors += 1;
            }
        }
    }

    report
}
