//! Shared state handed to every request handler.

use jobfish::Orchestrator;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,

    /// Wakes the status poller for an immediate pass.
    pub poll_trigger: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        let (poll_trigger, _) = broadcast::channel(16);
        Self {
            orchestrator,
            poll_trigger,
        }
    }
}
