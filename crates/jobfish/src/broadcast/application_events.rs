//! Application lifecycle broadcaster for real-time status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::ledger::{Application, ApplicationStatus};

/// What happened to the application.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationEventKind {
    Created,
    StatusChanged,
}

/// Lifecycle event for one application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationEvent {
    pub kind: ApplicationEventKind,
    /// Status before the change (absent on creation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<ApplicationStatus>,
    /// The application as it is after the change.
    pub application: Application,
    pub timestamp: DateTime<Utc>,
}

impl ApplicationEvent {
    pub fn created(application: &Application) -> Self {
        Self {
            kind: ApplicationEventKind::Created,
            previous_status: None,
            application: application.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn status_changed(previous: ApplicationStatus, application: &Application) -> Self {
        Self {
            kind: ApplicationEventKind::StatusChanged,
            previous_status: Some(previous),
            application: application.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Broadcasts application events to any number of subscribers.
///
/// Sending never blocks; subscribers that fall behind lose the oldest
/// events and see `RecvError::Lagged`.
#[derive(Clone)]
pub struct ApplicationEventBroadcaster {
    sender: Arc<broadcast::Sender<ApplicationEvent>>,
}

impl ApplicationEventBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: ApplicationEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ApplicationEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ApplicationEventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{Job, JobBoard};
    use crate::ledger::ApplicationUpdate;

    fn application() -> Application {
        Application::for_job(&Job {
            id: "J9".to_string(),
            title: "Data Engineer".to_string(),
            company: "Hooli".to_string(),
            location: "Remote".to_string(),
            board: JobBoard::Workday,
            apply_url: "https://hooli.myworkdayjobs.com/9".to_string(),
            description: None,
            posted_date: None,
        })
    }

    #[test]
    fn test_send_without_subscribers() {
        let broadcaster = ApplicationEventBroadcaster::new(4);
        broadcaster.send(ApplicationEvent::created(&application()));
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let broadcaster = ApplicationEventBroadcaster::new(4);
        let mut rx = broadcaster.subscribe();

        let mut app = application();
        broadcaster.send(ApplicationEvent::created(&app));
        app.apply_update(ApplicationUpdate::new(ApplicationStatus::Streaming))
            .unwrap();
        broadcaster.send(ApplicationEvent::status_changed(ApplicationStatus::Pending, &app));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, ApplicationEventKind::Created);
        assert!(first.previous_status.is_none());

        let second = rx.recv().await.unwrap();
        assert_eq!(second.kind, ApplicationEventKind::StatusChanged);
        assert_eq!(second.previous_status, Some(ApplicationStatus::Pending));
        assert_eq!(second.application.status, ApplicationStatus::Streaming);
    }

    #[test]
    fn test_event_json_shape() {
        let event = ApplicationEvent::created(&application());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "created");
        assert_eq!(value["application"]["jobId"], "J9");
        assert!(value.get("previousStatus").is_none());
    }
}
