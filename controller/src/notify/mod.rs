pub mod email;

use async_trait::async_trait;
use autoscaler_types::{Action, RestartAttempt};
use chrono::{DateTime, Utc};

/// One outbound notification. Transport failures are logged and swallowed by
/// every [`NotificationSink`] implementation — sending is always best-effort.
#[derive(Clone, Debug)]
pub struct Notification {
    pub kind: NotificationKind,
    pub container_app: String,
    pub resource_group: String,
    pub action: Action,
    pub desired_replicas: u32,
    pub timestamp: DateTime<Utc>,
    pub restart_attempt_count: u32,
    pub recent_restart_history: Vec<RestartAttempt>,
    pub detail: Option<String>,
    pub recipients: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Failure,
    ConflictSkipped,
    ProcessingAlert,
}

impl Notification {
    pub fn subject(&self) -> String {
        match self.kind {
            NotificationKind::Success => {
                format!("ACA {}: {}", self.action.as_str(), self.container_app)
            }
            NotificationKind::Failure => {
                format!("ACA {} FAILED: {}", self.action.as_str(), self.container_app)
            }
            NotificationKind::ConflictSkipped => format!(
                "ACA Restart Skipped - Multi-Queue Conflict: {}",
                self.container_app
            ),
            NotificationKind::ProcessingAlert => {
                format!("ACA Processing Alert: {}", self.container_app)
            }
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: Notification);
}
