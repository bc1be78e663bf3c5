//! Audit events recorded on Applications.

use async_trait::async_trait;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};

use super::client::ClientError;
use super::types::Application;

/// Prefix used when the acting user is not known.
pub const UNKNOWN_USER: &str = "Unknown user";

/// A Normal-type event attached to an Application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub reason: String,
    /// `"<user> <message>"`.
    pub note: String,
}

impl AuditEvent {
    pub fn new(reason: impl Into<String>, user: Option<&str>, message: &str) -> Self {
        let user = user.filter(|u| !u.is_empty()).unwrap_or(UNKNOWN_USER);
        Self {
            reason: reason.into(),
            note: format!("{} {}", user, message),
        }
    }
}

/// Records audit events against Applications.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, app: &Application, event: AuditEvent) -> Result<(), ClientError>;
}

/// `EventRecorder` publishing core/v1 Events through the Kubernetes API.
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    pub fn new(client: Client, controller: impl Into<String>) -> Self {
        let reporter = Reporter {
            controller: controller.into(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn record(&self, app: &Application, event: AuditEvent) -> Result<(), ClientError> {
        let reference = app.object_ref(&());
        let ev = Event {
            type_: EventType::Normal,
            reason: event.reason,
            note: Some(event.note),
            action: "Sync".to_string(),
            secondary: None,
        };
        self.recorder.publish(&ev, &reference).await?;
        Ok(())
    }
}
