//! Writes desired sources and a sync operation onto an Application.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::error::{Result, UpdateError};
use super::planner::DesiredSources;
use super::ApplicationSyncing;
use crate::argocd::{Application, ApplicationClient, AuditEvent, EventRecorder};
use crate::promotion::StepContext;

/// Default `ApplicationSyncing` implementation.
pub struct Synchronizer {
    client: Arc<dyn ApplicationClient>,
    events: Arc<dyn EventRecorder>,
    initiator: String,
    info_key: String,
    event_reason: String,
}

impl Synchronizer {
    pub fn new(
        client: Arc<dyn ApplicationClient>,
        events: Arc<dyn EventRecorder>,
        initiator: impl Into<String>,
        info_key: impl Into<String>,
        event_reason: impl Into<String>,
    ) -> Self {
        Self {
            client,
            events,
            initiator: initiator.into(),
            info_key: info_key.into(),
            event_reason: event_reason.into(),
        }
    }

    /// JSON merge patch replacing the sources and requesting a sync.
    fn build_patch(
        &self,
        ctx: &StepContext,
        app: &Application,
        desired: &DesiredSources,
    ) -> Result<Value> {
        let serialize = |e: serde_json::Error| UpdateError::Encoding {
            application: app.key(),
            source: e,
        };

        // Argo CD reads `revision` for a single source and `revisions`
        // for multiple sources.
        let mut spec = Map::new();
        let mut sync = Map::new();
        if app.uses_multiple_sources() {
            spec.insert(
                "sources".to_string(),
                serde_json::to_value(&desired.sources).map_err(serialize)?,
            );
            sync.insert("revisions".to_string(), json!(desired.revisions));
        } else if let Some(source) = desired.sources.first() {
            spec.insert(
                "source".to_string(),
                serde_json::to_value(source).map_err(serialize)?,
            );
            if let Some(revision) = desired.revisions.first() {
                sync.insert("revision".to_string(), json!(revision));
            }
        }

        let mut operation = Map::new();
        operation.insert(
            "initiatedBy".to_string(),
            json!({ "username": self.initiator, "automated": true }),
        );
        operation.insert(
            "info".to_string(),
            json!([{ "name": self.info_key, "value": ctx.identity.promotion }]),
        );

        if let Some(policy) = &app.spec.sync_policy {
            if !policy.sync_options.is_empty() {
                sync.insert("syncOptions".to_string(), json!(policy.sync_options));
            }
            if let Some(retry) = &policy.retry {
                operation.insert("retry".to_string(), retry.clone());
            }
        }
        operation.insert("sync".to_string(), Value::Object(sync));

        Ok(json!({ "spec": spec, "operation": operation }))
    }
}

/// Human-readable summary of what a sync asked for.
fn sync_message(desired: &DesiredSources) -> String {
    match desired.revisions.as_slice() {
        [rev] if !rev.is_empty() => format!("initiated sync to {}", rev),
        [_] | [] => "initiated sync".to_string(),
        many => format!("initiated sync to {} sources", many.len()),
    }
}

#[async_trait]
impl ApplicationSyncing for Synchronizer {
    async fn sync(
        &self,
        ctx: &StepContext,
        app: &Application,
        desired: &DesiredSources,
    ) -> Result<()> {
        let patch = self.build_patch(ctx, app, desired)?;
        self.client
            .patch(app.namespace(), app.name(), &patch)
            .await
            .map_err(|e| UpdateError::client_for("patching", &app.key(), e))?;

        let message = sync_message(desired);
        info!(application = %app.key(), promotion = %ctx.identity.promotion, "{}", message);

        let event = AuditEvent::new(&self.event_reason, ctx.user.as_deref(), &message);
        if let Err(e) = self.events.record(app, event).await {
            warn!(application = %app.key(), error = %e, "Failed to record sync event");
        }
        Ok(())
    }
}
