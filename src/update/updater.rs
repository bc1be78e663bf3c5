//! The `argocd-update` promotion step.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::orchestrator::error_result;
use super::{
    ApplicationResolver, AuthorizationGate, BatchOrchestrator, SourceUpdatePlanner, Synchronizer,
    UpdateError, UpdateNecessityEvaluator,
};
use crate::argocd::{ApplicationClient, EventRecorder};
use crate::config::{ArgoCdSettings, ArgoCdUpdateConfig};
use crate::promotion::{StepContext, StepResult, StepRunner};

/// Step kind name.
pub const STEP_NAME: &str = "argocd-update";

/// Updates and syncs Argo CD Applications for a promotion.
pub struct ArgoCdUpdater {
    orchestrator: BatchOrchestrator,
}

impl ArgoCdUpdater {
    pub fn new(orchestrator: BatchOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Wire the default collaborators around a client and event recorder.
    pub fn from_settings(
        client: Arc<dyn ApplicationClient>,
        events: Arc<dyn EventRecorder>,
        settings: &ArgoCdSettings,
    ) -> Self {
        let resolver = ApplicationResolver::new(
            client.clone(),
            AuthorizationGate::new(&settings.authorized_stage_annotation),
            &settings.default_namespace,
        );
        let evaluator = UpdateNecessityEvaluator::new(
            &settings.operation_initiator,
            &settings.promotion_info_key,
        );
        let synchronizer = Synchronizer::new(
            client,
            events,
            &settings.operation_initiator,
            &settings.promotion_info_key,
            &settings.event_reason,
        );
        Self::new(BatchOrchestrator::new(
            Arc::new(resolver),
            Arc::new(SourceUpdatePlanner),
            Arc::new(evaluator),
            Arc::new(synchronizer),
            settings.retry_after(),
        ))
    }
}

#[async_trait]
impl StepRunner for ArgoCdUpdater {
    fn name(&self) -> &str {
        STEP_NAME
    }

    async fn run(&self, ctx: &StepContext, config: Value) -> StepResult {
        let config = match ArgoCdUpdateConfig::from_json(config)
            .and_then(|c| c.validate().map(|_| c))
        {
            Ok(config) => config,
            Err(e) => {
                warn!(step = STEP_NAME, error = %e, "Invalid step configuration");
                return error_result(&UpdateError::from(e));
            }
        };
        self.orchestrator.run(ctx, &config).await
    }
}
