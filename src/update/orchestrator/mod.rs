//! Batch orchestration of Application updates.
//!
//! Rules are processed in order, Applications within a rule sequentially.
//! Before any Application of a rule is touched, the source plan is dry-run
//! against all of them; one incompatible Application aborts the rule
//! without writing anything.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::error::{Result, UpdateError};
use super::{
    ApplicationResolving, ApplicationSyncing, NecessityEvaluating, SourcePlanning, UpdateDecision,
};
use crate::argocd::{Application, OperationPhase};
use crate::config::{ApplicationUpdateRule, ArgoCdUpdateConfig};
use crate::promotion::{ApplicationRef, HealthCheck, StepContext, StepResult};

/// Number of incompatible Applications named in a validation error.
const MAX_REPORTED_INCOMPATIBLE: usize = 3;

/// An Application the step looked at, and the phase it was left in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedApplication {
    pub app: ApplicationRef,
    pub phase: OperationPhase,
}

pub struct BatchOrchestrator {
    resolver: Arc<dyn ApplicationResolving>,
    planner: Arc<dyn SourcePlanning>,
    evaluator: Arc<dyn NecessityEvaluating>,
    syncer: Arc<dyn ApplicationSyncing>,
    retry_after: Duration,
}

impl BatchOrchestrator {
    pub fn new(
        resolver: Arc<dyn ApplicationResolving>,
        planner: Arc<dyn SourcePlanning>,
        evaluator: Arc<dyn NecessityEvaluating>,
        syncer: Arc<dyn ApplicationSyncing>,
        retry_after: Duration,
    ) -> Self {
        Self {
            resolver,
            planner,
            evaluator,
            syncer,
            retry_after,
        }
    }

    /// Run one reconciliation pass and fold it into a step result.
    #[tracing::instrument(
        name = "argocd.update",
        skip_all,
        fields(promotion = %ctx.identity.promotion, stage = %ctx.identity, rules = config.apps.len())
    )]
    pub async fn run(&self, ctx: &StepContext, config: &ArgoCdUpdateConfig) -> StepResult {
        let mut processed = Vec::new();
        match self.reconcile(ctx, config, &mut processed).await {
            Ok(()) => self.aggregate(&processed),
            Err(e) => {
                warn!(
                    error = %e,
                    terminal = e.is_terminal(),
                    processed = processed.len(),
                    "Argo CD update failed"
                );
                error_result(&e).with_health_check(health_check(&processed))
            }
        }
    }

    /// Process every rule, appending each Application handled to
    /// `processed`. Stops at the first fatal error.
    pub async fn reconcile(
        &self,
        ctx: &StepContext,
        config: &ArgoCdUpdateConfig,
        processed: &mut Vec<ProcessedApplication>,
    ) -> Result<()> {
        for rule in &config.apps {
            let apps = cancellable(ctx, self.resolver.resolve(&ctx.identity, rule)).await?;
            self.validate_batch(rule, &apps)?;

            for app in &apps {
                let phase = self.process(ctx, rule, app).await?;
                processed.push(ProcessedApplication {
                    app: ApplicationRef {
                        namespace: app.namespace().to_string(),
                        name: app.name().to_string(),
                    },
                    phase,
                });
            }
        }
        Ok(())
    }

    /// Dry-run the plan on every Application of a batch.
    pub fn validate_batch(&self, rule: &ApplicationUpdateRule, apps: &[Application]) -> Result<()> {
        let failures: Vec<String> = apps
            .iter()
            .filter_map(|app| {
                let revisions = self.planner.desired_revisions(rule, app);
                self.planner
                    .plan(rule, &revisions, app)
                    .err()
                    .map(|e| format!("{}: {}", app.key(), e))
            })
            .collect();

        if failures.is_empty() {
            return Ok(());
        }
        Err(UpdateError::Incompatible {
            count: failures.len(),
            shown: failures
                .into_iter()
                .take(MAX_REPORTED_INCOMPATIBLE)
                .collect(),
        })
    }

    async fn process(
        &self,
        ctx: &StepContext,
        rule: &ApplicationUpdateRule,
        app: &Application,
    ) -> Result<OperationPhase> {
        if ctx.cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        match self.evaluator.evaluate(&ctx.identity, rule, app) {
            UpdateDecision::NeedsUpdate { reason } => {
                if let Some(reason) = &reason {
                    info!(application = %app.key(), %reason, "Forcing a new operation");
                }
                let revisions = self.planner.desired_revisions(rule, app);
                let desired = self.planner.plan(rule, &revisions, app)?;
                cancellable(ctx, self.syncer.sync(ctx, app, &desired)).await?;
                Ok(OperationPhase::Empty)
            }
            UpdateDecision::Waiting { phase, reason } => {
                match reason {
                    Some(reason) => info!(application = %app.key(), %phase, %reason, "Waiting"),
                    None => debug!(application = %app.key(), %phase, "Waiting for own operation"),
                }
                Ok(phase)
            }
            UpdateDecision::Converged { phase } if phase.is_failure() => {
                let message = app
                    .operation_state()
                    .map(|s| s.message.clone())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("operation ended in phase {}", phase));
                Err(UpdateError::SyncFailed {
                    application: app.key(),
                    message,
                })
            }
            UpdateDecision::Converged { phase } => {
                debug!(application = %app.key(), %phase, "Converged");
                Ok(phase)
            }
        }
    }

    /// Fold observed phases into a step result.
    pub fn aggregate(&self, processed: &[ProcessedApplication]) -> StepResult {
        let health_check = Some(HealthCheck {
            apps: processed.iter().map(|p| p.app.clone()).collect(),
        });

        if processed.iter().any(|p| !p.phase.is_terminal()) {
            return StepResult::running(self.retry_after, health_check);
        }

        match processed
            .iter()
            .find(|p| p.phase != OperationPhase::Succeeded)
        {
            None => StepResult::succeeded(health_check),
            Some(p) => error_result(&UpdateError::UnexpectedPhase {
                application: format!("{}/{}", p.app.namespace, p.app.name),
                phase: p.phase.to_string(),
            })
            .with_health_check(health_check),
        }
    }
}

/// Step result for a fatal error.
pub(crate) fn error_result(err: &UpdateError) -> StepResult {
    match err {
        UpdateError::Config(_) => StepResult::failed(err.to_string()),
        _ => StepResult::errored(err.to_string(), err.is_terminal()),
    }
}

/// Health check naming the processed Applications; none if there are none.
fn health_check(processed: &[ProcessedApplication]) -> Option<HealthCheck> {
    (!processed.is_empty()).then(|| HealthCheck {
        apps: processed.iter().map(|p| p.app.clone()).collect(),
    })
}

/// Race `fut` against the step's cancellation.
async fn cancellable<T>(ctx: &StepContext, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(UpdateError::Cancelled),
        res = fut => res,
    }
}
