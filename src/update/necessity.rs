//! Decides whether an Application needs a new sync operation.
//!
//! The decision is a pure function of the Application's last observed
//! operation state and the revisions the step wants.

use tracing::debug;

use super::planner::desired_revisions;
use super::NecessityEvaluating;
use crate::argocd::{Application, OperationPhase, OperationState};
use crate::config::ApplicationUpdateRule;
use crate::promotion::PromotionIdentity;

/// Outcome of evaluating one Application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDecision {
    /// Request a new operation. The reason, if any, is advisory.
    NeedsUpdate { reason: Option<String> },
    /// An operation is in flight; come back later.
    Waiting {
        phase: OperationPhase,
        reason: Option<String>,
    },
    /// Our operation finished and synced what we asked for.
    Converged { phase: OperationPhase },
}

impl UpdateDecision {
    /// Phase the Application is in as far as the step is concerned.
    pub fn phase(&self) -> OperationPhase {
        match self {
            Self::NeedsUpdate { .. } => OperationPhase::Empty,
            Self::Waiting { phase, .. } | Self::Converged { phase } => phase.clone(),
        }
    }

    pub fn must_update(&self) -> bool {
        matches!(self, Self::NeedsUpdate { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::NeedsUpdate { reason } | Self::Waiting { reason, .. } => reason.as_deref(),
            Self::Converged { .. } => None,
        }
    }
}

/// Default `NecessityEvaluating` implementation.
#[derive(Debug, Clone)]
pub struct UpdateNecessityEvaluator {
    initiator: String,
    info_key: String,
}

impl UpdateNecessityEvaluator {
    pub fn new(initiator: impl Into<String>, info_key: impl Into<String>) -> Self {
        Self {
            initiator: initiator.into(),
            info_key: info_key.into(),
        }
    }

    fn initiated_by_us(&self, state: &OperationState) -> bool {
        state.operation.initiated_by.username == self.initiator
    }

    fn for_promotion(&self, state: &OperationState, promotion: &str) -> bool {
        state.operation.info_value(&self.info_key) == Some(promotion)
    }

    /// Decide against explicit desired revisions, aligned with the
    /// Application's current sources. Empty entries are not compared.
    pub fn decide(
        &self,
        identity: &PromotionIdentity,
        desired_revisions: &[String],
        app: &Application,
    ) -> UpdateDecision {
        let Some(state) = app.operation_state() else {
            return UpdateDecision::NeedsUpdate { reason: None };
        };
        let phase = state.phase.clone();

        if !phase.is_terminal() {
            let reason = if !self.initiated_by_us(state) {
                Some(format!(
                    "current operation was initiated by {:?}",
                    state.operation.initiated_by.username
                ))
            } else if !self.for_promotion(state, &identity.promotion) {
                Some("current operation was not initiated for this promotion".to_string())
            } else {
                None
            };
            return UpdateDecision::Waiting { phase, reason };
        }

        if !self.initiated_by_us(state) || !self.for_promotion(state, &identity.promotion) {
            debug!(application = %app.key(), %phase, "Last operation belongs to someone else");
            return UpdateDecision::NeedsUpdate { reason: None };
        }

        let Some(result) = state.sync_result.as_ref() else {
            return UpdateDecision::NeedsUpdate {
                reason: Some(format!("operation completed without a sync result (phase {})", phase)),
            };
        };

        let synced: Vec<&str> = if app.uses_multiple_sources() {
            result.revisions.iter().map(String::as_str).collect()
        } else {
            vec![result.revision.as_str()]
        };
        for (i, desired) in desired_revisions.iter().enumerate() {
            if desired.is_empty() {
                continue;
            }
            let observed = synced.get(i).copied().unwrap_or_default();
            if observed != desired {
                return UpdateDecision::NeedsUpdate {
                    reason: Some(format!(
                        "sync result revision {:?} does not match desired revision {:?}",
                        observed, desired
                    )),
                };
            }
        }

        UpdateDecision::Converged { phase }
    }
}

impl NecessityEvaluating for UpdateNecessityEvaluator {
    fn evaluate(
        &self,
        identity: &PromotionIdentity,
        rule: &ApplicationUpdateRule,
        app: &Application,
    ) -> UpdateDecision {
        self.decide(identity, &desired_revisions(rule, app), app)
    }
}
