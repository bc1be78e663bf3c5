//! Argo CD Application update and sync reconciliation.
//!
//! One pass of the update step:
//!
//! 1. resolve each rule to authorized Applications (`resolver`)
//! 2. dry-run the source plan on every resolved Application; one failure
//!    aborts the rule before anything is written (`orchestrator`)
//! 3. per Application, decide whether a new operation is needed
//!    (`necessity`), and if so compute the desired sources (`planner`) and
//!    patch them along with a sync request (`synchronizer`)
//! 4. fold the observed phases into a step result
//!
//! Each stage sits behind a trait so the orchestrator can be exercised with
//! substitutes.

pub mod authorization;
pub mod error;
pub mod merge;
pub mod necessity;
pub mod orchestrator;
pub mod planner;
pub mod resolver;
pub mod selector;
pub mod synchronizer;
pub mod updater;

use async_trait::async_trait;

use crate::argocd::Application;
use crate::config::ApplicationUpdateRule;
use crate::promotion::{PromotionIdentity, StepContext};

pub use authorization::AuthorizationGate;
pub use error::{Result, UpdateError};
pub use necessity::{UpdateDecision, UpdateNecessityEvaluator};
pub use orchestrator::BatchOrchestrator;
pub use planner::{DesiredSources, SourceUpdatePlanner};
pub use resolver::ApplicationResolver;
pub use selector::Selector;
pub use synchronizer::Synchronizer;
pub use updater::ArgoCdUpdater;

/// Finds the Applications a rule targets.
#[async_trait]
pub trait ApplicationResolving: Send + Sync {
    /// Authorized Applications for `rule`, in listing order.
    async fn resolve(
        &self,
        identity: &PromotionIdentity,
        rule: &ApplicationUpdateRule,
    ) -> Result<Vec<Application>>;
}

/// Computes desired sources. Must not touch the cluster.
pub trait SourcePlanning: Send + Sync {
    fn plan(
        &self,
        rule: &ApplicationUpdateRule,
        desired_revisions: &[String],
        app: &Application,
    ) -> Result<DesiredSources>;

    fn desired_revisions(&self, rule: &ApplicationUpdateRule, app: &Application) -> Vec<String> {
        planner::desired_revisions(rule, app)
    }
}

/// Decides whether an Application needs a new operation.
pub trait NecessityEvaluating: Send + Sync {
    fn evaluate(
        &self,
        identity: &PromotionIdentity,
        rule: &ApplicationUpdateRule,
        app: &Application,
    ) -> UpdateDecision;
}

/// Writes desired sources and requests a sync.
#[async_trait]
pub trait ApplicationSyncing: Send + Sync {
    async fn sync(
        &self,
        ctx: &StepContext,
        app: &Application,
        desired: &DesiredSources,
    ) -> Result<()>;
}
