//! Step runner trait.

use async_trait::async_trait;
use serde_json::Value;

use super::{StepContext, StepResult};

/// A promotion step.
///
/// Implementations convert and validate `config` themselves; invalid
/// configuration is reported as a `Failed` result rather than an error so
/// the caller has a single channel to inspect.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Step kind as referenced from promotion templates.
    fn name(&self) -> &str;

    async fn run(&self, ctx: &StepContext, config: Value) -> StepResult;
}
