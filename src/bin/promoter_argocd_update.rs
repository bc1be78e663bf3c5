//! promoter-argocd-update: one-shot Argo CD update step
//!
//! Runs a single reconciliation pass of the `argocd-update` step against the
//! cluster in the current kubeconfig/in-cluster context and prints the step
//! result as JSON on stdout. The caller re-invokes after `retryAfter` while
//! the result is `Running`.
//!
//! ## Configuration
//! - PROMOTION_ID: promotion the step runs for
//! - PROMOTION_PROJECT / PROMOTION_STAGE: identity checked against the
//!   authorized-stage annotation of each Application
//! - PROMOTION_USER: optional, recorded on audit events
//! - STEP_CONFIG: path to the step configuration (YAML)
//! - PROMOTER_CONFIG / PROMOTER__*: service settings (see `Config::load`)
//! - PROMOTER_LOG: tracing filter (default "info")

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use argocd_promoter::argocd::{KubeApplicationClient, KubeEventRecorder};
use argocd_promoter::config::{
    Config, PROMOTION_ID_ENV_VAR, PROMOTION_PROJECT_ENV_VAR, PROMOTION_STAGE_ENV_VAR,
    PROMOTION_USER_ENV_VAR, STEP_CONFIG_ENV_VAR,
};
use argocd_promoter::promotion::{PromotionIdentity, StepContext, StepRunner, StepStatus};
use argocd_promoter::update::ArgoCdUpdater;

fn required_env(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    std::env::var(name).map_err(|_| format!("{} must be set", name).into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    argocd_promoter::utils::bootstrap::init_tracing();

    let config_path = argocd_promoter::utils::bootstrap::parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let identity = PromotionIdentity::new(
        required_env(PROMOTION_ID_ENV_VAR)?,
        required_env(PROMOTION_PROJECT_ENV_VAR)?,
        required_env(PROMOTION_STAGE_ENV_VAR)?,
    );
    let step_config_path = required_env(STEP_CONFIG_ENV_VAR)?;
    let step_config: serde_json::Value =
        serde_yaml::from_str(&std::fs::read_to_string(&step_config_path)?)?;

    let cancel = CancellationToken::new();
    let mut ctx = StepContext::new(identity).with_cancellation(cancel.clone());
    if let Ok(user) = std::env::var(PROMOTION_USER_ENV_VAR) {
        ctx = ctx.with_user(user);
    }

    let client = kube::Client::try_default().await?;
    let updater = ArgoCdUpdater::from_settings(
        Arc::new(KubeApplicationClient::new(client.clone(), &config.argocd.reporter)),
        Arc::new(KubeEventRecorder::new(client, &config.argocd.reporter)),
        &config.argocd,
    );

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling step");
            cancel.cancel();
        }
    });

    info!(
        step = updater.name(),
        promotion = %ctx.identity.promotion,
        stage = %ctx.identity,
        "Running step"
    );
    let result = updater.run(&ctx, step_config).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    match result.status {
        StepStatus::Errored | StepStatus::Failed => Err(result
            .message
            .unwrap_or_else(|| "step did not succeed".to_string())
            .into()),
        StepStatus::Succeeded | StepStatus::Running => Ok(()),
    }
}
