//! Application configuration.
//!
//! Service-level settings are loaded from YAML files and environment
//! variables. Per-step configuration lives in [`step`].

pub mod step;

use std::time::Duration;

use serde::Deserialize;

use crate::argocd::{
    AUTHORIZED_STAGE_ANNOTATION, DEFAULT_APPLICATION_NAMESPACE, OPERATION_INITIATOR,
    PROMOTION_INFO_KEY, SYNC_EVENT_REASON,
};

pub use step::{
    ApplicationUpdateRule, ArgoCdUpdateConfig, ConfigError, HelmImageUpdate,
    HelmParameterUpdates, KustomizeImageUpdate, KustomizeImageUpdates, SelectorOperator,
    SelectorRequirement, SelectorSpec, SourceUpdateRule,
};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "PROMOTER_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "PROMOTER";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "PROMOTER_LOG";

/// Environment variable carrying the promotion id.
pub const PROMOTION_ID_ENV_VAR: &str = "PROMOTION_ID";
/// Environment variable carrying the project the promotion belongs to.
pub const PROMOTION_PROJECT_ENV_VAR: &str = "PROMOTION_PROJECT";
/// Environment variable carrying the stage being promoted.
pub const PROMOTION_STAGE_ENV_VAR: &str = "PROMOTION_STAGE";
/// Environment variable carrying the user acting on the promotion.
pub const PROMOTION_USER_ENV_VAR: &str = "PROMOTION_USER";
/// Environment variable for the step configuration file.
pub const STEP_CONFIG_ENV_VAR: &str = "STEP_CONFIG";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Argo CD interaction settings.
    pub argocd: ArgoCdSettings,
}

/// Settings for how the engine reads and writes Applications.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArgoCdSettings {
    /// Namespace used when a step does not name one.
    pub default_namespace: String,
    /// Annotation naming the stage allowed to mutate an Application.
    pub authorized_stage_annotation: String,
    /// Operation info key carrying the promotion id.
    pub promotion_info_key: String,
    /// Username recorded on operations this engine requests.
    pub operation_initiator: String,
    /// Reason recorded on sync audit events.
    pub event_reason: String,
    /// Controller name reported on audit events and as patch field manager.
    pub reporter: String,
    /// Retry hint while any operation is still in flight.
    pub retry_after_secs: u64,
}

impl Default for ArgoCdSettings {
    fn default() -> Self {
        Self {
            default_namespace: DEFAULT_APPLICATION_NAMESPACE.to_string(),
            authorized_stage_annotation: AUTHORIZED_STAGE_ANNOTATION.to_string(),
            promotion_info_key: PROMOTION_INFO_KEY.to_string(),
            operation_initiator: OPERATION_INITIATOR.to_string(),
            event_reason: SYNC_EVENT_REASON.to_string(),
            reporter: "argocd-promoter".to_string(),
            retry_after_secs: 5,
        }
    }
}

impl ArgoCdSettings {
    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(self.retry_after_secs)
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ::config::ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}
