//! Errors raised while updating Applications.

use crate::argocd::ClientError;
use crate::config::ConfigError;

/// Result type for update operations.
pub type Result<T> = std::result::Result<T, UpdateError>;

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(
        "unable to parse value {value:?} of annotation {annotation:?} on Application {application}: \
         expected \"<project>:<stage>\""
    )]
    AuthorizationParse {
        application: String,
        annotation: String,
        value: String,
    },

    #[error(
        "annotation {annotation:?} on Application {application} uses deprecated glob expression \
         {value:?}; name the project and stage explicitly"
    )]
    DeprecatedGlob {
        application: String,
        annotation: String,
        value: String,
    },

    #[error("Application {application} does not permit mutation by stage {stage}")]
    NotPermitted { application: String, stage: String },

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("unable to find Argo CD Application {namespace}/{name}")]
    ApplicationNotFound { namespace: String, name: String },

    #[error("no Argo CD Applications matching selector {selector:?} in namespace {namespace}")]
    NoMatchingApplications { namespace: String, selector: String },

    #[error(
        "matched {matched} Applications with selector {selector:?}, but none authorized for stage {stage}"
    )]
    NoneAuthorized {
        matched: usize,
        selector: String,
        stage: String,
    },

    #[error("Application {application} has no sources")]
    NoSources { application: String },

    #[error(
        "no source of Application {application} matches update for repoURL {repo_url:?}{}",
        .chart.as_deref().map(|c| format!(" and chart {:?}", c)).unwrap_or_default()
    )]
    SourceNotFound {
        application: String,
        repo_url: String,
        chart: Option<String>,
    },

    #[error(
        "{count} incompatible (showing first {}): {}. No Applications were updated",
        .shown.len(),
        .shown.join("; ")
    )]
    Incompatible { count: usize, shown: Vec<String> },

    #[error("unable to encode sources of Application {application}: {source}")]
    Encoding {
        application: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("sync of Argo CD Application {application} failed: {message}")]
    SyncFailed { application: String, message: String },

    #[error("operation of Argo CD Application {application} ended in phase {phase}")]
    UnexpectedPhase { application: String, phase: String },

    #[error("error {action} Argo CD {target}: {source}")]
    Client {
        action: &'static str,
        /// What was being acted on, e.g. `Application argocd/guestbook`.
        target: String,
        #[source]
        source: ClientError,
    },

    #[error("cancelled")]
    Cancelled,
}

impl UpdateError {
    /// Errors that won't clear up by retrying the step as-is.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::Client { .. }
                | Self::Cancelled
                | Self::ApplicationNotFound { .. }
                | Self::NoMatchingApplications { .. }
        )
    }

    /// Client failure on a namespace-wide call.
    pub(crate) fn client(action: &'static str, namespace: &str, source: ClientError) -> Self {
        Self::Client {
            action,
            target: format!("Applications in namespace {}", namespace),
            source,
        }
    }

    /// Client failure on a single Application, identified as `namespace/name`.
    pub(crate) fn client_for(action: &'static str, application: &str, source: ClientError) -> Self {
        Self::Client {
            action,
            target: format!("Application {}", application),
            source,
        }
    }
}
