//! Step-runner contract shared by promotion steps.
//!
//! A step receives a [`StepContext`] (who is promoting what, and a
//! cancellation signal) plus its raw configuration, and reports a
//! [`StepResult`]. Scheduling steps and retrying them is the caller's job;
//! a step only hints when to come back via `retry_after`.

pub mod render;
pub mod runner;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub use runner::StepRunner;

/// The promotion a step runs on behalf of.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionIdentity {
    /// Promotion id, stamped on operations this engine requests.
    pub promotion: String,
    pub project: String,
    pub stage: String,
}

impl PromotionIdentity {
    pub fn new(
        promotion: impl Into<String>,
        project: impl Into<String>,
        stage: impl Into<String>,
    ) -> Self {
        Self {
            promotion: promotion.into(),
            project: project.into(),
            stage: stage.into(),
        }
    }
}

impl fmt::Display for PromotionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project, self.stage)
    }
}

/// Capabilities handed to a step for one invocation.
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    pub identity: PromotionIdentity,
    /// User acting on the promotion, if authenticated.
    pub user: Option<String>,
    pub cancel: CancellationToken,
}

impl StepContext {
    pub fn new(identity: PromotionIdentity) -> Self {
        Self {
            identity,
            user: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Succeeded,
    Running,
    Errored,
    Failed,
}

/// Identity of an Application a step touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRef {
    pub namespace: String,
    pub name: String,
}

/// Payload for external health checks of the Applications a step processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub apps: Vec<ApplicationRef>,
}

/// Outcome of one step invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "duration_secs")]
    pub retry_after: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
    /// Retrying without a change in configuration or cluster state cannot help.
    #[serde(default)]
    pub terminal: bool,
}

impl StepResult {
    pub fn succeeded(health_check: Option<HealthCheck>) -> Self {
        Self {
            status: StepStatus::Succeeded,
            message: None,
            retry_after: None,
            health_check,
            terminal: false,
        }
    }

    pub fn running(retry_after: Duration, health_check: Option<HealthCheck>) -> Self {
        Self {
            status: StepStatus::Running,
            message: None,
            retry_after: Some(retry_after),
            health_check,
            terminal: false,
        }
    }

    pub fn errored(message: impl Into<String>, terminal: bool) -> Self {
        Self {
            status: StepStatus::Errored,
            message: Some(message.into()),
            retry_after: None,
            health_check: None,
            terminal,
        }
    }

    /// Attach a health check, e.g. to an errored result after some
    /// Applications were already processed.
    pub fn with_health_check(mut self, health_check: Option<HealthCheck>) -> Self {
        self.health_check = health_check;
        self
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            message: Some(message.into()),
            retry_after: None,
            health_check: None,
            terminal: true,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.map(Duration::from_secs_f64))
    }
}
