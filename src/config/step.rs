//! `argocd-update` step configuration.
//!
//! ```yaml
//! apps:
//!   - selector:
//!       matchLabels:
//!         app.kubernetes.io/part-of: guestbook
//!     namespace: argocd
//!     sources:
//!       - repoURL: https://github.com/example/guestbook
//!         desiredRevision: 3f2a9c1
//!         updateTargetRevision: true
//!         kustomize:
//!           images:
//!             - repoURL: ghcr.io/example/guestbook
//!               tag: v1.2.0
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Step configuration validation errors.
///
/// These are terminal: the step can never succeed as configured.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to parse step configuration: {0}")]
    Parse(String),

    #[error("at least one Application update is required")]
    NoApplications,

    #[error("apps[{index}]: exactly one of name or selector must be set")]
    NameSelectorExclusive { index: usize },

    #[error("apps[{index}]: selector must specify matchLabels or matchExpressions")]
    EmptySelector { index: usize },

    #[error("apps[{index}]: selector expression on key {key:?}: {reason}")]
    InvalidExpression {
        index: usize,
        key: String,
        reason: String,
    },

    #[error("apps[{index}].sources[{position}]: {reason}")]
    InvalidSource {
        index: usize,
        position: usize,
        reason: String,
    },
}

/// Top-level configuration of one `argocd-update` step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgoCdUpdateConfig {
    #[serde(default)]
    pub apps: Vec<ApplicationUpdateRule>,
}

impl ArgoCdUpdateConfig {
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check the invariants serde can't express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.apps.is_empty() {
            return Err(ConfigError::NoApplications);
        }
        for (index, app) in self.apps.iter().enumerate() {
            app.validate(index)?;
        }
        Ok(())
    }
}

/// Identifies a set of Applications and how to update their sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationUpdateRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<SelectorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceUpdateRule>,
}

impl ApplicationUpdateRule {
    /// Namespace to look Applications up in, falling back to `default`.
    pub fn namespace_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(default)
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let name = self.name.as_deref().filter(|n| !n.is_empty());
        match (name, &self.selector) {
            (Some(_), None) => {}
            (None, Some(selector)) => selector.validate(index)?,
            _ => return Err(ConfigError::NameSelectorExclusive { index }),
        }
        for (position, rule) in self.sources.iter().enumerate() {
            rule.validate()
                .map_err(|reason| ConfigError::InvalidSource {
                    index,
                    position,
                    reason,
                })?;
        }
        Ok(())
    }
}

/// Declarative label selector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<SelectorRequirement>,
}

impl SelectorSpec {
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if self.is_empty() {
            return Err(ConfigError::EmptySelector { index });
        }
        for expr in &self.match_expressions {
            if let Err(reason) = expr.check() {
                return Err(ConfigError::InvalidExpression {
                    index,
                    key: expr.key.clone(),
                    reason,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorRequirement {
    pub key: String,
    pub operator: SelectorOperator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl SelectorRequirement {
    /// Operator/value-count consistency.
    pub fn check(&self) -> Result<(), String> {
        if self.key.is_empty() {
            return Err("key must not be empty".to_string());
        }
        match self.operator {
            SelectorOperator::In | SelectorOperator::NotIn if self.values.is_empty() => Err(
                format!("operator {:?} requires at least one value", self.operator),
            ),
            SelectorOperator::Exists | SelectorOperator::DoesNotExist
                if !self.values.is_empty() =>
            {
                Err(format!("operator {:?} does not take values", self.operator))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// How to update one source of an Application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceUpdateRule {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_revision: Option<String>,
    #[serde(default)]
    pub update_target_revision: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kustomize: Option<KustomizeImageUpdates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm: Option<HelmParameterUpdates>,
}

impl SourceUpdateRule {
    pub fn desired_revision(&self) -> Option<&str> {
        self.desired_revision.as_deref().filter(|r| !r.is_empty())
    }

    fn validate(&self) -> Result<(), String> {
        if self.repo_url.trim().is_empty() {
            return Err("repoURL must not be empty".to_string());
        }
        if self.update_target_revision && self.desired_revision().is_none() {
            return Err("updateTargetRevision requires desiredRevision".to_string());
        }
        if let Some(kustomize) = &self.kustomize {
            for (i, image) in kustomize.images.iter().enumerate() {
                image
                    .validate()
                    .map_err(|reason| format!("kustomize.images[{}]: {}", i, reason))?;
            }
        }
        if let Some(helm) = &self.helm {
            for (i, image) in helm.images.iter().enumerate() {
                if image.key.is_empty() {
                    return Err(format!("helm.images[{}]: key must not be empty", i));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KustomizeImageUpdates {
    #[serde(default)]
    pub images: Vec<KustomizeImageUpdate>,
}

/// Rewrite of one image in a kustomize source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KustomizeImageUpdate {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
}

impl KustomizeImageUpdate {
    fn validate(&self) -> Result<(), String> {
        if self.repo_url.is_empty() {
            return Err("repoURL must not be empty".to_string());
        }
        let tag = self.tag.as_deref().is_some_and(|t| !t.is_empty());
        let digest = self.digest.as_deref().is_some_and(|d| !d.is_empty());
        if tag == digest {
            return Err("exactly one of tag or digest must be set".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelmParameterUpdates {
    #[serde(default)]
    pub images: Vec<HelmImageUpdate>,
}

/// Helm parameter override: `key` is the parameter name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmImageUpdate {
    pub key: String,
    #[serde(default)]
    pub value: String,
}
