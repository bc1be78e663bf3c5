//! Desired source computation.
//!
//! Given an Application's current sources and the step's source update
//! rules, compute the sources the Application should have. Nothing here
//! touches the cluster; the same inputs always produce the same output.

use serde_json::{json, Value};

use super::error::{Result, UpdateError};
use super::merge::recursive_merge;
use super::SourcePlanning;
use crate::argocd::{Application, ApplicationSource, HelmParameter};
use crate::config::{
    ApplicationUpdateRule, HelmImageUpdate, KustomizeImageUpdate, SourceUpdateRule,
};

/// Sources an Application should have, aligned with its current sources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredSources {
    pub sources: Vec<ApplicationSource>,
    /// Per source: whether planning changed anything.
    pub updated: Vec<bool>,
    /// Per source: the revision a sync should request. The rule's desired
    /// revision when it names one, otherwise the source's target revision.
    pub revisions: Vec<String>,
}

impl DesiredSources {
    pub fn any_updated(&self) -> bool {
        self.updated.iter().any(|u| *u)
    }
}

/// Default `SourcePlanning` implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceUpdatePlanner;

impl SourcePlanning for SourceUpdatePlanner {
    fn plan(
        &self,
        rule: &ApplicationUpdateRule,
        desired_revisions: &[String],
        app: &Application,
    ) -> Result<DesiredSources> {
        plan_sources(rule, desired_revisions, app)
    }
}

/// Desired revision of each current source of `app`; empty when no rule
/// asks for one.
pub fn desired_revisions(rule: &ApplicationUpdateRule, app: &Application) -> Vec<String> {
    app.current_sources()
        .iter()
        .map(|source| {
            matching_rule(&rule.sources, source)
                .and_then(SourceUpdateRule::desired_revision)
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

fn plan_sources(
    rule: &ApplicationUpdateRule,
    desired_revisions: &[String],
    app: &Application,
) -> Result<DesiredSources> {
    let current = app.current_sources();
    if current.is_empty() {
        return Err(UpdateError::NoSources {
            application: app.key(),
        });
    }

    // Every configured update must land somewhere.
    if let Some(orphan) = rule
        .sources
        .iter()
        .find(|update| !current.iter().any(|source| source_matches(update, source)))
    {
        return Err(UpdateError::SourceNotFound {
            application: app.key(),
            repo_url: orphan.repo_url.clone(),
            chart: orphan.chart.clone(),
        });
    }

    let mut desired = DesiredSources::default();
    for (i, source) in current.into_iter().enumerate() {
        let Some(update) = matching_rule(&rule.sources, &source) else {
            desired.revisions.push(source.target_revision.clone());
            desired.sources.push(source);
            desired.updated.push(false);
            continue;
        };
        let revision = desired_revisions
            .get(i)
            .map(String::as_str)
            .filter(|r| !r.is_empty())
            .or_else(|| update.desired_revision());
        let (source, updated) = apply_update(&app.key(), source, update, revision)?;
        desired.revisions.push(
            revision
                .map(str::to_string)
                .unwrap_or_else(|| source.target_revision.clone()),
        );
        desired.sources.push(source);
        desired.updated.push(updated);
    }
    Ok(desired)
}

fn apply_update(
    application: &str,
    source: ApplicationSource,
    update: &SourceUpdateRule,
    revision: Option<&str>,
) -> Result<(ApplicationSource, bool)> {
    let serialization = |e: serde_json::Error| UpdateError::Encoding {
        application: application.to_string(),
        source: e,
    };
    let before = serde_json::to_value(&source).map_err(serialization)?;

    let mut overrides = serde_json::Map::new();
    if update.update_target_revision {
        if let Some(revision) = revision {
            overrides.insert("targetRevision".to_string(), json!(revision));
        }
    }
    if let Some(kustomize) = update.kustomize.as_ref().filter(|k| !k.images.is_empty()) {
        let existing = source
            .kustomize
            .as_ref()
            .map(|k| k.images.as_slice())
            .unwrap_or_default();
        overrides.insert(
            "kustomize".to_string(),
            json!({ "images": kustomize_images(existing, &kustomize.images) }),
        );
    }
    if let Some(helm) = update.helm.as_ref().filter(|h| !h.images.is_empty()) {
        let existing = source
            .helm
            .as_ref()
            .map(|h| h.parameters.as_slice())
            .unwrap_or_default();
        overrides.insert(
            "helm".to_string(),
            json!({ "parameters": helm_parameters(existing, &helm.images) }),
        );
    }

    if overrides.is_empty() {
        return Ok((source, false));
    }

    let after = recursive_merge(before.clone(), Value::Object(overrides));
    let updated = after != before;
    let source = serde_json::from_value(after).map_err(serialization)?;
    Ok((source, updated))
}

// ============================================================================
// Source matching
// ============================================================================

fn matching_rule<'a>(
    rules: &'a [SourceUpdateRule],
    source: &ApplicationSource,
) -> Option<&'a SourceUpdateRule> {
    rules.iter().find(|rule| source_matches(rule, source))
}

fn source_matches(rule: &SourceUpdateRule, source: &ApplicationSource) -> bool {
    normalize_repo_url(&rule.repo_url) == normalize_repo_url(&source.repo_url)
        && rule.chart.as_deref().unwrap_or_default() == source.chart.as_deref().unwrap_or_default()
}

/// Canonical form of a repository URL for comparison.
pub fn normalize_repo_url(url: &str) -> String {
    let url = url.trim().to_lowercase();
    let url = url.trim_end_matches('/');
    url.strip_suffix(".git").unwrap_or(url).to_string()
}

// ============================================================================
// Image encoding
// ============================================================================

/// Kustomize image override token.
///
/// - digest: `<image>@<digest>`
/// - tag: `<image>:<tag>`
/// - tag with rename: `<image>=<newName>:<tag>`
pub fn kustomize_image_token(update: &KustomizeImageUpdate) -> String {
    let new_name = update.new_name.as_deref().filter(|n| !n.is_empty());
    let target = match new_name {
        Some(name) => format!("{}={}", update.repo_url, name),
        None => update.repo_url.clone(),
    };
    match update.digest.as_deref().filter(|d| !d.is_empty()) {
        Some(digest) => format!("{}@{}", target, digest),
        None => format!("{}:{}", target, update.tag.as_deref().unwrap_or_default()),
    }
}

/// Image an override token applies to.
fn kustomize_image_name(token: &str) -> &str {
    if let Some((name, _)) = token.split_once('=') {
        return name;
    }
    if let Some((name, _)) = token.split_once('@') {
        return name;
    }
    // A ':' before the last '/' belongs to a registry port, not a tag.
    let last_slash = token.rfind('/').map(|i| i + 1).unwrap_or(0);
    match token[last_slash..].rfind(':') {
        Some(colon) => &token[..last_slash + colon],
        None => token,
    }
}

fn kustomize_images(existing: &[String], updates: &[KustomizeImageUpdate]) -> Vec<String> {
    let mut images = existing.to_vec();
    for update in updates {
        let token = kustomize_image_token(update);
        match images
            .iter_mut()
            .find(|image| kustomize_image_name(image) == update.repo_url)
        {
            Some(image) => *image = token,
            None => images.push(token),
        }
    }
    images
}

fn helm_parameters(existing: &[HelmParameter], updates: &[HelmImageUpdate]) -> Vec<Value> {
    let mut params: Vec<Value> = existing
        .iter()
        .map(|p| json!({ "name": p.name, "value": p.value }))
        .collect();
    for update in updates {
        let param = json!({ "name": update.key, "value": update.value });
        match params.iter().position(|p| p["name"] == update.key.as_str()) {
            Some(i) => params[i] = param,
            None => params.push(param),
        }
    }
    params
}
