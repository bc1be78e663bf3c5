//! Mock Application client and event recorder for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::client::{ApplicationClient, ClientError};
use super::events::{AuditEvent, EventRecorder};
use super::types::Application;
use crate::update::selector::Selector;

/// A patch issued through the mock client.
#[derive(Debug, Clone)]
pub struct RecordedPatch {
    pub namespace: String,
    pub name: String,
    pub patch: Value,
}

/// In-memory Application store.
///
/// Listing returns Applications in insertion order. Patches are applied as
/// JSON merge patches (RFC 7386) and recorded for assertions.
#[derive(Debug, Default)]
pub struct MockApplicationClient {
    apps: RwLock<Vec<Application>>,
    patches: RwLock<Vec<RecordedPatch>>,
    fail_on_get: RwLock<Option<String>>,
    fail_on_list: RwLock<Option<String>>,
    fail_on_patch: RwLock<HashMap<String, String>>,
}

impl MockApplicationClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, app: Application) {
        let mut apps = self.apps.write().await;
        apps.retain(|a| !(a.namespace() == app.namespace() && a.name() == app.name()));
        apps.push(app);
    }

    pub async fn application(&self, namespace: &str, name: &str) -> Option<Application> {
        self.apps
            .read()
            .await
            .iter()
            .find(|a| a.namespace() == namespace && a.name() == name)
            .cloned()
    }

    pub async fn patches(&self) -> Vec<RecordedPatch> {
        self.patches.read().await.clone()
    }

    pub async fn patched_names(&self) -> Vec<String> {
        self.patches
            .read()
            .await
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }

    pub async fn set_fail_on_get(&self, message: Option<&str>) {
        *self.fail_on_get.write().await = message.map(str::to_string);
    }

    pub async fn set_fail_on_list(&self, message: Option<&str>) {
        *self.fail_on_list.write().await = message.map(str::to_string);
    }

    /// Make patches of the named Application fail with `message`.
    pub async fn set_fail_on_patch(&self, name: &str, message: &str) {
        self.fail_on_patch
            .write()
            .await
            .insert(name.to_string(), message.to_string());
    }
}

#[async_trait]
impl ApplicationClient for MockApplicationClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Application>, ClientError> {
        if let Some(message) = self.fail_on_get.read().await.clone() {
            return Err(ClientError::Other(message));
        }
        Ok(self.application(namespace, name).await)
    }

    async fn list(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<Application>, ClientError> {
        if let Some(message) = self.fail_on_list.read().await.clone() {
            return Err(ClientError::Other(message));
        }
        let empty = Default::default();
        Ok(self
            .apps
            .read()
            .await
            .iter()
            .filter(|a| a.namespace() == namespace)
            .filter(|a| selector.matches(a.metadata.labels.as_ref().unwrap_or(&empty)))
            .cloned()
            .collect())
    }

    async fn patch(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<Application, ClientError> {
        if let Some(message) = self.fail_on_patch.read().await.get(name) {
            return Err(ClientError::Other(message.clone()));
        }

        let mut apps = self.apps.write().await;
        let app = apps
            .iter_mut()
            .find(|a| a.namespace() == namespace && a.name() == name)
            .ok_or_else(|| ClientError::Other(format!("{}/{} not found", namespace, name)))?;

        let mut doc = serde_json::to_value(&*app)?;
        json_patch::merge(&mut doc, patch);
        *app = serde_json::from_value(doc)?;

        self.patches.write().await.push(RecordedPatch {
            namespace: namespace.to_string(),
            name: name.to_string(),
            patch: patch.clone(),
        });
        Ok(app.clone())
    }
}

/// Event recorder that keeps events in memory.
#[derive(Debug, Default)]
pub struct MockEventRecorder {
    events: RwLock<Vec<(String, AuditEvent)>>,
    fail: RwLock<bool>,
}

impl MockEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded `(namespace/name, event)` pairs.
    pub async fn events(&self) -> Vec<(String, AuditEvent)> {
        self.events.read().await.clone()
    }

    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }
}

#[async_trait]
impl EventRecorder for MockEventRecorder {
    async fn record(&self, app: &Application, event: AuditEvent) -> Result<(), ClientError> {
        if *self.fail.read().await {
            return Err(ClientError::Other("event sink unavailable".to_string()));
        }
        self.events.write().await.push((app.key(), event));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argocd::{ApplicationSource, ApplicationSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::json;

    #[tokio::test]
    async fn test_patch_merges_and_removes_nulls() {
        let client = MockApplicationClient::new();
        client
            .insert(Application {
                metadata: ObjectMeta {
                    name: Some("guestbook".to_string()),
                    namespace: Some("argocd".to_string()),
                    ..Default::default()
                },
                spec: ApplicationSpec {
                    project: "default".to_string(),
                    source: Some(ApplicationSource {
                        repo_url: "https://a".to_string(),
                        target_revision: "v1".to_string(),
                        path: Some("app".to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await;

        let patched = client
            .patch(
                "argocd",
                "guestbook",
                &json!({"spec": {"source": {"targetRevision": "v2", "path": null}}}),
            )
            .await
            .unwrap();

        let source = patched.spec.source.unwrap();
        assert_eq!(source.target_revision, "v2");
        assert_eq!(source.path, None);
        assert_eq!(source.repo_url, "https://a");
        assert_eq!(patched.spec.project, "default");
        assert_eq!(client.patched_names().await, vec!["guestbook".to_string()]);
    }
}
