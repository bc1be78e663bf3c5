//! Access to live Application resources.

use async_trait::async_trait;
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    Client,
};
use serde_json::Value;
use tracing::debug;

use super::types::Application;
use crate::update::selector::Selector;

/// Errors talking to the Kubernetes API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Read/patch access to Applications.
///
/// Implementations:
/// - `KubeApplicationClient`: the Kubernetes API server
/// - `MockApplicationClient`: in-memory, for tests
#[async_trait]
pub trait ApplicationClient: Send + Sync {
    /// Fetch an Application by name. `Ok(None)` if it does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Application>, ClientError>;

    /// List Applications in a namespace matching the selector.
    async fn list(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<Application>, ClientError>;

    /// Apply a JSON merge patch to an Application, returning the updated object.
    async fn patch(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<Application, ClientError>;
}

/// `ApplicationClient` backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeApplicationClient {
    client: Client,
    field_manager: String,
}

impl KubeApplicationClient {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api(&self, namespace: &str) -> Api<Application> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ApplicationClient for KubeApplicationClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Application>, ClientError> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn list(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<Application>, ClientError> {
        let lp = ListParams::default().labels(&selector.to_string());
        let list = self.api(namespace).list(&lp).await?;
        debug!(namespace, selector = %selector, count = list.items.len(), "Listed Applications");
        Ok(list.items)
    }

    async fn patch(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<Application, ClientError> {
        let params = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        Ok(self
            .api(namespace)
            .patch(name, &params, &Patch::Merge(patch))
            .await?)
    }
}
