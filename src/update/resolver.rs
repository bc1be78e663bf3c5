//! Discovery of the Applications an update rule targets.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::authorization::AuthorizationGate;
use super::error::{Result, UpdateError};
use super::selector::Selector;
use super::ApplicationResolving;
use crate::argocd::{Application, ApplicationClient};
use crate::config::ApplicationUpdateRule;
use crate::promotion::PromotionIdentity;

/// Resolves rules to authorized Applications, by name or by selector.
pub struct ApplicationResolver {
    client: Arc<dyn ApplicationClient>,
    gate: AuthorizationGate,
    default_namespace: String,
}

impl ApplicationResolver {
    pub fn new(
        client: Arc<dyn ApplicationClient>,
        gate: AuthorizationGate,
        default_namespace: impl Into<String>,
    ) -> Self {
        Self {
            client,
            gate,
            default_namespace: default_namespace.into(),
        }
    }

    async fn resolve_by_name(
        &self,
        identity: &PromotionIdentity,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<Application>> {
        let app = self
            .client
            .get(namespace, name)
            .await
            .map_err(|e| UpdateError::client_for("getting", &format!("{}/{}", namespace, name), e))?
            .ok_or_else(|| UpdateError::ApplicationNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;

        self.gate.authorize(identity, &app.metadata)?;
        Ok(vec![app])
    }

    async fn resolve_by_selector(
        &self,
        identity: &PromotionIdentity,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<Application>> {
        let apps = self
            .client
            .list(namespace, selector)
            .await
            .map_err(|e| UpdateError::client("listing", namespace, e))?;

        if apps.is_empty() {
            return Err(UpdateError::NoMatchingApplications {
                namespace: namespace.to_string(),
                selector: selector.to_string(),
            });
        }

        let matched = apps.len();
        let authorized: Vec<Application> = apps
            .into_iter()
            .filter(|app| {
                let ok = self.gate.is_authorized(identity, &app.metadata);
                if !ok {
                    debug!(application = %app.key(), stage = %identity, "Skipping unauthorized Application");
                }
                ok
            })
            .collect();

        if authorized.is_empty() {
            return Err(UpdateError::NoneAuthorized {
                matched,
                selector: selector.to_string(),
                stage: identity.to_string(),
            });
        }

        info!(
            namespace,
            selector = %selector,
            matched,
            authorized = authorized.len(),
            "Resolved Applications by selector"
        );
        Ok(authorized)
    }
}

#[async_trait]
impl ApplicationResolving for ApplicationResolver {
    async fn resolve(
        &self,
        identity: &PromotionIdentity,
        rule: &ApplicationUpdateRule,
    ) -> Result<Vec<Application>> {
        let namespace = rule.namespace_or(&self.default_namespace);
        match (rule.name.as_deref(), &rule.selector) {
            (Some(name), None) => self.resolve_by_name(identity, namespace, name).await,
            (None, Some(spec)) => {
                let selector = Selector::build(spec)?;
                self.resolve_by_selector(identity, namespace, &selector)
                    .await
            }
            _ => Err(UpdateError::InvalidSelector(
                "exactly one of name or selector must be set".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;
    use crate::argocd::mock::MockApplicationClient;
    use crate::argocd::AUTHORIZED_STAGE_ANNOTATION;
    use crate::config::SelectorSpec;

    fn app(name: &str, authorized_for: Option<&str>, labels: &[(&str, &str)]) -> Application {
        Application {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("argocd".to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                annotations: authorized_for.map(|v| {
                    BTreeMap::from([(AUTHORIZED_STAGE_ANNOTATION.to_string(), v.to_string())])
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn resolver(client: Arc<MockApplicationClient>) -> ApplicationResolver {
        ApplicationResolver::new(
            client,
            AuthorizationGate::new(AUTHORIZED_STAGE_ANNOTATION),
            "argocd",
        )
    }

    fn identity() -> PromotionIdentity {
        PromotionIdentity::new("promo-1", "shop", "prod")
    }

    fn by_name(name: &str) -> ApplicationUpdateRule {
        ApplicationUpdateRule {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn by_label(key: &str, value: &str) -> ApplicationUpdateRule {
        ApplicationUpdateRule {
            selector: Some(SelectorSpec {
                match_labels: BTreeMap::from([(key.to_string(), value.to_string())]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_resolve_by_name() {
        let client = Arc::new(MockApplicationClient::new());
        client.insert(app("guestbook", Some("shop:prod"), &[])).await;

        let apps = resolver(client).resolve(&identity(), &by_name("guestbook")).await.unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].name(), "guestbook");
    }

    #[tokio::test]
    async fn test_resolve_by_name_not_found() {
        let client = Arc::new(MockApplicationClient::new());
        let err = resolver(client)
            .resolve(&identity(), &by_name("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::ApplicationNotFound { .. }));
    }

    #[tokio::test]
    async fn test_resolve_by_name_unauthorized() {
        let client = Arc::new(MockApplicationClient::new());
        client.insert(app("guestbook", Some("shop:staging"), &[])).await;

        let err = resolver(client)
            .resolve(&identity(), &by_name("guestbook"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::NotPermitted { .. }));
    }

    #[tokio::test]
    async fn test_resolve_by_selector_filters_unauthorized_in_listing_order() {
        let client = Arc::new(MockApplicationClient::new());
        client.insert(app("c", Some("shop:prod"), &[("team", "a")])).await;
        client.insert(app("a", Some("shop:staging"), &[("team", "a")])).await;
        client.insert(app("b", Some("shop:prod"), &[("team", "a")])).await;
        client.insert(app("d", Some("shop:prod"), &[("team", "b")])).await;

        let apps = resolver(client)
            .resolve(&identity(), &by_label("team", "a"))
            .await
            .unwrap();
        let names: Vec<_> = apps.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_resolve_by_selector_no_matches() {
        let client = Arc::new(MockApplicationClient::new());
        client.insert(app("a", Some("shop:prod"), &[("team", "b")])).await;

        let err = resolver(client)
            .resolve(&identity(), &by_label("team", "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::NoMatchingApplications { .. }));
    }

    #[tokio::test]
    async fn test_resolve_by_selector_none_authorized() {
        let client = Arc::new(MockApplicationClient::new());
        client.insert(app("a", Some("shop:staging"), &[("team", "a")])).await;
        client.insert(app("b", None, &[("team", "a")])).await;

        let err = resolver(client)
            .resolve(&identity(), &by_label("team", "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::NoneAuthorized { matched: 2, .. }));
        assert!(err.to_string().contains("shop:prod"));
    }

    #[tokio::test]
    async fn test_list_failure_is_wrapped() {
        let client = Arc::new(MockApplicationClient::new());
        client.set_fail_on_list(Some("connection refused")).await;

        let err = resolver(client)
            .resolve(&identity(), &by_label("team", "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::Client { .. }));
        assert!(!err.is_terminal());
        assert!(err.to_string().contains("connection refused"));
    }
}
