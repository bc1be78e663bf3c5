//! Stage authorization for Application mutation.
//!
//! An Application opts in to being updated by exactly one stage by carrying
//! an annotation whose value is `<project>:<stage>`.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::error::{Result, UpdateError};
use crate::promotion::PromotionIdentity;

#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    annotation: String,
}

impl AuthorizationGate {
    pub fn new(annotation: impl Into<String>) -> Self {
        Self {
            annotation: annotation.into(),
        }
    }

    /// Check that `identity`'s stage may mutate the object described by `meta`.
    pub fn authorize(&self, identity: &PromotionIdentity, meta: &ObjectMeta) -> Result<()> {
        let application = format!(
            "{}/{}",
            meta.namespace.as_deref().unwrap_or_default(),
            meta.name.as_deref().unwrap_or_default()
        );
        let not_permitted = || UpdateError::NotPermitted {
            application: application.clone(),
            stage: identity.to_string(),
        };

        let Some(value) = meta
            .annotations
            .as_ref()
            .and_then(|a| a.get(&self.annotation))
        else {
            return Err(not_permitted());
        };

        let (project, stage) = match value.split_once(':') {
            Some((p, s)) if !p.is_empty() && !s.is_empty() && !s.contains(':') => (p, s),
            _ => {
                return Err(UpdateError::AuthorizationParse {
                    application: application.clone(),
                    annotation: self.annotation.clone(),
                    value: value.clone(),
                })
            }
        };

        if project.contains('*') || stage.contains('*') {
            return Err(UpdateError::DeprecatedGlob {
                application: application.clone(),
                annotation: self.annotation.clone(),
                value: value.clone(),
            });
        }

        if project != identity.project || stage != identity.stage {
            return Err(not_permitted());
        }
        Ok(())
    }

    /// Convenience for filtering: true when `authorize` succeeds.
    pub fn is_authorized(&self, identity: &PromotionIdentity, meta: &ObjectMeta) -> bool {
        self.authorize(identity, meta).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::argocd::AUTHORIZED_STAGE_ANNOTATION;

    fn meta(annotation: Option<&str>) -> ObjectMeta {
        ObjectMeta {
            name: Some("guestbook".to_string()),
            namespace: Some("argocd".to_string()),
            annotations: annotation.map(|v| {
                BTreeMap::from([(AUTHORIZED_STAGE_ANNOTATION.to_string(), v.to_string())])
            }),
            ..Default::default()
        }
    }

    fn gate() -> AuthorizationGate {
        AuthorizationGate::new(AUTHORIZED_STAGE_ANNOTATION)
    }

    fn identity() -> PromotionIdentity {
        PromotionIdentity::new("promo-1", "shop", "prod")
    }

    #[test]
    fn test_authorized() {
        assert!(gate().authorize(&identity(), &meta(Some("shop:prod"))).is_ok());
    }

    #[test]
    fn test_missing_annotation_not_permitted() {
        let err = gate().authorize(&identity(), &meta(None)).unwrap_err();
        assert!(matches!(err, UpdateError::NotPermitted { .. }));
        assert!(err.to_string().contains("argocd/guestbook"));
    }

    #[test]
    fn test_other_stage_not_permitted() {
        for value in ["shop:staging", "other:prod", "SHOP:prod"] {
            let err = gate().authorize(&identity(), &meta(Some(value))).unwrap_err();
            assert!(matches!(err, UpdateError::NotPermitted { .. }), "{value}");
        }
    }

    #[test]
    fn test_malformed_value_is_parse_error() {
        for value in ["shop", "shop:", ":prod", "", "a:b:c"] {
            let err = gate().authorize(&identity(), &meta(Some(value))).unwrap_err();
            assert!(matches!(err, UpdateError::AuthorizationParse { .. }), "{value}");
        }
    }

    #[test]
    fn test_glob_is_rejected_even_when_it_would_match() {
        for value in ["shop:*", "*:prod", "*:*", "shop:pr*"] {
            let err = gate().authorize(&identity(), &meta(Some(value))).unwrap_err();
            assert!(matches!(err, UpdateError::DeprecatedGlob { .. }), "{value}");
        }
    }
}
