//! Label selector compilation and evaluation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::error::{Result, UpdateError};
use crate::config::{SelectorOperator, SelectorSpec};

/// One ANDed term of a selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Equals { key: String, value: String },
    In { key: String, values: BTreeSet<String> },
    NotIn { key: String, values: BTreeSet<String> },
    Exists { key: String },
    DoesNotExist { key: String },
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Equals { key, value } => labels.get(key) == Some(value),
            Self::In { key, values } => labels.get(key).is_some_and(|v| values.contains(v)),
            Self::NotIn { key, values } => !labels.get(key).is_some_and(|v| values.contains(v)),
            Self::Exists { key } => labels.contains_key(key),
            Self::DoesNotExist { key } => !labels.contains_key(key),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |values: &BTreeSet<String>| {
            values.iter().map(String::as_str).collect::<Vec<_>>().join(",")
        };
        match self {
            Self::Equals { key, value } => write!(f, "{}={}", key, value),
            Self::In { key, values } => write!(f, "{} in ({})", key, join(values)),
            Self::NotIn { key, values } => write!(f, "{} notin ({})", key, join(values)),
            Self::Exists { key } => write!(f, "{}", key),
            Self::DoesNotExist { key } => write!(f, "!{}", key),
        }
    }
}

/// A compiled, non-empty label selector.
///
/// `Display` renders the Kubernetes label selector syntax understood by the
/// API server; `matches` evaluates the same terms in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Compile a selector spec. An empty spec is an error, never "match all".
    pub fn build(spec: &SelectorSpec) -> Result<Self> {
        if spec.is_empty() {
            return Err(UpdateError::InvalidSelector(
                "selector must specify matchLabels or matchExpressions".to_string(),
            ));
        }

        let mut requirements: Vec<Requirement> = spec
            .match_labels
            .iter()
            .map(|(key, value)| Requirement::Equals {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();

        for expr in &spec.match_expressions {
            expr.check()
                .map_err(|reason| UpdateError::InvalidSelector(format!("{}: {}", expr.key, reason)))?;
            let key = expr.key.clone();
            let values = || expr.values.iter().cloned().collect::<BTreeSet<_>>();
            requirements.push(match expr.operator {
                SelectorOperator::In => Requirement::In {
                    key,
                    values: values(),
                },
                SelectorOperator::NotIn => Requirement::NotIn {
                    key,
                    values: values(),
                },
                SelectorOperator::Exists => Requirement::Exists { key },
                SelectorOperator::DoesNotExist => Requirement::DoesNotExist { key },
            });
        }

        Ok(Self { requirements })
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, requirement) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", requirement)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectorRequirement;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn expr(key: &str, operator: SelectorOperator, values: &[&str]) -> SelectorRequirement {
        SelectorRequirement {
            key: key.to_string(),
            operator,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn test_empty_selector_rejected() {
        let err = Selector::build(&SelectorSpec::default()).unwrap_err();
        assert!(matches!(err, UpdateError::InvalidSelector(_)));
    }

    #[test]
    fn test_match_labels_are_anded() {
        let selector = Selector::build(&SelectorSpec {
            match_labels: labels(&[("app", "shop"), ("env", "prod")]),
            ..Default::default()
        })
        .unwrap();

        assert!(selector.matches(&labels(&[("app", "shop"), ("env", "prod"), ("x", "y")])));
        assert!(!selector.matches(&labels(&[("app", "shop")])));
        assert!(!selector.matches(&labels(&[("app", "shop"), ("env", "dev")])));
        assert_eq!(selector.to_string(), "app=shop,env=prod");
    }

    #[test]
    fn test_expressions() {
        let selector = Selector::build(&SelectorSpec {
            match_labels: labels(&[("app", "shop")]),
            match_expressions: vec![
                expr("tier", SelectorOperator::In, &["web", "api"]),
                expr("canary", SelectorOperator::NotIn, &["true"]),
                expr("team", SelectorOperator::Exists, &[]),
                expr("frozen", SelectorOperator::DoesNotExist, &[]),
            ],
        })
        .unwrap();

        let base = [("app", "shop"), ("tier", "web"), ("team", "a")];
        assert!(selector.matches(&labels(&base)));
        assert!(!selector.matches(&labels(&[("app", "shop"), ("tier", "db"), ("team", "a")])));
        assert!(!selector.matches(&labels(&[("app", "shop"), ("tier", "web")])));
        assert!(!selector.matches(&labels(&[
            ("app", "shop"),
            ("tier", "web"),
            ("team", "a"),
            ("frozen", "yes"),
        ])));
        assert!(!selector.matches(&labels(&[
            ("app", "shop"),
            ("tier", "web"),
            ("team", "a"),
            ("canary", "true"),
        ])));
        assert_eq!(
            selector.to_string(),
            "app=shop,tier in (api,web),canary notin (true),team,!frozen"
        );
    }

    #[test]
    fn test_expression_without_values_rejected() {
        let err = Selector::build(&SelectorSpec {
            match_expressions: vec![expr("tier", SelectorOperator::In, &[])],
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("tier"));
    }
}
