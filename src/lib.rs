//! Argo CD promoter
//!
//! Reconciles Argo CD Applications toward the sources a promotion wants:
//! resolves and authorizes target Applications, updates their sources,
//! requests syncs, and reports progress as a promotion step result.

pub mod argocd;
pub mod config;
pub mod promotion;
pub mod update;
pub mod utils;
