//! Argo CD integration.
//!
//! - `types`: the Application resource model
//! - `client`: `ApplicationClient` seam and its kube-backed implementation
//! - `events`: audit event recording on Applications
//! - `mock`: in-memory implementations for tests

pub mod client;
pub mod events;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod types;

pub use client::{ApplicationClient, ClientError, KubeApplicationClient};
pub use events::{AuditEvent, EventRecorder, KubeEventRecorder};
pub use types::{
    Application, ApplicationSource, ApplicationSpec, ApplicationStatus, HelmParameter,
    HelmSource, Info, KustomizeSource, Operation, OperationInitiator, OperationPhase,
    OperationState, SyncOperation, SyncOperationResult, SyncPolicy,
};

/// Default namespace Argo CD Applications live in.
pub const DEFAULT_APPLICATION_NAMESPACE: &str = "argocd";

/// Annotation on an Application naming the one stage allowed to mutate it,
/// formatted as `<project>:<stage>`.
pub const AUTHORIZED_STAGE_ANNOTATION: &str = "promoter.dev/authorized-stage";

/// Operation info key stamped with the promotion that requested the operation.
pub const PROMOTION_INFO_KEY: &str = "promoter.dev/promotion";

/// Username recorded as the initiator of operations this engine requests.
pub const OPERATION_INITIATOR: &str = "promoter-controller";

/// Event reason recorded when a sync is requested.
pub const SYNC_EVENT_REASON: &str = "OperationStarted";
