//! Step definitions for the argocd-update scenarios.

use std::collections::BTreeMap;
use std::sync::Arc;

use argocd_promoter::argocd::mock::{MockApplicationClient, MockEventRecorder};
use argocd_promoter::argocd::{
    Application, ApplicationSource, ApplicationSpec, ApplicationStatus, Info, KustomizeSource,
    Operation, OperationInitiator, OperationPhase, OperationState, SyncOperationResult,
    AUTHORIZED_STAGE_ANNOTATION, OPERATION_INITIATOR, PROMOTION_INFO_KEY,
};
use argocd_promoter::config::ArgoCdSettings;
use argocd_promoter::promotion::{PromotionIdentity, StepContext, StepResult, StepRunner};
use argocd_promoter::update::ArgoCdUpdater;
use cucumber::{given, then, when, World};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{json, Value};

const NAMESPACE: &str = "argocd";
const REPO: &str = "https://github.com/example/deploy";

/// Test context for argocd-update scenarios.
#[derive(Debug, World)]
#[world(init = Self::new)]
pub struct ArgoCdUpdateWorld {
    client: Arc<MockApplicationClient>,
    events: Arc<MockEventRecorder>,
    identity: PromotionIdentity,
    result: Option<StepResult>,
}

impl ArgoCdUpdateWorld {
    fn new() -> Self {
        Self {
            client: Arc::new(MockApplicationClient::new()),
            events: Arc::new(MockEventRecorder::new()),
            identity: PromotionIdentity::default(),
            result: None,
        }
    }

    async fn app(&self, name: &str) -> Application {
        self.client
            .application(NAMESPACE, name)
            .await
            .unwrap_or_else(|| panic!("Application {} not found", name))
    }

    async fn run_step(&mut self, config: Value) {
        let updater = ArgoCdUpdater::from_settings(
            self.client.clone(),
            self.events.clone(),
            &ArgoCdSettings::default(),
        );
        let ctx = StepContext::new(self.identity.clone()).with_user("alice");
        self.result = Some(updater.run(&ctx, config).await);
    }

    fn result(&self) -> &StepResult {
        self.result.as_ref().expect("step has not run")
    }
}

fn source_update(revision: &str) -> Value {
    json!({
        "repoURL": REPO,
        "desiredRevision": revision,
        "updateTargetRevision": true,
    })
}

// --- Given steps ---

#[given(expr = "the promotion {string} of stage {string}")]
async fn given_promotion(world: &mut ArgoCdUpdateWorld, promotion: String, stage: String) {
    let (project, stage) = stage.split_once(':').expect("stage must be <project>:<stage>");
    world.identity = PromotionIdentity::new(promotion, project, stage);
}

#[given(expr = "an Application {string} authorized for {string}")]
async fn given_application(world: &mut ArgoCdUpdateWorld, name: String, authorized: String) {
    let app = Application {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([("team".to_string(), "a".to_string())])),
            annotations: Some(BTreeMap::from([(
                AUTHORIZED_STAGE_ANNOTATION.to_string(),
                authorized,
            )])),
            ..Default::default()
        },
        spec: ApplicationSpec {
            source: Some(ApplicationSource {
                repo_url: REPO.to_string(),
                path: Some("overlays/prod".to_string()),
                target_revision: "v1".to_string(),
                kustomize: Some(KustomizeSource::default()),
                ..Default::default()
            }),
            ..Default::default()
        },
        ..Default::default()
    };
    world.client.insert(app).await;
}

#[given(expr = "Application {string} was synced to {string} by this promotion")]
async fn given_synced(world: &mut ArgoCdUpdateWorld, name: String, revision: String) {
    let mut app = world.app(&name).await;
    if let Some(source) = app.spec.source.as_mut() {
        source.target_revision = revision.clone();
    }
    app.status = Some(ApplicationStatus {
        operation_state: Some(OperationState {
            operation: Operation {
                initiated_by: OperationInitiator {
                    username: OPERATION_INITIATOR.to_string(),
                    automated: true,
                },
                info: vec![Info {
                    name: PROMOTION_INFO_KEY.to_string(),
                    value: world.identity.promotion.clone(),
                }],
                ..Default::default()
            },
            phase: OperationPhase::Succeeded,
            sync_result: Some(SyncOperationResult {
                revision,
                revisions: vec![],
            }),
            ..Default::default()
        }),
    });
    world.client.insert(app).await;
}

#[given(expr = "Application {string} is being synced by {string}")]
async fn given_running(world: &mut ArgoCdUpdateWorld, name: String, user: String) {
    let mut app = world.app(&name).await;
    app.status = Some(ApplicationStatus {
        operation_state: Some(OperationState {
            operation: Operation {
                initiated_by: OperationInitiator {
                    username: user,
                    automated: false,
                },
                ..Default::default()
            },
            phase: OperationPhase::Running,
            ..Default::default()
        }),
    });
    world.client.insert(app).await;
}

#[given(expr = "Application {string} deploys from {string}")]
async fn given_repo(world: &mut ArgoCdUpdateWorld, name: String, repo_url: String) {
    let mut app = world.app(&name).await;
    if let Some(source) = app.spec.source.as_mut() {
        source.repo_url = repo_url;
    }
    world.client.insert(app).await;
}

#[given(expr = "patching Application {string} fails with {string}")]
async fn given_patch_failure(world: &mut ArgoCdUpdateWorld, name: String, message: String) {
    world.client.set_fail_on_patch(&name, &message).await;
}

// --- When steps ---

#[when(expr = "the step updates Applications labelled {string} to revision {string}")]
async fn when_update_by_label(world: &mut ArgoCdUpdateWorld, label: String, revision: String) {
    let (key, value) = label.split_once('=').expect("label must be key=value");
    let mut labels = serde_json::Map::new();
    labels.insert(key.to_string(), json!(value));
    world
        .run_step(json!({
            "apps": [{
                "selector": { "matchLabels": labels },
                "sources": [source_update(&revision)],
            }]
        }))
        .await;
}

#[when(expr = "the step updates Application {string} to revision {string}")]
async fn when_update_by_name(world: &mut ArgoCdUpdateWorld, name: String, revision: String) {
    world
        .run_step(json!({
            "apps": [{ "name": name, "sources": [source_update(&revision)] }]
        }))
        .await;
}

#[when(
    expr = "the step sets kustomize image {string} of Application {string} with tag {string}, digest {string} and new name {string}"
)]
async fn when_kustomize_image(
    world: &mut ArgoCdUpdateWorld,
    image: String,
    name: String,
    tag: String,
    digest: String,
    new_name: String,
) {
    let mut update = serde_json::Map::new();
    update.insert("repoURL".to_string(), json!(image));
    for (field, value) in [("tag", tag), ("digest", digest), ("newName", new_name)] {
        if !value.is_empty() {
            update.insert(field.to_string(), json!(value));
        }
    }
    world
        .run_step(json!({
            "apps": [{
                "name": name,
                "sources": [{ "repoURL": REPO, "kustomize": { "images": [update] } }],
            }]
        }))
        .await;
}

// --- Then steps ---

#[then(expr = "the step status is {string}")]
async fn then_status(world: &mut ArgoCdUpdateWorld, status: String) {
    let result = world.result();
    assert_eq!(
        format!("{:?}", result.status),
        status,
        "message: {:?}",
        result.message
    );
}

#[then("a retry is requested")]
async fn then_retry(world: &mut ArgoCdUpdateWorld) {
    assert!(world.result().retry_after.is_some());
}

#[then(expr = "the health check lists {string}")]
async fn then_health_check(world: &mut ArgoCdUpdateWorld, names: String) {
    let listed: Vec<String> = world
        .result()
        .health_check
        .as_ref()
        .expect("no health check")
        .apps
        .iter()
        .map(|a| a.name.clone())
        .collect();
    let expected: Vec<&str> = names.split(',').collect();
    assert_eq!(listed, expected);
}

#[then(expr = "the message mentions {string}")]
async fn then_message(world: &mut ArgoCdUpdateWorld, text: String) {
    let message = world.result().message.clone().unwrap_or_default();
    assert!(message.contains(&text), "{:?} not in {:?}", text, message);
}

#[then("no Application was patched")]
async fn then_nothing_patched(world: &mut ArgoCdUpdateWorld) {
    assert!(world.client.patches().await.is_empty());
}

#[then(expr = "Application {string} was not patched")]
async fn then_not_patched(world: &mut ArgoCdUpdateWorld, name: String) {
    assert!(!world.client.patched_names().await.contains(&name));
}

#[then(expr = "Application {string} targets revision {string}")]
async fn then_target_revision(world: &mut ArgoCdUpdateWorld, name: String, revision: String) {
    let app = world.app(&name).await;
    assert_eq!(app.spec.source.expect("no source").target_revision, revision);
    let sync = app.operation.and_then(|op| op.sync).expect("no sync requested");
    assert_eq!(sync.revision, revision);
}

#[then(expr = "Application {string} has kustomize image {string}")]
async fn then_kustomize_image(world: &mut ArgoCdUpdateWorld, name: String, token: String) {
    let app = world.app(&name).await;
    let images = app
        .spec
        .source
        .and_then(|s| s.kustomize)
        .map(|k| k.images)
        .unwrap_or_default();
    assert_eq!(images, vec![token]);
}

#[then(expr = "an audit event on {string} reads {string}")]
async fn then_audit_event(world: &mut ArgoCdUpdateWorld, name: String, note: String) {
    let key = format!("{}/{}", NAMESPACE, name);
    let events = world.events.events().await;
    assert!(
        events.iter().any(|(app, event)| *app == key && event.note == note),
        "{:?}",
        events
    );
}
