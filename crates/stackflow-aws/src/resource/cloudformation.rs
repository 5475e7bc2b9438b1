//! Guest cluster stack reconciler
//!
//! Desired state is one stack whose body is composed from scratch on every
//! pass. Stack operations are asynchronous on the provider side; this
//! reconciler only issues the requests, later passes observe the outcome.

use crate::bootstrap::BootstrapRenderer;
use crate::client::{
    CloudFormationClient, CreateStackInput, Parameters, StackStatus, Tags, UpdateStackInput,
};
use crate::composer::{AdapterContext, StackComposer};
use crate::error::AwsError;
use crate::key;
use crate::spec::ClusterSpec;
use crate::template::ComposedStack;
use async_trait::async_trait;
use stackflow_cloud::{Patch, ReconcileError, Resource, ResourceItem, Result};
use stackflow_config::OperatorConfig;
use std::sync::Arc;

/// Minutes before the provider gives up on stack creation
const CREATE_TIMEOUT_MINUTES: u32 = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct StackState {
    pub name: String,
    pub template_body: String,
    pub parameters: Parameters,
    pub tags: Tags,
    /// Provider status; unknown for desired state
    pub status: Option<StackStatus>,
}

impl ResourceItem for StackState {
    fn key(&self) -> &str {
        &self.name
    }
}

pub struct StackResource {
    cloudformation: Arc<dyn CloudFormationClient>,
    config: Arc<OperatorConfig>,
    bootstrap: Arc<dyn BootstrapRenderer>,
    composer: StackComposer,
}

impl StackResource {
    pub fn new(
        cloudformation: Arc<dyn CloudFormationClient>,
        config: Arc<OperatorConfig>,
        bootstrap: Arc<dyn BootstrapRenderer>,
        composer: StackComposer,
    ) -> Self {
        Self {
            cloudformation,
            config,
            bootstrap,
            composer,
        }
    }

    pub fn composer(&self) -> &StackComposer {
        &self.composer
    }

    pub fn compose(&self, spec: &ClusterSpec) -> Result<ComposedStack> {
        self.composer.compose(&AdapterContext {
            spec,
            config: &self.config,
            bootstrap: self.bootstrap.as_ref(),
        })
    }

    /// The stack is converged by a single Change at most
    fn single<'a>(&self, stacks: Vec<&'a StackState>) -> Result<Option<&'a StackState>> {
        if stacks.len() > 1 {
            return Err(ReconcileError::contract(
                self.name(),
                format!("expected at most one stack per patch, got {}", stacks.len()),
            ));
        }
        Ok(stacks.into_iter().next())
    }
}

#[async_trait]
impl Resource<ClusterSpec> for StackResource {
    type State = StackState;

    fn name(&self) -> &str {
        "cloudformation"
    }

    async fn current_state(&self, spec: &ClusterSpec) -> Result<Vec<StackState>> {
        let name = key::stack_name(spec);

        let description = match self.cloudformation.describe_stack(&name).await {
            Ok(description) => description,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if description.status == StackStatus::DeleteComplete {
            return Ok(Vec::new());
        }
        if !key::is_owned(&description.tags, spec) {
            tracing::debug!(stack = %name, "stack is not owned by this cluster, ignoring");
            return Ok(Vec::new());
        }

        let template_body = self.cloudformation.get_template(&name).await?;
        Ok(vec![StackState {
            name,
            template_body,
            parameters: description.parameters,
            tags: description.tags,
            status: Some(description.status),
        }])
    }

    async fn desired_state(
        &self,
        spec: &ClusterSpec,
        _current: &[StackState],
    ) -> Result<Vec<StackState>> {
        if spec.deleting {
            return Ok(Vec::new());
        }

        let stack = self.compose(spec)?;
        Ok(vec![StackState {
            name: key::stack_name(spec),
            template_body: stack.body()?,
            parameters: stack.parameters,
            tags: key::cluster_tags(spec, &self.config),
            status: None,
        }])
    }

    fn needs_update(&self, current: &StackState, desired: &StackState) -> bool {
        let differs = current.template_body != desired.template_body
            || current.parameters != desired.parameters
            || current.tags != desired.tags;

        match current.status {
            Some(status) if differs && status.is_in_progress() => {
                tracing::info!(
                    stack = %current.name,
                    %status,
                    "stack is converging, deferring update to a later pass"
                );
                false
            }
            _ => differs,
        }
    }

    async fn apply_create(&self, _spec: &ClusterSpec, patch: &Patch<StackState>) -> Result<()> {
        let Some(stack) = self.single(patch.creates())? else {
            return Ok(());
        };

        let input = CreateStackInput {
            name: stack.name.clone(),
            template_body: stack.template_body.clone(),
            parameters: stack.parameters.clone(),
            tags: stack.tags.clone(),
            capabilities: vec![key::CAPABILITY_NAMED_IAM.to_string()],
            disable_rollback: false,
            timeout_minutes: Some(CREATE_TIMEOUT_MINUTES),
        };
        match self.cloudformation.create_stack(&input).await {
            Ok(()) => tracing::info!(stack = %stack.name, "requested stack creation"),
            Err(e) if e.is_already_exists() => {
                tracing::info!(stack = %stack.name, "stack already exists")
            }
            Err(e) => return Err(ReconcileError::from(e).in_change(&stack.name)),
        }
        Ok(())
    }

    async fn apply_update(&self, _spec: &ClusterSpec, patch: &Patch<StackState>) -> Result<()> {
        let Some(stack) = self.single(patch.updates())? else {
            return Ok(());
        };

        let input = UpdateStackInput {
            name: stack.name.clone(),
            template_body: stack.template_body.clone(),
            parameters: stack.parameters.clone(),
            tags: stack.tags.clone(),
            capabilities: vec![key::CAPABILITY_NAMED_IAM.to_string()],
        };
        match self.cloudformation.update_stack(&input).await {
            Ok(()) => tracing::info!(stack = %stack.name, "requested stack update"),
            Err(AwsError::NoUpdates(_)) => {
                tracing::debug!(stack = %stack.name, "no updates to be performed")
            }
            Err(e) => return Err(ReconcileError::from(e).in_change(&stack.name)),
        }
        Ok(())
    }

    async fn apply_delete(&self, _spec: &ClusterSpec, patch: &Patch<StackState>) -> Result<()> {
        let Some(stack) = self.single(patch.deletes())? else {
            return Ok(());
        };

        if stack.status.is_some_and(|s| s.is_deleting()) {
            tracing::debug!(stack = %stack.name, "stack is already being deleted");
            return Ok(());
        }
        match self.cloudformation.delete_stack(&stack.name).await {
            Ok(()) => tracing::info!(stack = %stack.name, "requested stack deletion"),
            Err(e) if e.is_not_found() => {
                tracing::debug!(stack = %stack.name, "stack already gone")
            }
            Err(e) => return Err(ReconcileError::from(e).in_change(&stack.name)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ComputeAdapter, GuestIamAdapter, NetworkAdapter};
    use crate::bootstrap::CloudConfigRenderer;
    use crate::error::AwsError;
    use crate::memory::MemoryCloud;
    use crate::spec::tests::{cluster, operator_config};
    use stackflow_cloud::{ChangeKind, ErrorClass};

    const STACK: &str = "cluster-al9qy-guest-main";

    fn setup(cloud: Arc<MemoryCloud>) -> StackResource {
        StackResource::new(
            cloud,
            Arc::new(operator_config()),
            Arc::new(CloudConfigRenderer),
            StackComposer::new("guest cluster")
                .with(NetworkAdapter)
                .with(GuestIamAdapter)
                .with(ComputeAdapter),
        )
    }

    #[tokio::test]
    async fn test_create_then_converged() {
        let cloud = Arc::new(MemoryCloud::new("123456789012"));
        let resource = setup(cloud.clone());
        let spec = cluster();

        let summary = resource.reconcile(&spec).await.unwrap();
        assert_eq!(summary.create, 1);
        assert_eq!(cloud.calls_of("create_stack").await, vec![STACK]);

        let snapshot = cloud.snapshot().await;
        assert!(key::is_owned(&snapshot.stacks[STACK].tags, &spec));

        let summary = resource.reconcile(&spec).await.unwrap();
        assert!(!summary.has_changes());
        assert!(cloud.calls_of("update_stack").await.is_empty());
    }

    #[tokio::test]
    async fn test_changed_spec_updates_stack_in_place() {
        let cloud = Arc::new(MemoryCloud::new("123456789012"));
        let resource = setup(cloud.clone());
        let mut spec = cluster();
        resource.reconcile(&spec).await.unwrap();

        spec.workers.count = 5;
        let current = resource.current_state(&spec).await.unwrap();
        let desired = resource.desired_state(&spec, &current).await.unwrap();
        let patch = resource.new_patch(&current, &desired);
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.changes()[0].kind, ChangeKind::Update);

        resource.apply_update(&spec, &patch).await.unwrap();
        let snapshot = cloud.snapshot().await;
        let body = &snapshot.stacks[STACK].template_body;
        assert!(body.contains("\"DesiredCapacity\":\"5\""));
    }

    #[tokio::test]
    async fn test_in_progress_stack_is_not_updated() {
        let cloud = Arc::new(MemoryCloud::new("123456789012").with_pending_stacks());
        let resource = setup(cloud.clone());
        let mut spec = cluster();
        resource.reconcile(&spec).await.unwrap();

        spec.workers.count = 5;
        let summary = resource.reconcile(&spec).await.unwrap();
        assert!(!summary.has_changes());

        cloud
            .set_stack_status(STACK, StackStatus::CreateComplete)
            .await
            .unwrap();
        let summary = resource.reconcile(&spec).await.unwrap();
        assert_eq!(summary.update, 1);
    }

    #[tokio::test]
    async fn test_create_tolerates_existing_stack() {
        let cloud = Arc::new(MemoryCloud::new("123456789012"));
        let resource = setup(cloud.clone());
        cloud
            .fail_next("create_stack", AwsError::AlreadyExists(STACK.to_string()))
            .await;

        resource.reconcile(&cluster()).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_and_tolerate_missing_stack() {
        let cloud = Arc::new(MemoryCloud::new("123456789012"));
        let resource = setup(cloud.clone());
        let mut spec = cluster();
        resource.reconcile(&spec).await.unwrap();

        spec.deleting = true;
        cloud
            .fail_next("delete_stack", AwsError::NotFound(STACK.to_string()))
            .await;
        let summary = resource.reconcile(&spec).await.unwrap();
        assert_eq!(summary.delete, 1);

        resource.reconcile(&spec).await.unwrap();
        assert!(cloud.snapshot().await.stacks.is_empty());
    }

    #[tokio::test]
    async fn test_parameter_and_tag_drift_updates_stack() {
        let cloud = Arc::new(MemoryCloud::new("123456789012"));
        let resource = setup(cloud.clone());
        let spec = cluster();
        resource.reconcile(&spec).await.unwrap();

        let mut drifted = cloud.snapshot().await;
        let stack = drifted.stacks.get_mut(STACK).unwrap();
        stack
            .parameters
            .insert("Extra".to_string(), "value".to_string());
        stack.tags.insert("team".to_string(), "infra".to_string());
        let cloud = Arc::new(MemoryCloud::from_snapshot("123456789012", drifted));
        let resource = setup(cloud.clone());

        let summary = resource.reconcile(&spec).await.unwrap();
        assert_eq!(summary.update, 1);

        let snapshot = cloud.snapshot().await;
        let stack = &snapshot.stacks[STACK];
        assert!(!stack.parameters.contains_key("Extra"));
        assert!(!stack.tags.contains_key("team"));
        assert!(!resource.reconcile(&spec).await.unwrap().has_changes());
    }

    #[tokio::test]
    async fn test_foreign_stack_survives_teardown() {
        let cloud = Arc::new(MemoryCloud::new("123456789012"));
        let resource = setup(cloud.clone());
        let mut spec = cluster();
        let input = CreateStackInput {
            name: STACK.to_string(),
            template_body: "{}".to_string(),
            parameters: Parameters::new(),
            tags: Tags::new(),
            capabilities: Vec::new(),
            disable_rollback: false,
            timeout_minutes: None,
        };
        cloud.create_stack(&input).await.unwrap();

        spec.deleting = true;
        let summary = resource.reconcile(&spec).await.unwrap();
        assert!(!summary.has_changes());
        assert!(cloud.calls_of("delete_stack").await.is_empty());
        assert!(cloud.snapshot().await.stacks.contains_key(STACK));
    }

    #[tokio::test]
    async fn test_failed_update_names_the_stack() {
        let cloud = Arc::new(MemoryCloud::new("123456789012"));
        let resource = setup(cloud.clone());
        let mut spec = cluster();
        resource.reconcile(&spec).await.unwrap();

        spec.workers.count = 5;
        cloud
            .fail_next("update_stack", AwsError::Api("ValidationError".into()))
            .await;
        let err = resource.reconcile(&spec).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(err.to_string().contains(STACK), "{err}");
    }

    #[tokio::test]
    async fn test_multiple_stacks_are_a_contract_violation() {
        let cloud = Arc::new(MemoryCloud::new("123456789012"));
        let resource = setup(cloud);
        let stack = |name: &str| StackState {
            name: name.to_string(),
            template_body: "{}".to_string(),
            parameters: Parameters::new(),
            tags: Tags::new(),
            status: None,
        };
        let patch = Patch::with_creates(vec![stack("a"), stack("b")]);

        let err = resource.apply_create(&cluster(), &patch).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Contract);
    }

    #[tokio::test]
    async fn test_template_is_deterministic() {
        let cloud = Arc::new(MemoryCloud::new("123456789012"));
        let resource = setup(cloud);
        let spec = cluster();

        let first = resource.desired_state(&spec, &[]).await.unwrap();
        let second = resource.desired_state(&spec, &[]).await.unwrap();
        assert_eq!(first, second);
    }
}
