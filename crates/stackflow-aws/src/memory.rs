//! In-memory cloud
//!
//! Implements every client trait against an in-process snapshot. Used for
//! offline planning from the CLI and as the test double of the reconcilers:
//! every call is recorded, and failures can be injected per operation.

use crate::client::{
    BucketAcl, BucketLogging, CloudFormationClient, CreateStackInput, ElbClient, IamClient,
    MAX_DESCRIBE_TAGS, Parameters, RoleDescription, S3Client, StackDescription, StackStatus,
    Tags, UpdateStackInput,
};
use crate::error::{AwsError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tokio::sync::Mutex;

/// Serializable content of a [`MemoryCloud`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub buckets: BTreeMap<String, MemoryBucket>,
    #[serde(default)]
    pub stacks: BTreeMap<String, MemoryStack>,
    #[serde(default)]
    pub load_balancers: BTreeMap<String, Tags>,
    #[serde(default)]
    pub roles: BTreeMap<String, MemoryRole>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryBucket {
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub acl: Option<BucketAcl>,
    #[serde(default)]
    pub logging: Option<BucketLogging>,
    #[serde(default)]
    pub lifecycle_days: Option<u32>,
    #[serde(default)]
    pub objects: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStack {
    pub template_body: String,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub tags: Tags,
    pub status: StackStatus,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryRole {
    pub assume_role_policy: String,
    #[serde(default)]
    pub policies: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Tags,
}

/// One recorded client call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Call {
    pub operation: &'static str,
    pub target: String,
}

impl std::fmt::Display for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.operation, self.target)
    }
}

#[derive(Default)]
struct Inner {
    state: Snapshot,
    calls: Vec<Call>,
    failures: HashMap<&'static str, VecDeque<AwsError>>,
}

impl Inner {
    /// Record the call and return an injected failure, if any
    fn record(&mut self, operation: &'static str, target: &str) -> Result<()> {
        self.calls.push(Call {
            operation,
            target: target.to_string(),
        });
        match self.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn bucket(&mut self, name: &str) -> Result<&mut MemoryBucket> {
        self.state
            .buckets
            .get_mut(name)
            .ok_or_else(|| AwsError::NotFound(format!("bucket {name}")))
    }

    fn stack(&mut self, name: &str) -> Result<&mut MemoryStack> {
        self.state
            .stacks
            .get_mut(name)
            .ok_or_else(|| AwsError::NotFound(format!("stack {name}")))
    }

    fn role(&mut self, name: &str) -> Result<&mut MemoryRole> {
        self.state
            .roles
            .get_mut(name)
            .ok_or_else(|| AwsError::NotFound(format!("role {name}")))
    }
}

/// In-memory implementation of all cloud clients
pub struct MemoryCloud {
    account_id: String,
    settle_stacks: bool,
    inner: Mutex<Inner>,
}

impl MemoryCloud {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self::from_snapshot(account_id, Snapshot::default())
    }

    pub fn from_snapshot(account_id: impl Into<String>, snapshot: Snapshot) -> Self {
        Self {
            account_id: account_id.into(),
            settle_stacks: true,
            inner: Mutex::new(Inner {
                state: snapshot,
                ..Default::default()
            }),
        }
    }

    /// Leave stack operations in their `*_IN_PROGRESS` status
    pub fn with_pending_stacks(mut self) -> Self {
        self.settle_stacks = false;
        self
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.lock().await.state.clone()
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.inner.lock().await.calls.clone()
    }

    /// Targets of the recorded calls of one operation, in call order
    pub async fn calls_of(&self, operation: &str) -> Vec<String> {
        self.inner
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .map(|c| c.target.clone())
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.inner.lock().await.calls.clear();
    }

    /// Make the next call of `operation` fail with `error`
    pub async fn fail_next(&self, operation: &'static str, error: AwsError) {
        self.inner
            .lock()
            .await
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    pub async fn insert_bucket(&self, name: &str, bucket: MemoryBucket) {
        self.inner
            .lock()
            .await
            .state
            .buckets
            .insert(name.to_string(), bucket);
    }

    pub async fn insert_load_balancer(&self, name: &str, tags: Tags) {
        self.inner
            .lock()
            .await
            .state
            .load_balancers
            .insert(name.to_string(), tags);
    }

    pub async fn set_stack_status(&self, name: &str, status: StackStatus) -> Result<()> {
        self.inner.lock().await.stack(name)?.status = status;
        Ok(())
    }

    fn settled(&self, pending: StackStatus, done: StackStatus) -> StackStatus {
        if self.settle_stacks { done } else { pending }
    }
}

#[async_trait]
impl S3Client for MemoryCloud {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().await;
        inner.record("list_buckets", "*")?;
        Ok(inner.state.buckets.keys().cloned().collect())
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("create_bucket", bucket)?;
        if inner.state.buckets.contains_key(bucket) {
            return Err(AwsError::AlreadyOwnedByYou(bucket.to_string()));
        }
        inner
            .state
            .buckets
            .insert(bucket.to_string(), MemoryBucket::default());
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("delete_bucket", bucket)?;
        if !inner.bucket(bucket)?.objects.is_empty() {
            return Err(AwsError::Api(format!(
                "BucketNotEmpty: bucket {bucket} is not empty"
            )));
        }
        inner.state.buckets.remove(bucket);
        Ok(())
    }

    async fn get_bucket_tagging(&self, bucket: &str) -> Result<Tags> {
        let mut inner = self.inner.lock().await;
        inner.record("get_bucket_tagging", bucket)?;
        Ok(inner.bucket(bucket)?.tags.clone())
    }

    async fn put_bucket_tagging(&self, bucket: &str, tags: &Tags) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("put_bucket_tagging", bucket)?;
        inner.bucket(bucket)?.tags = tags.clone();
        Ok(())
    }

    async fn put_bucket_acl(&self, bucket: &str, acl: &BucketAcl) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("put_bucket_acl", bucket)?;
        inner.bucket(bucket)?.acl = Some(acl.clone());
        Ok(())
    }

    async fn get_bucket_logging(&self, bucket: &str) -> Result<Option<BucketLogging>> {
        let mut inner = self.inner.lock().await;
        inner.record("get_bucket_logging", bucket)?;
        Ok(inner.bucket(bucket)?.logging.clone())
    }

    async fn put_bucket_logging(
        &self,
        bucket: &str,
        logging: Option<&BucketLogging>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("put_bucket_logging", bucket)?;
        if let Some(target) = logging {
            if !inner.state.buckets.contains_key(&target.target_bucket) {
                return Err(AwsError::Api(format!(
                    "InvalidTargetBucketForLogging: {} does not exist",
                    target.target_bucket
                )));
            }
        }
        inner.bucket(bucket)?.logging = logging.cloned();
        Ok(())
    }

    async fn get_bucket_lifecycle(&self, bucket: &str) -> Result<Option<u32>> {
        let mut inner = self.inner.lock().await;
        inner.record("get_bucket_lifecycle", bucket)?;
        Ok(inner.bucket(bucket)?.lifecycle_days)
    }

    async fn put_bucket_lifecycle(&self, bucket: &str, expiration_days: u32) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("put_bucket_lifecycle", bucket)?;
        inner.bucket(bucket)?.lifecycle_days = Some(expiration_days);
        Ok(())
    }

    async fn delete_bucket_lifecycle(&self, bucket: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("delete_bucket_lifecycle", bucket)?;
        inner.bucket(bucket)?.lifecycle_days = None;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().await;
        inner.record("list_objects", bucket)?;
        Ok(inner.bucket(bucket)?.objects.iter().cloned().collect())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("delete_objects", bucket)?;
        let objects = &mut inner.bucket(bucket)?.objects;
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }
}

#[async_trait]
impl CloudFormationClient for MemoryCloud {
    async fn create_stack(&self, input: &CreateStackInput) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("create_stack", &input.name)?;
        if inner.state.stacks.contains_key(&input.name) {
            return Err(AwsError::AlreadyExists(format!("stack {}", input.name)));
        }
        let status = self.settled(StackStatus::CreateInProgress, StackStatus::CreateComplete);
        inner.state.stacks.insert(
            input.name.clone(),
            MemoryStack {
                template_body: input.template_body.clone(),
                parameters: input.parameters.clone(),
                tags: input.tags.clone(),
                status,
                last_updated: Some(Utc::now()),
            },
        );
        Ok(())
    }

    async fn update_stack(&self, input: &UpdateStackInput) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("update_stack", &input.name)?;
        let status = self.settled(StackStatus::UpdateInProgress, StackStatus::UpdateComplete);
        let stack = inner.stack(&input.name)?;

        if stack.status.is_in_progress() {
            return Err(AwsError::Api(format!(
                "stack {} is in {} state and can not be updated",
                input.name, stack.status
            )));
        }
        if stack.template_body == input.template_body
            && stack.parameters == input.parameters
            && stack.tags == input.tags
        {
            return Err(AwsError::NoUpdates(input.name.clone()));
        }

        stack.template_body = input.template_body.clone();
        stack.parameters = input.parameters.clone();
        stack.tags = input.tags.clone();
        stack.status = status;
        stack.last_updated = Some(Utc::now());
        Ok(())
    }

    async fn delete_stack(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("delete_stack", name)?;
        // Deleting an unknown stack succeeds on the provider side too.
        if !inner.state.stacks.contains_key(name) {
            return Ok(());
        }
        if self.settle_stacks {
            inner.state.stacks.remove(name);
        } else {
            inner.stack(name)?.status = StackStatus::DeleteInProgress;
        }
        Ok(())
    }

    async fn describe_stack(&self, name: &str) -> Result<StackDescription> {
        let mut inner = self.inner.lock().await;
        inner.record("describe_stack", name)?;
        let stack = inner.stack(name)?;
        Ok(StackDescription {
            name: name.to_string(),
            status: stack.status,
            parameters: stack.parameters.clone(),
            tags: stack.tags.clone(),
            last_updated: stack.last_updated,
        })
    }

    async fn get_template(&self, name: &str) -> Result<String> {
        let mut inner = self.inner.lock().await;
        inner.record("get_template", name)?;
        Ok(inner.stack(name)?.template_body.clone())
    }
}

#[async_trait]
impl ElbClient for MemoryCloud {
    async fn describe_load_balancers(&self) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().await;
        inner.record("describe_load_balancers", "*")?;
        Ok(inner.state.load_balancers.keys().cloned().collect())
    }

    async fn describe_tags(&self, names: &[String]) -> Result<BTreeMap<String, Tags>> {
        let mut inner = self.inner.lock().await;
        inner.record("describe_tags", &names.join(","))?;
        if names.len() > MAX_DESCRIBE_TAGS {
            return Err(AwsError::Api(format!(
                "ValidationError: at most {MAX_DESCRIBE_TAGS} load balancer names per request"
            )));
        }

        let mut tags = BTreeMap::new();
        for name in names {
            let lb_tags = inner
                .state
                .load_balancers
                .get(name)
                .ok_or_else(|| AwsError::NotFound(format!("load balancer {name}")))?;
            tags.insert(name.clone(), lb_tags.clone());
        }
        Ok(tags)
    }

    async fn delete_load_balancer(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("delete_load_balancer", name)?;
        inner
            .state
            .load_balancers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AwsError::NotFound(format!("load balancer {name}")))
    }
}

#[async_trait]
impl IamClient for MemoryCloud {
    async fn create_role(&self, name: &str, assume_role_policy: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("create_role", name)?;
        if inner.state.roles.contains_key(name) {
            return Err(AwsError::AlreadyExists(format!("role {name}")));
        }
        inner.state.roles.insert(
            name.to_string(),
            MemoryRole {
                assume_role_policy: assume_role_policy.to_string(),
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn get_role(&self, name: &str) -> Result<RoleDescription> {
        let mut inner = self.inner.lock().await;
        inner.record("get_role", name)?;
        let role = inner.role(name)?;
        Ok(RoleDescription {
            name: name.to_string(),
            arn: format!("arn:aws:iam::{}:role/{}", self.account_id, name),
            assume_role_policy: role.assume_role_policy.clone(),
            tags: role.tags.clone(),
        })
    }

    async fn update_assume_role_policy(&self, name: &str, policy: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("update_assume_role_policy", name)?;
        inner.role(name)?.assume_role_policy = policy.to_string();
        Ok(())
    }

    async fn tag_role(&self, name: &str, tags: &Tags) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("tag_role", name)?;
        inner.role(name)?.tags.extend(tags.clone());
        Ok(())
    }

    async fn put_role_policy(&self, role: &str, policy_name: &str, document: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("put_role_policy", role)?;
        inner
            .role(role)?
            .policies
            .insert(policy_name.to_string(), document.to_string());
        Ok(())
    }

    async fn get_role_policy(&self, role: &str, policy_name: &str) -> Result<String> {
        let mut inner = self.inner.lock().await;
        inner.record("get_role_policy", role)?;
        inner
            .role(role)?
            .policies
            .get(policy_name)
            .cloned()
            .ok_or_else(|| AwsError::NotFound(format!("policy {policy_name} of role {role}")))
    }

    async fn delete_role_policy(&self, role: &str, policy_name: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("delete_role_policy", role)?;
        inner
            .role(role)?
            .policies
            .remove(policy_name)
            .map(|_| ())
            .ok_or_else(|| AwsError::NotFound(format!("policy {policy_name} of role {role}")))
    }

    async fn delete_role(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.record("delete_role", name)?;
        if !inner.role(name)?.policies.is_empty() {
            return Err(AwsError::DeleteConflict(format!(
                "role {name} still has inline policies"
            )));
        }
        inner.state.roles.remove(name);
        Ok(())
    }
}
