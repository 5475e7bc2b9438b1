//! Cloud client traits
//!
//! Thin request/response seams over the provider API. Implementations
//! classify "already exists" and "not found" into the typed [`AwsError`]
//! variants; retries with backoff belong to the implementation, not to the
//! reconcilers.
//!
//! [`AwsError`]: crate::error::AwsError

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Tag set, sorted by key
pub type Tags = BTreeMap<String, String>;

/// Stack parameter values, sorted by key
pub type Parameters = BTreeMap<String, String>;

/// Maximum number of load balancers per DescribeTags request
pub const MAX_DESCRIBE_TAGS: usize = 20;

/// ACL grants on a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketAcl {
    pub grant_read_acp: String,
    pub grant_write: String,
}

/// Access logging target of a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketLogging {
    pub target_bucket: String,
    pub target_prefix: String,
}

#[async_trait]
pub trait S3Client: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<String>>;

    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    async fn get_bucket_tagging(&self, bucket: &str) -> Result<Tags>;

    /// Replace the full tag set
    async fn put_bucket_tagging(&self, bucket: &str, tags: &Tags) -> Result<()>;

    /// Replace the ACL grants
    async fn put_bucket_acl(&self, bucket: &str, acl: &BucketAcl) -> Result<()>;

    async fn get_bucket_logging(&self, bucket: &str) -> Result<Option<BucketLogging>>;

    /// Replace the logging status; `None` disables access logging
    async fn put_bucket_logging(&self, bucket: &str, logging: Option<&BucketLogging>)
    -> Result<()>;

    /// Expiration in days of the lifecycle rule, if any
    async fn get_bucket_lifecycle(&self, bucket: &str) -> Result<Option<u32>>;

    async fn put_bucket_lifecycle(&self, bucket: &str, expiration_days: u32) -> Result<()>;

    async fn delete_bucket_lifecycle(&self, bucket: &str) -> Result<()>;

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>>;

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()>;
}

/// Provider-side status of a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackStatus {
    CreateInProgress,
    CreateFailed,
    CreateComplete,
    RollbackInProgress,
    RollbackFailed,
    RollbackComplete,
    DeleteInProgress,
    DeleteFailed,
    DeleteComplete,
    UpdateInProgress,
    UpdateCompleteCleanupInProgress,
    UpdateComplete,
    UpdateRollbackInProgress,
    UpdateRollbackFailed,
    UpdateRollbackCompleteCleanupInProgress,
    UpdateRollbackComplete,
}

impl StackStatus {
    /// The provider is still converging the stack
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            StackStatus::CreateInProgress
                | StackStatus::RollbackInProgress
                | StackStatus::DeleteInProgress
                | StackStatus::UpdateInProgress
                | StackStatus::UpdateCompleteCleanupInProgress
                | StackStatus::UpdateRollbackInProgress
                | StackStatus::UpdateRollbackCompleteCleanupInProgress
        )
    }

    pub fn is_deleting(&self) -> bool {
        matches!(self, StackStatus::DeleteInProgress | StackStatus::DeleteComplete)
    }
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = serde_json::to_value(self).map_err(|_| std::fmt::Error)?;
        write!(f, "{}", value.as_str().unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackDescription {
    pub name: String,
    pub status: StackStatus,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateStackInput {
    pub name: String,
    pub template_body: String,
    pub parameters: Parameters,
    pub tags: Tags,
    pub capabilities: Vec<String>,
    /// Keep failed resources for inspection instead of rolling back
    pub disable_rollback: bool,
    pub timeout_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateStackInput {
    pub name: String,
    pub template_body: String,
    pub parameters: Parameters,
    pub tags: Tags,
    pub capabilities: Vec<String>,
}

/// Stack operations return once the request is accepted, not on completion
#[async_trait]
pub trait CloudFormationClient: Send + Sync {
    async fn create_stack(&self, input: &CreateStackInput) -> Result<()>;

    async fn update_stack(&self, input: &UpdateStackInput) -> Result<()>;

    async fn delete_stack(&self, name: &str) -> Result<()>;

    /// Fails with `NotFound` when the stack does not exist
    async fn describe_stack(&self, name: &str) -> Result<StackDescription>;

    async fn get_template(&self, name: &str) -> Result<String>;
}

#[async_trait]
pub trait ElbClient: Send + Sync {
    async fn describe_load_balancers(&self) -> Result<Vec<String>>;

    /// At most [`MAX_DESCRIBE_TAGS`] names per call
    async fn describe_tags(&self, names: &[String]) -> Result<BTreeMap<String, Tags>>;

    async fn delete_load_balancer(&self, name: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDescription {
    pub name: String,
    pub arn: String,
    pub assume_role_policy: String,
    #[serde(default)]
    pub tags: Tags,
}

#[async_trait]
pub trait IamClient: Send + Sync {
    async fn create_role(&self, name: &str, assume_role_policy: &str) -> Result<()>;

    async fn get_role(&self, name: &str) -> Result<RoleDescription>;

    async fn update_assume_role_policy(&self, name: &str, policy: &str) -> Result<()>;

    async fn tag_role(&self, name: &str, tags: &Tags) -> Result<()>;

    async fn put_role_policy(&self, role: &str, policy_name: &str, document: &str) -> Result<()>;

    async fn get_role_policy(&self, role: &str, policy_name: &str) -> Result<String>;

    async fn delete_role_policy(&self, role: &str, policy_name: &str) -> Result<()>;

    async fn delete_role(&self, name: &str) -> Result<()>;
}

/// Clients for one account, injected into reconcilers at chain construction
#[derive(Clone)]
pub struct Clients {
    pub s3: Arc<dyn S3Client>,
    pub cloudformation: Arc<dyn CloudFormationClient>,
    pub elb: Arc<dyn ElbClient>,
    pub iam: Arc<dyn IamClient>,
}

impl Clients {
    /// All clients backed by one implementation
    pub fn from_cloud<C>(cloud: Arc<C>) -> Self
    where
        C: S3Client + CloudFormationClient + ElbClient + IamClient + 'static,
    {
        Self {
            s3: cloud.clone(),
            cloudformation: cloud.clone(),
            elb: cloud.clone(),
            iam: cloud,
        }
    }
}
