//! S3 bucket reconciler
//!
//! Manages the cluster bucket and, when the chain enables it, the
//! delivery-log bucket that receives the cluster bucket's access logs.
//!
//! Create runs four idempotent steps per bucket: create, tag, grant the log
//! delivery ACL (log bucket only), enable access logging. A bucket that
//! already exists still gets the remaining steps.

use crate::client::{BucketAcl, BucketLogging, S3Client, Tags};
use crate::error::AwsError;
use crate::key;
use crate::spec::ClusterSpec;
use async_trait::async_trait;
use stackflow_cloud::{Patch, ReconcileError, Resource, ResourceItem, Result, diff};
use stackflow_config::OperatorConfig;
use std::sync::Arc;

/// Objects removed per delete request
const DELETE_OBJECTS_BATCH: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct BucketState {
    pub name: String,
    /// Target of the other buckets' access logs
    pub is_delivery_log: bool,
    pub logging_enabled: bool,
    /// Expiration of the lifecycle rule, in days
    pub lifecycle_days: Option<u32>,
}

impl ResourceItem for BucketState {
    fn key(&self) -> &str {
        &self.name
    }
}

pub struct BucketResource {
    s3: Arc<dyn S3Client>,
    config: Arc<OperatorConfig>,
    delivery_log: bool,
}

impl BucketResource {
    pub fn new(s3: Arc<dyn S3Client>, config: Arc<OperatorConfig>) -> Self {
        Self {
            s3,
            config,
            delivery_log: false,
        }
    }

    /// Also manage the delivery-log bucket and log the cluster bucket into it
    pub fn with_delivery_log(mut self) -> Self {
        self.delivery_log = true;
        self
    }

    fn tags(&self, spec: &ClusterSpec, bucket: &BucketState) -> Tags {
        let mut tags = key::cluster_tags(spec, &self.config);
        if bucket.is_delivery_log {
            tags.insert(key::TAG_DELIVERY_LOG.to_string(), "true".to_string());
        }
        tags
    }

    fn logging(spec: &ClusterSpec, bucket: &BucketState) -> BucketLogging {
        BucketLogging {
            target_bucket: key::target_log_bucket_name(spec),
            target_prefix: bucket.name.clone(),
        }
    }

    fn log_delivery_acl() -> BucketAcl {
        BucketAcl {
            grant_read_acp: key::LOG_DELIVERY_URI.to_string(),
            grant_write: key::LOG_DELIVERY_URI.to_string(),
        }
    }

    /// Observed state of an owned bucket; `None` when absent or foreign
    async fn observe(&self, spec: &ClusterSpec, name: &str) -> Result<Option<BucketState>> {
        let tags = match self.s3.get_bucket_tagging(name).await {
            Ok(tags) => tags,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !key::is_owned(&tags, spec) {
            tracing::debug!(bucket = %name, "bucket is not owned by this cluster, ignoring");
            return Ok(None);
        }

        let logging = self.s3.get_bucket_logging(name).await?;
        let lifecycle_days = self.s3.get_bucket_lifecycle(name).await?;

        Ok(Some(BucketState {
            name: name.to_string(),
            is_delivery_log: tags.contains_key(key::TAG_DELIVERY_LOG),
            logging_enabled: logging.is_some(),
            lifecycle_days,
        }))
    }

    /// Tagging, ACL, lifecycle and logging; each is a full replace
    async fn configure(&self, spec: &ClusterSpec, bucket: &BucketState) -> Result<()> {
        self.s3
            .put_bucket_tagging(&bucket.name, &self.tags(spec, bucket))
            .await?;

        if bucket.is_delivery_log {
            let target = key::target_log_bucket_name(spec);
            self.s3
                .put_bucket_acl(&target, &Self::log_delivery_acl())
                .await?;
        }

        match bucket.lifecycle_days {
            Some(days) => self.s3.put_bucket_lifecycle(&bucket.name, days).await?,
            None => match self.s3.delete_bucket_lifecycle(&bucket.name).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            },
        }

        if bucket.logging_enabled {
            self.s3
                .put_bucket_logging(&bucket.name, Some(&Self::logging(spec, bucket)))
                .await?;
        } else {
            self.s3.put_bucket_logging(&bucket.name, None).await?;
        }
        Ok(())
    }

    async fn create(&self, spec: &ClusterSpec, bucket: &BucketState) -> Result<()> {
        match self.s3.create_bucket(&bucket.name).await {
            Ok(()) => tracing::info!(bucket = %bucket.name, "created bucket"),
            Err(e) if e.is_already_exists() => {
                tracing::info!(bucket = %bucket.name, "bucket already exists")
            }
            Err(e) => return Err(e.into()),
        }
        self.configure(spec, bucket).await
    }

    async fn empty_and_delete(&self, name: &str) -> std::result::Result<(), AwsError> {
        let objects = self.s3.list_objects(name).await?;
        for batch in objects.chunks(DELETE_OBJECTS_BATCH) {
            self.s3.delete_objects(name, batch).await?;
        }
        self.s3.delete_bucket(name).await
    }
}

#[async_trait]
impl Resource<ClusterSpec> for BucketResource {
    type State = BucketState;

    fn name(&self) -> &str {
        "s3bucket"
    }

    async fn current_state(&self, spec: &ClusterSpec) -> Result<Vec<BucketState>> {
        let existing = self.s3.list_buckets().await?;

        let mut current = Vec::new();
        for name in self.candidates(spec) {
            if !existing.contains(&name) {
                continue;
            }
            if let Some(bucket) = self.observe(spec, &name).await? {
                current.push(bucket);
            }
        }
        Ok(current)
    }

    async fn desired_state(
        &self,
        spec: &ClusterSpec,
        _current: &[BucketState],
    ) -> Result<Vec<BucketState>> {
        if spec.deleting {
            return Ok(Vec::new());
        }

        let mut desired = Vec::new();
        // The log bucket comes first so it exists before logging targets it.
        if self.delivery_log {
            desired.push(BucketState {
                name: key::target_log_bucket_name(spec),
                is_delivery_log: true,
                logging_enabled: false,
                lifecycle_days: Some(spec.access_logs_expiration(&self.config)),
            });
        }
        desired.push(BucketState {
            name: key::bucket_name(&self.config.guest_aws.account_id, spec),
            is_delivery_log: false,
            logging_enabled: self.delivery_log,
            lifecycle_days: None,
        });
        Ok(desired)
    }

    fn new_delete_patch(
        &self,
        current: &[BucketState],
        desired: &[BucketState],
    ) -> Patch<BucketState> {
        let patch = diff::delete_patch(current, desired);
        if self.config.delete_logging_bucket {
            return patch;
        }
        Patch::with_deletes(
            patch
                .deletes()
                .into_iter()
                .filter(|b| !b.is_delivery_log)
                .cloned()
                .collect(),
        )
    }

    async fn apply_create(&self, spec: &ClusterSpec, patch: &Patch<BucketState>) -> Result<()> {
        for bucket in patch.creates() {
            self.create(spec, bucket)
                .await
                .map_err(|e| e.in_change(&bucket.name))?;
        }
        Ok(())
    }

    async fn apply_update(&self, spec: &ClusterSpec, patch: &Patch<BucketState>) -> Result<()> {
        for bucket in patch.updates() {
            self.configure(spec, bucket)
                .await
                .map_err(|e| e.in_change(&bucket.name))?;
            tracing::info!(bucket = %bucket.name, "updated bucket");
        }
        Ok(())
    }

    async fn apply_delete(&self, _spec: &ClusterSpec, patch: &Patch<BucketState>) -> Result<()> {
        for bucket in patch.deletes() {
            match self.empty_and_delete(&bucket.name).await {
                Ok(()) => tracing::info!(bucket = %bucket.name, "deleted bucket"),
                Err(e) if e.is_not_found() => {
                    tracing::debug!(bucket = %bucket.name, "bucket already gone")
                }
                Err(e) => return Err(ReconcileError::from(e).in_change(&bucket.name)),
            }
        }
        Ok(())
    }
}

impl BucketResource {
    /// Names of the buckets this reconciler may own, whatever the desired state
    fn candidates(&self, spec: &ClusterSpec) -> Vec<String> {
        let mut names = Vec::new();
        if self.delivery_log {
            names.push(key::target_log_bucket_name(spec));
        }
        names.push(key::bucket_name(&self.config.guest_aws.account_id, spec));
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBucket, MemoryCloud};
    use crate::spec::tests::{cluster, operator_config};
    use stackflow_cloud::{ChangeKind, ErrorClass};

    const DATA: &str = "123456789012-stackflow-al9qy";
    const LOGS: &str = "al9qy-stackflow-access-logs";

    fn setup(delivery_log: bool) -> (Arc<MemoryCloud>, BucketResource) {
        let cloud = Arc::new(MemoryCloud::new("123456789012"));
        let mut resource = BucketResource::new(cloud.clone(), Arc::new(operator_config()));
        if delivery_log {
            resource = resource.with_delivery_log();
        }
        (cloud, resource)
    }

    #[tokio::test]
    async fn test_create_log_and_data_buckets() {
        let (cloud, resource) = setup(true);
        let spec = cluster();

        let current = resource.current_state(&spec).await.unwrap();
        assert!(current.is_empty());
        let desired = resource.desired_state(&spec, &current).await.unwrap();
        let patch = resource.new_create_patch(&current, &desired);
        assert_eq!(patch.len(), 2);

        resource.apply_create(&spec, &patch).await.unwrap();

        assert_eq!(cloud.calls_of("create_bucket").await, vec![LOGS, DATA]);
        assert_eq!(cloud.calls_of("put_bucket_tagging").await, vec![LOGS, DATA]);
        assert_eq!(cloud.calls_of("put_bucket_acl").await, vec![LOGS]);

        let snapshot = cloud.snapshot().await;
        assert_eq!(
            snapshot.buckets[DATA].logging,
            Some(BucketLogging {
                target_bucket: LOGS.to_string(),
                target_prefix: DATA.to_string(),
            })
        );
        assert_eq!(snapshot.buckets[LOGS].logging, None);
        assert_eq!(snapshot.buckets[LOGS].lifecycle_days, Some(365));
        assert_eq!(snapshot.buckets[LOGS].tags[key::TAG_DELIVERY_LOG], "true");
    }

    #[tokio::test]
    async fn test_converged_buckets_produce_empty_patches() {
        let (_cloud, resource) = setup(true);
        let spec = cluster();
        resource.reconcile(&spec).await.unwrap();

        let current = resource.current_state(&spec).await.unwrap();
        let desired = resource.desired_state(&spec, &current).await.unwrap();
        assert_eq!(current, desired);
        assert!(resource.new_create_patch(&current, &desired).is_empty());
        assert!(resource.new_update_patch(&current, &desired).is_empty());
        assert!(resource.new_delete_patch(&current, &desired).is_empty());
    }

    #[tokio::test]
    async fn test_already_existing_bucket_is_still_configured() {
        let (cloud, resource) = setup(true);
        let spec = cluster();
        cloud
            .fail_next("create_bucket", AwsError::AlreadyExists(LOGS.to_string()))
            .await;
        cloud.insert_bucket(LOGS, MemoryBucket::default()).await;

        let summary = resource.reconcile(&spec).await.unwrap();
        assert_eq!(summary.create, 2);

        // Later buckets in the same patch are still processed.
        assert_eq!(cloud.calls_of("create_bucket").await, vec![LOGS, DATA]);
        assert_eq!(cloud.calls_of("put_bucket_acl").await, vec![LOGS]);
        assert_eq!(
            cloud.calls_of("put_bucket_logging").await,
            vec![LOGS, DATA]
        );
        let snapshot = cloud.snapshot().await;
        assert!(key::is_owned(&snapshot.buckets[LOGS].tags, &spec));
    }

    #[tokio::test]
    async fn test_same_create_patch_applies_twice() {
        let (cloud, resource) = setup(true);
        let spec = cluster();

        let desired = resource.desired_state(&spec, &[]).await.unwrap();
        let patch = resource.new_create_patch(&[], &desired);
        assert_eq!(patch, resource.new_create_patch(&[], &desired));

        resource.apply_create(&spec, &patch).await.unwrap();
        let first = cloud.snapshot().await;
        resource.apply_create(&spec, &patch).await.unwrap();

        assert_eq!(cloud.snapshot().await, first);
        assert_eq!(
            cloud.calls_of("create_bucket").await,
            vec![LOGS, DATA, LOGS, DATA]
        );
    }

    #[tokio::test]
    async fn test_failed_step_names_the_bucket() {
        let (cloud, resource) = setup(true);
        cloud
            .fail_next(
                "put_bucket_tagging",
                AwsError::Throttled("Rate exceeded".into()),
            )
            .await;

        let err = resource.reconcile(&cluster()).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
        assert_eq!(
            err.to_string(),
            format!("s3bucket (create): {LOGS}: Provider error: Request throttled: Rate exceeded")
        );
    }

    #[tokio::test]
    async fn test_drifted_logging_is_updated() {
        let (cloud, resource) = setup(true);
        let spec = cluster();
        resource.reconcile(&spec).await.unwrap();
        cloud.put_bucket_logging(DATA, None).await.unwrap();

        let current = resource.current_state(&spec).await.unwrap();
        let desired = resource.desired_state(&spec, &current).await.unwrap();
        let patch = resource.new_patch(&current, &desired);
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.changes()[0].kind, ChangeKind::Update);
        assert_eq!(patch.changes()[0].key(), DATA);

        resource.apply_update(&spec, &patch).await.unwrap();
        assert!(cloud.snapshot().await.buckets[DATA].logging.is_some());
    }

    #[tokio::test]
    async fn test_delete_keeps_log_bucket_by_default() {
        let (cloud, resource) = setup(true);
        let mut spec = cluster();
        resource.reconcile(&spec).await.unwrap();
        cloud
            .insert_bucket(
                DATA,
                MemoryBucket {
                    tags: key::cluster_tags(&spec, &operator_config()),
                    objects: ["manifests/a".to_string(), "manifests/b".to_string()].into(),
                    ..Default::default()
                },
            )
            .await;

        spec.deleting = true;
        let summary = resource.reconcile(&spec).await.unwrap();
        assert_eq!(summary.delete, 1);

        let snapshot = cloud.snapshot().await;
        assert!(!snapshot.buckets.contains_key(DATA));
        assert!(snapshot.buckets.contains_key(LOGS));
    }

    #[tokio::test]
    async fn test_delete_logging_bucket_when_configured() {
        let cloud = Arc::new(MemoryCloud::new("123456789012"));
        let mut config = operator_config();
        config.delete_logging_bucket = true;
        let resource = BucketResource::new(cloud.clone(), Arc::new(config)).with_delivery_log();

        let mut spec = cluster();
        resource.reconcile(&spec).await.unwrap();
        spec.deleting = true;
        resource.reconcile(&spec).await.unwrap();

        assert!(cloud.snapshot().await.buckets.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_bucket_is_not_current_state() {
        let (cloud, resource) = setup(false);
        let spec = cluster();
        cloud.insert_bucket(DATA, MemoryBucket::default()).await;

        assert!(resource.current_state(&spec).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_without_delivery_log_only_data_bucket() {
        let (cloud, resource) = setup(false);
        let spec = cluster();
        resource.reconcile(&spec).await.unwrap();

        assert_eq!(cloud.calls_of("create_bucket").await, vec![DATA]);
        assert!(cloud.calls_of("put_bucket_acl").await.is_empty());
        assert_eq!(cloud.snapshot().await.buckets[DATA].logging, None);
    }
}
