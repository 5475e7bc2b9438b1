//! Load balancer reconciler
//!
//! Load balancers are created by the stack and by the cluster's service
//! controller. This reconciler only removes the ones left behind once the
//! cluster is torn down.

use crate::client::{ElbClient, MAX_DESCRIBE_TAGS, Tags};
use crate::key;
use crate::spec::ClusterSpec;
use async_trait::async_trait;
use stackflow_cloud::{Patch, ReconcileError, Resource, ResourceItem, Result};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct LoadBalancerState {
    pub name: String,
}

impl ResourceItem for LoadBalancerState {
    fn key(&self) -> &str {
        &self.name
    }
}

pub struct LoadBalancerResource {
    elb: Arc<dyn ElbClient>,
}

impl LoadBalancerResource {
    pub fn new(elb: Arc<dyn ElbClient>) -> Self {
        Self { elb }
    }

    fn is_cluster_load_balancer(tags: &Tags, spec: &ClusterSpec) -> bool {
        key::is_owned(tags, spec) || tags.contains_key(&key::kubernetes_cluster_tag(spec))
    }
}

#[async_trait]
impl Resource<ClusterSpec> for LoadBalancerResource {
    type State = LoadBalancerState;

    fn name(&self) -> &str {
        "loadbalancer"
    }

    async fn current_state(&self, spec: &ClusterSpec) -> Result<Vec<LoadBalancerState>> {
        let names = self.elb.describe_load_balancers().await?;

        let mut current = Vec::new();
        for chunk in names.chunks(MAX_DESCRIBE_TAGS) {
            let tags = self.elb.describe_tags(chunk).await?;
            for name in chunk {
                if tags
                    .get(name)
                    .is_some_and(|t| Self::is_cluster_load_balancer(t, spec))
                {
                    current.push(LoadBalancerState { name: name.clone() });
                }
            }
        }
        Ok(current)
    }

    async fn desired_state(
        &self,
        spec: &ClusterSpec,
        current: &[LoadBalancerState],
    ) -> Result<Vec<LoadBalancerState>> {
        if spec.deleting {
            return Ok(Vec::new());
        }
        Ok(current.to_vec())
    }

    async fn apply_delete(
        &self,
        _spec: &ClusterSpec,
        patch: &Patch<LoadBalancerState>,
    ) -> Result<()> {
        for lb in patch.deletes() {
            match self.elb.delete_load_balancer(&lb.name).await {
                Ok(()) => tracing::info!(load_balancer = %lb.name, "deleted load balancer"),
                Err(e) if e.is_not_found() => {
                    tracing::debug!(load_balancer = %lb.name, "load balancer already gone")
                }
                Err(e) => return Err(ReconcileError::from(e).in_change(&lb.name)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AwsError;
    use crate::memory::MemoryCloud;
    use crate::spec::tests::cluster;
    use stackflow_cloud::ErrorClass;

    fn owned(spec: &ClusterSpec) -> Tags {
        [(key::kubernetes_cluster_tag(spec), "owned".to_string())].into()
    }

    #[tokio::test]
    async fn test_current_state_is_scoped_to_cluster() {
        let cloud = Arc::new(MemoryCloud::new("123456789012"));
        let spec = cluster();
        // More load balancers than fit into one tag request.
        for i in 0..25 {
            let tags = if i % 5 == 0 { owned(&spec) } else { Tags::new() };
            cloud.insert_load_balancer(&format!("lb-{i:02}"), tags).await;
        }

        let resource = LoadBalancerResource::new(cloud.clone());
        let current = resource.current_state(&spec).await.unwrap();
        let names: Vec<_> = current.iter().map(|lb| lb.name.as_str()).collect();
        assert_eq!(names, vec!["lb-00", "lb-05", "lb-10", "lb-15", "lb-20"]);
        assert_eq!(cloud.calls_of("describe_tags").await.len(), 2);
    }

    #[tokio::test]
    async fn test_only_deletes_when_tearing_down() {
        let cloud = Arc::new(MemoryCloud::new("123456789012"));
        let mut spec = cluster();
        cloud.insert_load_balancer("al9qy-api", owned(&spec)).await;
        cloud.insert_load_balancer("other", Tags::new()).await;
        let resource = LoadBalancerResource::new(cloud.clone());

        let summary = resource.reconcile(&spec).await.unwrap();
        assert!(!summary.has_changes());

        spec.deleting = true;
        let summary = resource.reconcile(&spec).await.unwrap();
        assert_eq!(summary.delete, 1);

        let snapshot = cloud.snapshot().await;
        assert_eq!(snapshot.load_balancers.len(), 1);
        assert!(snapshot.load_balancers.contains_key("other"));
    }

    #[tokio::test]
    async fn test_vanished_load_balancer_fails_the_pass() {
        let cloud = Arc::new(MemoryCloud::new("123456789012"));
        let spec = cluster();
        cloud.insert_load_balancer("lb-1", owned(&spec)).await;
        // Gone between listing and describing its tags.
        cloud
            .fail_next("describe_tags", AwsError::NotFound("load balancer lb-1".into()))
            .await;

        let resource = LoadBalancerResource::new(cloud);
        let err = resource.reconcile(&spec).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(!err.is_ignorable());
    }

    #[tokio::test]
    async fn test_failed_delete_names_the_load_balancer() {
        let cloud = Arc::new(MemoryCloud::new("123456789012"));
        let mut spec = cluster();
        cloud.insert_load_balancer("al9qy-api", owned(&spec)).await;
        cloud
            .fail_next("delete_load_balancer", AwsError::Api("InternalFailure".into()))
            .await;

        spec.deleting = true;
        let resource = LoadBalancerResource::new(cloud);
        let err = resource.reconcile(&spec).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "loadbalancer (delete): al9qy-api: Provider error: API error: InternalFailure"
        );
    }
}
