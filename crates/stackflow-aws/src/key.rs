//! Resource names and ownership tags

use crate::client::Tags;
use crate::spec::ClusterSpec;
use stackflow_config::OperatorConfig;

pub const TAG_CLUSTER: &str = "stackflow.io/cluster";
pub const TAG_INSTALLATION: &str = "stackflow.io/installation";
pub const TAG_DELIVERY_LOG: &str = "stackflow.io/delivery-log";
pub const TAG_KUBERNETES_CLUSTER_PREFIX: &str = "kubernetes.io/cluster/";

/// Grantee of the log delivery ACL
pub const LOG_DELIVERY_URI: &str = "uri=http://acs.amazonaws.com/groups/s3/LogDelivery";

/// Capability needed by stacks that create IAM resources
pub const CAPABILITY_NAMED_IAM: &str = "CAPABILITY_NAMED_IAM";

pub fn bucket_name(account_id: &str, spec: &ClusterSpec) -> String {
    format!("{}-stackflow-{}", account_id, spec.id)
}

pub fn target_log_bucket_name(spec: &ClusterSpec) -> String {
    format!("{}-stackflow-access-logs", spec.id)
}

pub fn stack_name(spec: &ClusterSpec) -> String {
    format!("cluster-{}-guest-main", spec.id)
}

pub fn peer_access_role_name(spec: &ClusterSpec) -> String {
    format!("{}-vpc-peer-access", spec.id)
}

pub fn kubernetes_cluster_tag(spec: &ClusterSpec) -> String {
    format!("{}{}", TAG_KUBERNETES_CLUSTER_PREFIX, spec.id)
}

/// Tags marking a resource as owned by the cluster
pub fn cluster_tags(spec: &ClusterSpec, config: &OperatorConfig) -> Tags {
    let mut tags = Tags::new();
    if config.include_tags {
        tags.extend(spec.labels.clone());
    }
    tags.insert(TAG_CLUSTER.to_string(), spec.id.clone());
    tags.insert(
        TAG_INSTALLATION.to_string(),
        config.installation_name.clone(),
    );
    tags.insert(kubernetes_cluster_tag(spec), "owned".to_string());
    tags
}

/// Whether `tags` mark a resource of this cluster
pub fn is_owned(tags: &Tags, spec: &ClusterSpec) -> bool {
    tags.get(TAG_CLUSTER).is_some_and(|id| *id == spec.id)
}
