//! Peer access role in the host account
//!
//! The guest stack's peering connection assumes this role to accept the
//! peering on the host side.

use crate::client::IamClient;
use crate::error::AwsError;
use crate::key;
use crate::spec::ClusterSpec;
use async_trait::async_trait;
use serde_json::{Value, json};
use stackflow_cloud::{Patch, ReconcileError, Resource, ResourceItem, Result};
use stackflow_config::OperatorConfig;
use std::sync::Arc;

pub const POLICY_NAME: &str = "vpc-peer-access";

#[derive(Debug, Clone, PartialEq)]
pub struct RoleState {
    pub name: String,
    /// Trust policy, canonical JSON
    pub assume_role_policy: String,
    /// Inline policy, canonical JSON; empty when missing
    pub policy: String,
}

impl ResourceItem for RoleState {
    fn key(&self) -> &str {
        &self.name
    }
}

/// Parse and re-serialize a policy document so formatting does not cause updates
fn canonical(document: &str) -> String {
    match serde_json::from_str::<Value>(document) {
        Ok(value) => value.to_string(),
        Err(_) => document.to_string(),
    }
}

pub struct RoleResource {
    iam: Arc<dyn IamClient>,
    config: Arc<OperatorConfig>,
}

impl RoleResource {
    /// `iam` must be a client of the host account
    pub fn new(iam: Arc<dyn IamClient>, config: Arc<OperatorConfig>) -> Self {
        Self { iam, config }
    }

    fn trust_policy(&self) -> Value {
        json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": {
                    "AWS": format!("arn:aws:iam::{}:root", self.config.guest_aws.account_id)
                },
                "Action": "sts:AssumeRole",
            }]
        })
    }

    fn peering_policy() -> Value {
        json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Action": [
                    "ec2:AcceptVpcPeeringConnection",
                    "ec2:DescribeVpcPeeringConnections",
                    "ec2:DescribeRouteTables",
                    "ec2:CreateRoute",
                    "ec2:DeleteRoute",
                ],
                "Resource": "*",
            }]
        })
    }

    async fn put_policies(&self, role: &RoleState) -> Result<()> {
        self.iam
            .update_assume_role_policy(&role.name, &role.assume_role_policy)
            .await?;
        self.iam
            .put_role_policy(&role.name, POLICY_NAME, &role.policy)
            .await?;
        Ok(())
    }

    /// Tags go on right after creation so a half-created role is still owned
    async fn create(&self, spec: &ClusterSpec, role: &RoleState) -> Result<()> {
        match self.iam.create_role(&role.name, &role.assume_role_policy).await {
            Ok(()) => tracing::info!(role = %role.name, "created role"),
            Err(e) if e.is_already_exists() => {
                tracing::info!(role = %role.name, "role already exists")
            }
            Err(e) => return Err(e.into()),
        }
        self.iam
            .tag_role(&role.name, &key::cluster_tags(spec, &self.config))
            .await?;
        self.put_policies(role).await
    }

    async fn delete(&self, name: &str) -> std::result::Result<(), AwsError> {
        match self.iam.delete_role_policy(name, POLICY_NAME).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        self.iam.delete_role(name).await
    }
}

#[async_trait]
impl Resource<ClusterSpec> for RoleResource {
    type State = RoleState;

    fn name(&self) -> &str {
        "iamrole"
    }

    async fn current_state(&self, spec: &ClusterSpec) -> Result<Vec<RoleState>> {
        let name = key::peer_access_role_name(spec);

        let role = match self.iam.get_role(&name).await {
            Ok(role) => role,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if !key::is_owned(&role.tags, spec) {
            tracing::debug!(role = %name, "role is not owned by this cluster, ignoring");
            return Ok(Vec::new());
        }

        let policy = match self.iam.get_role_policy(&name, POLICY_NAME).await {
            Ok(document) => canonical(&document),
            Err(e) if e.is_not_found() => String::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(vec![RoleState {
            name,
            assume_role_policy: canonical(&role.assume_role_policy),
            policy,
        }])
    }

    async fn desired_state(
        &self,
        spec: &ClusterSpec,
        _current: &[RoleState],
    ) -> Result<Vec<RoleState>> {
        if spec.deleting {
            return Ok(Vec::new());
        }
        Ok(vec![RoleState {
            name: key::peer_access_role_name(spec),
            assume_role_policy: self.trust_policy().to_string(),
            policy: Self::peering_policy().to_string(),
        }])
    }

    async fn apply_create(&self, spec: &ClusterSpec, patch: &Patch<RoleState>) -> Result<()> {
        for role in patch.creates() {
            self.create(spec, role)
                .await
                .map_err(|e| e.in_change(&role.name))?;
        }
        Ok(())
    }

    async fn apply_update(&self, _spec: &ClusterSpec, patch: &Patch<RoleState>) -> Result<()> {
        for role in patch.updates() {
            self.put_policies(role)
                .await
                .map_err(|e| e.in_change(&role.name))?;
            tracing::info!(role = %role.name, "updated role policies");
        }
        Ok(())
    }

    async fn apply_delete(&self, _spec: &ClusterSpec, patch: &Patch<RoleState>) -> Result<()> {
        for role in patch.deletes() {
            match self.delete(&role.name).await {
                Ok(()) => tracing::info!(role = %role.name, "deleted role"),
                Err(e) if e.is_not_found() => {
                    tracing::debug!(role = %role.name, "role already gone")
                }
                Err(e) => return Err(ReconcileError::from(e).in_change(&role.name)),
            }
        }
        Ok(())
    }
}
