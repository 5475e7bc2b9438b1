//! Cross-account wiring to the host account
//!
//! Passes the peer access role and host account as parameters and, when the
//! host VPC is known, declares the peering connection that assumes the role.

use crate::composer::{Adapter, AdapterContext};
use crate::key;
use crate::template::{Fragment, reference, sub};
use serde_json::json;
use stackflow_cloud::Result;

pub const PEER_ACCESS_ROLE_NAME: &str = "PeerAccessRoleName";
pub const HOST_ACCOUNT_ID: &str = "HostAccountId";

#[derive(Debug, Default)]
pub struct HostIamAdapter;

impl Adapter for HostIamAdapter {
    fn name(&self) -> &str {
        "host_iam"
    }

    fn fragment(&self, ctx: &AdapterContext<'_>) -> Result<Fragment> {
        let host = ctx.config.host_account();
        let mut fragment = Fragment::new()
            .parameter(PEER_ACCESS_ROLE_NAME, key::peer_access_role_name(ctx.spec))
            .parameter(HOST_ACCOUNT_ID, host.account_id.clone());

        match &host.vpc_id {
            Some(vpc_id) => {
                fragment = fragment.resource(
                    "VPCPeeringConnection",
                    json!({
                        "Type": "AWS::EC2::VPCPeeringConnection",
                        "Properties": {
                            "VpcId": reference(super::network::VPC),
                            "PeerVpcId": vpc_id,
                            "PeerOwnerId": reference(HOST_ACCOUNT_ID),
                            "PeerRegion": host.region,
                            "PeerRoleArn": sub(
                                "arn:aws:iam::${HostAccountId}:role/${PeerAccessRoleName}"
                            ),
                        }
                    }),
                );
            }
            None => tracing::debug!(
                cluster = %ctx.spec.id,
                "no host VPC configured, skipping peering connection"
            ),
        }

        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::CloudConfigRenderer;
    use crate::spec::tests::{cluster, operator_config};
    use crate::spec::ClusterSpec;
    use stackflow_config::{AwsAccount, OperatorConfig};

    fn host_fragment(spec: &ClusterSpec, config: &OperatorConfig) -> Fragment {
        HostIamAdapter
            .fragment(&AdapterContext {
                spec,
                config,
                bootstrap: &CloudConfigRenderer,
            })
            .unwrap()
    }

    #[test]
    fn test_peering_requires_host_vpc() {
        let spec = cluster();
        let mut config = operator_config();

        let fragment = host_fragment(&spec, &config);
        assert_eq!(fragment.parameters[HOST_ACCOUNT_ID], "123456789012");
        assert_eq!(
            fragment.parameters[PEER_ACCESS_ROLE_NAME],
            "al9qy-vpc-peer-access"
        );
        assert!(fragment.resources.is_empty());

        config.host_aws = Some(AwsAccount {
            region: "eu-west-1".to_string(),
            account_id: "210987654321".to_string(),
            role_arn: None,
            vpc_id: Some("vpc-0abc".to_string()),
        });
        let fragment = host_fragment(&spec, &config);
        assert_eq!(fragment.parameters[HOST_ACCOUNT_ID], "210987654321");
        assert_eq!(
            fragment.resources["VPCPeeringConnection"]["Properties"]["PeerVpcId"],
            "vpc-0abc"
        );
    }
}
