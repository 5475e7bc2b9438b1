//! Guest node roles and instance profiles

use crate::bootstrap::NodeRole;
use crate::composer::{Adapter, AdapterContext};
use crate::key;
use crate::template::{Fragment, reference};
use serde_json::{Value, json};
use stackflow_cloud::Result;

pub fn role(role: NodeRole) -> &'static str {
    match role {
        NodeRole::Master => "MasterRole",
        NodeRole::Worker => "WorkerRole",
    }
}

pub fn instance_profile(role: NodeRole) -> &'static str {
    match role {
        NodeRole::Master => "MasterInstanceProfile",
        NodeRole::Worker => "WorkerInstanceProfile",
    }
}

#[derive(Debug, Default)]
pub struct GuestIamAdapter;

impl GuestIamAdapter {
    fn actions(node: NodeRole) -> Vec<&'static str> {
        match node {
            NodeRole::Master => vec!["ec2:*", "elasticloadbalancing:*", "autoscaling:Describe*"],
            NodeRole::Worker => vec![
                "ec2:Describe*",
                "ecr:GetAuthorizationToken",
                "ecr:BatchGetImage",
                "ecr:GetDownloadUrlForLayer",
            ],
        }
    }

    fn policy(ctx: &AdapterContext<'_>, node: NodeRole) -> Value {
        let bucket = key::bucket_name(&ctx.config.guest_aws.account_id, ctx.spec);
        json!({
            "Version": "2012-10-17",
            "Statement": [
                { "Effect": "Allow", "Action": Self::actions(node), "Resource": "*" },
                {
                    "Effect": "Allow",
                    "Action": "s3:GetObject",
                    "Resource": format!("arn:aws:s3:::{bucket}/*"),
                },
            ]
        })
    }
}

impl Adapter for GuestIamAdapter {
    fn name(&self) -> &str {
        "guest_iam"
    }

    fn fragment(&self, ctx: &AdapterContext<'_>) -> Result<Fragment> {
        let mut fragment = Fragment::new();

        for node in [NodeRole::Master, NodeRole::Worker] {
            fragment = fragment
                .resource(
                    role(node),
                    json!({
                        "Type": "AWS::IAM::Role",
                        "Properties": {
                            "RoleName": format!("{}-{}-role", ctx.spec.id, node),
                            "AssumeRolePolicyDocument": {
                                "Version": "2012-10-17",
                                "Statement": [{
                                    "Effect": "Allow",
                                    "Principal": { "Service": "ec2.amazonaws.com" },
                                    "Action": "sts:AssumeRole",
                                }]
                            },
                            "Policies": [{
                                "PolicyName": format!("{}-{}-policy", ctx.spec.id, node),
                                "PolicyDocument": Self::policy(ctx, node),
                            }],
                        }
                    }),
                )
                .resource(
                    instance_profile(node),
                    json!({
                        "Type": "AWS::IAM::InstanceProfile",
                        "Properties": { "Roles": [reference(role(node))] }
                    }),
                );
        }

        Ok(fragment)
    }
}
