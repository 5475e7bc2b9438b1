//! Launch configurations, auto scaling groups and load balancers

use super::{iam, network};
use crate::bootstrap::{BootstrapContext, NodeRole};
use crate::composer::{Adapter, AdapterContext};
use crate::template::{Fragment, reference};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use stackflow_cloud::Result;

pub const API_LOAD_BALANCER: &str = "ApiLoadBalancer";
pub const INGRESS_LOAD_BALANCER: &str = "IngressLoadBalancer";

pub fn launch_configuration(role: NodeRole) -> &'static str {
    match role {
        NodeRole::Master => "MasterLaunchConfiguration",
        NodeRole::Worker => "WorkerLaunchConfiguration",
    }
}

pub fn autoscaling_group(role: NodeRole) -> &'static str {
    match role {
        NodeRole::Master => "MasterAutoScalingGroup",
        NodeRole::Worker => "WorkerAutoScalingGroup",
    }
}

fn security_group(role: NodeRole) -> &'static str {
    match role {
        NodeRole::Master => network::MASTER_SECURITY_GROUP,
        NodeRole::Worker => network::WORKER_SECURITY_GROUP,
    }
}

fn load_balancer(role: NodeRole) -> &'static str {
    match role {
        NodeRole::Master => API_LOAD_BALANCER,
        NodeRole::Worker => INGRESS_LOAD_BALANCER,
    }
}

#[derive(Debug, Default)]
pub struct ComputeAdapter;

impl ComputeAdapter {
    fn listener(port: u16) -> Value {
        json!({
            "LoadBalancerPort": port.to_string(),
            "InstancePort": port.to_string(),
            "Protocol": "TCP",
        })
    }
}

impl Adapter for ComputeAdapter {
    fn name(&self) -> &str {
        "compute"
    }

    fn fragment(&self, ctx: &AdapterContext<'_>) -> Result<Fragment> {
        let spec = ctx.spec;
        let zones = spec.aws.availability_zones.len();
        let monitoring = spec.monitoring_enabled(ctx.config);

        let mut fragment = Fragment::new()
            .resource(
                API_LOAD_BALANCER,
                json!({
                    "Type": "AWS::ElasticLoadBalancing::LoadBalancer",
                    "Properties": {
                        "LoadBalancerName": format!("{}-api", spec.id),
                        "Scheme": "internet-facing",
                        "Subnets": network::public_subnets(zones),
                        "SecurityGroups": [reference(network::MASTER_SECURITY_GROUP)],
                        "Listeners": [Self::listener(443)],
                    }
                }),
            )
            .resource(
                INGRESS_LOAD_BALANCER,
                json!({
                    "Type": "AWS::ElasticLoadBalancing::LoadBalancer",
                    "Properties": {
                        "LoadBalancerName": format!("{}-ingress", spec.id),
                        "Scheme": "internet-facing",
                        "Subnets": network::public_subnets(zones),
                        "SecurityGroups": [reference(network::INGRESS_SECURITY_GROUP)],
                        "Listeners": [Self::listener(80), Self::listener(443)],
                    }
                }),
            );

        for role in [NodeRole::Master, NodeRole::Worker] {
            let node = BootstrapContext {
                spec,
                config: ctx.config,
                role,
            };
            let bootstrap = ctx.bootstrap.render(&node)?;
            let group = node.group();

            fragment = fragment
                .resource(
                    launch_configuration(role),
                    json!({
                        "Type": "AWS::AutoScaling::LaunchConfiguration",
                        "Properties": {
                            "ImageId": spec.aws.image_id,
                            "InstanceType": group.instance_type,
                            "IamInstanceProfile": reference(iam::instance_profile(role)),
                            "SecurityGroups": [reference(security_group(role))],
                            "InstanceMonitoring": monitoring,
                            "BlockDeviceMappings": [{
                                "DeviceName": "/dev/xvda",
                                "Ebs": { "VolumeSize": group.volume_size_gb, "VolumeType": "gp2" },
                            }],
                            "UserData": STANDARD.encode(bootstrap),
                        }
                    }),
                )
                .resource(
                    autoscaling_group(role),
                    json!({
                        "Type": "AWS::AutoScaling::AutoScalingGroup",
                        "Properties": {
                            "LaunchConfigurationName": reference(launch_configuration(role)),
                            "MinSize": group.count.to_string(),
                            "MaxSize": group.count.to_string(),
                            "DesiredCapacity": group.count.to_string(),
                            "VPCZoneIdentifier": network::private_subnets(zones),
                            "LoadBalancerNames": [reference(load_balancer(role))],
                        }
                    }),
                );
        }

        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::CloudConfigRenderer;
    use crate::spec::tests::{cluster, operator_config};

    #[test]
    fn test_user_data_is_encoded_bootstrap() {
        let spec = cluster();
        let config = operator_config();
        let ctx = AdapterContext {
            spec: &spec,
            config: &config,
            bootstrap: &CloudConfigRenderer,
        };
        let fragment = ComputeAdapter.fragment(&ctx).unwrap();

        let user_data = fragment.resources["WorkerLaunchConfiguration"]["Properties"]["UserData"]
            .as_str()
            .unwrap();
        let decoded = String::from_utf8(STANDARD.decode(user_data).unwrap()).unwrap();
        assert!(decoded.starts_with("#cloud-config"));
        assert!(decoded.contains("role=worker"));

        let workers = &fragment.resources["WorkerAutoScalingGroup"]["Properties"];
        assert_eq!(workers["DesiredCapacity"], "3");
        assert_eq!(
            workers["VPCZoneIdentifier"],
            json!([{ "Ref": "PrivateSubnet0" }, { "Ref": "PrivateSubnet1" }])
        );
    }

    #[test]
    fn test_monitoring_toggle() {
        let mut spec = cluster();
        spec.features.monitoring = Some(true);
        let config = operator_config();
        let fragment = ComputeAdapter
            .fragment(&AdapterContext {
                spec: &spec,
                config: &config,
                bootstrap: &CloudConfigRenderer,
            })
            .unwrap();

        assert_eq!(
            fragment.resources["MasterLaunchConfiguration"]["Properties"]["InstanceMonitoring"],
            true
        );
    }
}
