//! VPC, subnets, routing and security groups

use crate::composer::{Adapter, AdapterContext};
use crate::key;
use crate::spec::SUBNET_PREFIX_DELTA;
use crate::template::{Fragment, reference, tag_list};
use serde_json::{Value, json};
use stackflow_cloud::Result;

pub const VPC: &str = "VPC";
pub const INTERNET_GATEWAY: &str = "InternetGateway";
pub const PUBLIC_ROUTE_TABLE: &str = "PublicRouteTable";
pub const MASTER_SECURITY_GROUP: &str = "MasterSecurityGroup";
pub const WORKER_SECURITY_GROUP: &str = "WorkerSecurityGroup";
pub const INGRESS_SECURITY_GROUP: &str = "IngressSecurityGroup";

/// Offset of the first private subnet in the VPC range
const PRIVATE_SUBNET_OFFSET: u32 = 8;

pub fn public_subnet(index: usize) -> String {
    format!("PublicSubnet{index}")
}

pub fn private_subnet(index: usize) -> String {
    format!("PrivateSubnet{index}")
}

pub fn public_subnets(zones: usize) -> Value {
    Value::Array((0..zones).map(|i| reference(&public_subnet(i))).collect())
}

pub fn private_subnets(zones: usize) -> Value {
    Value::Array((0..zones).map(|i| reference(&private_subnet(i))).collect())
}

#[derive(Debug, Default)]
pub struct NetworkAdapter;

/// Ingress rule for one TCP port
fn tcp(port: u16, cidr: &str) -> Value {
    json!({ "IpProtocol": "tcp", "FromPort": port, "ToPort": port, "CidrIp": cidr })
}

impl NetworkAdapter {
    fn api_ingress(ctx: &AdapterContext<'_>) -> Vec<Value> {
        let whitelist = ctx.spec.api_whitelist(ctx.config);
        let sources = if whitelist.enabled {
            whitelist.subnets()
        } else {
            vec!["0.0.0.0/0".to_string()]
        };
        sources
            .into_iter()
            .map(|cidr| tcp(443, &cidr))
            .collect()
    }

    fn security_group(ctx: &AdapterContext<'_>, description: &str, ingress: Vec<Value>) -> Value {
        json!({
            "Type": "AWS::EC2::SecurityGroup",
            "Properties": {
                "GroupDescription": format!("{} {}", ctx.spec.id, description),
                "VpcId": reference(VPC),
                "SecurityGroupIngress": ingress,
            }
        })
    }
}

impl Adapter for NetworkAdapter {
    fn name(&self) -> &str {
        "network"
    }

    fn fragment(&self, ctx: &AdapterContext<'_>) -> Result<Fragment> {
        let spec = ctx.spec;
        let vpc = spec.vpc_network()?;
        let tags = key::cluster_tags(spec, ctx.config);

        let mut fragment = Fragment::new()
            .resource(
                VPC,
                json!({
                    "Type": "AWS::EC2::VPC",
                    "Properties": {
                        "CidrBlock": vpc.to_string(),
                        "EnableDnsSupport": true,
                        "EnableDnsHostnames": true,
                        "Tags": tag_list(&tags),
                    }
                }),
            )
            .resource(
                INTERNET_GATEWAY,
                json!({ "Type": "AWS::EC2::InternetGateway" }),
            )
            .resource(
                "VPCGatewayAttachment",
                json!({
                    "Type": "AWS::EC2::VPCGatewayAttachment",
                    "Properties": {
                        "VpcId": reference(VPC),
                        "InternetGatewayId": reference(INTERNET_GATEWAY),
                    }
                }),
            )
            .resource(
                PUBLIC_ROUTE_TABLE,
                json!({
                    "Type": "AWS::EC2::RouteTable",
                    "Properties": { "VpcId": reference(VPC) }
                }),
            )
            .resource(
                "PublicInternetRoute",
                json!({
                    "Type": "AWS::EC2::Route",
                    "DependsOn": "VPCGatewayAttachment",
                    "Properties": {
                        "RouteTableId": reference(PUBLIC_ROUTE_TABLE),
                        "DestinationCidrBlock": "0.0.0.0/0",
                        "GatewayId": reference(INTERNET_GATEWAY),
                    }
                }),
            )
            .resource(
                MASTER_SECURITY_GROUP,
                Self::security_group(ctx, "master", Self::api_ingress(ctx)),
            )
            .resource(
                WORKER_SECURITY_GROUP,
                Self::security_group(
                    ctx,
                    "worker",
                    vec![json!({ "IpProtocol": "-1", "CidrIp": vpc.to_string() })],
                ),
            )
            .resource(
                INGRESS_SECURITY_GROUP,
                Self::security_group(
                    ctx,
                    "ingress",
                    vec![tcp(80, "0.0.0.0/0"), tcp(443, "0.0.0.0/0")],
                ),
            )
            .output("VPCID", reference(VPC));

        for (i, zone) in spec.aws.availability_zones.iter().enumerate() {
            let index = i as u32;
            let public = vpc.subnet(SUBNET_PREFIX_DELTA, index)?;
            let private = vpc.subnet(SUBNET_PREFIX_DELTA, index + PRIVATE_SUBNET_OFFSET)?;

            fragment = fragment
                .resource(
                    &public_subnet(i),
                    json!({
                        "Type": "AWS::EC2::Subnet",
                        "Properties": {
                            "VpcId": reference(VPC),
                            "AvailabilityZone": zone,
                            "CidrBlock": public.to_string(),
                            "MapPublicIpOnLaunch": true,
                        }
                    }),
                )
                .resource(
                    &format!("PublicSubnet{i}RouteTableAssociation"),
                    json!({
                        "Type": "AWS::EC2::SubnetRouteTableAssociation",
                        "Properties": {
                            "SubnetId": reference(&public_subnet(i)),
                            "RouteTableId": reference(PUBLIC_ROUTE_TABLE),
                        }
                    }),
                )
                .resource(
                    &private_subnet(i),
                    json!({
                        "Type": "AWS::EC2::Subnet",
                        "Properties": {
                            "VpcId": reference(VPC),
                            "AvailabilityZone": zone,
                            "CidrBlock": private.to_string(),
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
    use stackflow_config::ApiWhitelist;

    #[test]
    fn test_subnets_per_zone() {
        let spec = cluster();
        let config = operator_config();
        let fragment = NetworkAdapter
            .fragment(&AdapterContext {
                spec: &spec,
                config: &config,
                bootstrap: &CloudConfigRenderer,
            })
            .unwrap();

        let cidr = |name: &str| fragment.resources[name]["Properties"]["CidrBlock"].clone();
        assert_eq!(cidr("PublicSubnet0"), "10.1.0.0/20");
        assert_eq!(cidr("PublicSubnet1"), "10.1.16.0/20");
        assert_eq!(cidr("PrivateSubnet0"), "10.1.128.0/20");
        assert_eq!(cidr("PrivateSubnet1"), "10.1.144.0/20");
        assert!(!fragment.resources.contains_key("PublicSubnet2"));
    }

    #[test]
    fn test_api_whitelist_restricts_master_ingress() {
        let mut spec = cluster();
        spec.api_whitelist = Some(ApiWhitelist {
            enabled: true,
            subnet_list: "172.16.0.0/12,192.168.0.0/16".to_string(),
        });
        let config = operator_config();
        let fragment = NetworkAdapter
            .fragment(&AdapterContext {
                spec: &spec,
                config: &config,
                bootstrap: &CloudConfigRenderer,
            })
            .unwrap();

        let ingress =
            &fragment.resources[MASTER_SECURITY_GROUP]["Properties"]["SecurityGroupIngress"];
        assert_eq!(ingress.as_array().unwrap().len(), 2);
        assert_eq!(ingress[0]["CidrIp"], "172.16.0.0/12");
    }
}
