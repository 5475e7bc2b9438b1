//! Hosted zone and API, etcd and ingress records

use super::compute;
use crate::composer::{Adapter, AdapterContext};
use crate::template::{Fragment, get_att, reference};
use serde_json::{Value, json};
use stackflow_cloud::{ReconcileError, Result};

pub const HOSTED_ZONE: &str = "HostedZone";

#[derive(Debug, Default)]
pub struct DnsAdapter;

impl DnsAdapter {
    fn record(zone: &str, name: &str, load_balancer: &str) -> Value {
        json!({
            "Type": "AWS::Route53::RecordSet",
            "Properties": {
                "HostedZoneId": reference(HOSTED_ZONE),
                "Name": format!("{name}.{zone}."),
                "Type": "CNAME",
                "TTL": "300",
                "ResourceRecords": [get_att(load_balancer, "DNSName")],
            }
        })
    }
}

impl Adapter for DnsAdapter {
    fn name(&self) -> &str {
        "dns"
    }

    fn fragment(&self, ctx: &AdapterContext<'_>) -> Result<Fragment> {
        if !ctx.spec.dns_enabled(ctx.config) {
            return Ok(Fragment::new());
        }
        let base_domain = ctx.spec.base_domain.as_deref().ok_or_else(|| {
            ReconcileError::invalid_config("base_domain", "required when DNS is enabled")
        })?;
        let zone = format!("{}.k8s.{}", ctx.spec.id, base_domain);

        Ok(Fragment::new()
            .resource(
                HOSTED_ZONE,
                json!({
                    "Type": "AWS::Route53::HostedZone",
                    "Properties": { "Name": zone }
                }),
            )
            .resource(
                "ApiRecordSet",
                Self::record(&zone, "api", compute::API_LOAD_BALANCER),
            )
            .resource(
                "EtcdRecordSet",
                Self::record(&zone, "etcd", compute::API_LOAD_BALANCER),
            )
            .resource(
                "IngressRecordSet",
                Self::record(&zone, "ingress", compute::INGRESS_LOAD_BALANCER),
            )
            .resource(
                "IngressWildcardRecordSet",
                Self::record(&zone, "*", compute::INGRESS_LOAD_BALANCER),
            )
            .output("HostedZoneNameServers", get_att(HOSTED_ZONE, "NameServers")))
    }
}
