//! Supported versions and their resource chains
//!
//! Chains are built once from a [`ChainConfig`] and never change afterwards.
//! Clusters keep the chain recorded in their version marker until they are
//! migrated explicitly.
//!
//! | version | chain |
//! |---------|-------|
//! | 1.0.0   | s3bucket → cloudformation → loadbalancer |
//! | 2.0.0   | s3bucket (+ delivery log) → iamrole → cloudformation (+ host IAM, encryption) → loadbalancer |

use crate::adapter::{
    ComputeAdapter, DnsAdapter, EncryptionAdapter, GuestIamAdapter, HostIamAdapter,
    MonitoringAdapter, NetworkAdapter,
};
use crate::bootstrap::{BootstrapRenderer, CloudConfigRenderer};
use crate::client::Clients;
use crate::composer::StackComposer;
use crate::resource::{BucketResource, LoadBalancerResource, RoleResource, StackResource};
use crate::spec::ClusterSpec;
use stackflow_cloud::{ResourceChain, Result, VersionRouter};
use stackflow_config::OperatorConfig;
use std::sync::Arc;

pub const V1: &str = "1.0.0";
pub const V2: &str = "2.0.0";

/// Supported versions, oldest first
pub const VERSIONS: [&str; 2] = [V1, V2];

const STACK_DESCRIPTION: &str = "StackFlow guest cluster";

/// Dependencies injected into every chain
#[derive(Clone)]
pub struct ChainConfig {
    pub config: Arc<OperatorConfig>,
    /// Clients of the guest account
    pub guest: Clients,
    /// Clients of the host account
    pub host: Clients,
    pub bootstrap: Arc<dyn BootstrapRenderer>,
}

impl ChainConfig {
    pub fn new(config: OperatorConfig, guest: Clients, host: Clients) -> Self {
        Self {
            config: Arc::new(config),
            guest,
            host,
            bootstrap: Arc::new(CloudConfigRenderer),
        }
    }

    pub fn with_bootstrap(mut self, bootstrap: Arc<dyn BootstrapRenderer>) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    fn stack(&self, composer: StackComposer) -> StackResource {
        StackResource::new(
            self.guest.cloudformation.clone(),
            self.config.clone(),
            self.bootstrap.clone(),
            composer,
        )
    }
}

/// Stack composer of a version
pub fn composer(version: &str) -> Option<StackComposer> {
    let composer = match version {
        V1 => StackComposer::new(STACK_DESCRIPTION)
            .with(NetworkAdapter)
            .with(GuestIamAdapter)
            .with(MonitoringAdapter)
            .with(DnsAdapter)
            .with(ComputeAdapter),
        V2 => StackComposer::new(STACK_DESCRIPTION)
            .with(NetworkAdapter)
            .with(GuestIamAdapter)
            .with(HostIamAdapter)
            .with(MonitoringAdapter)
            .with(DnsAdapter)
            .with(EncryptionAdapter)
            .with(ComputeAdapter),
        _ => return None,
    };
    Some(composer)
}

fn composer_for(version: &str) -> Result<StackComposer> {
    composer(version).ok_or_else(|| {
        stackflow_cloud::ReconcileError::contract(
            format!("chain {version}"),
            "no stack composer for version",
        )
    })
}

pub fn chain_v1(cc: &ChainConfig) -> Result<ResourceChain<ClusterSpec>> {
    ResourceChain::builder(V1)
        .with(BucketResource::new(cc.guest.s3.clone(), cc.config.clone()))
        .with(cc.stack(composer_for(V1)?))
        .with(LoadBalancerResource::new(cc.guest.elb.clone()))
        .build()
}

pub fn chain_v2(cc: &ChainConfig) -> Result<ResourceChain<ClusterSpec>> {
    ResourceChain::builder(V2)
        .with(BucketResource::new(cc.guest.s3.clone(), cc.config.clone()).with_delivery_log())
        .with(RoleResource::new(cc.host.iam.clone(), cc.config.clone()))
        .with(cc.stack(composer_for(V2)?))
        .with(LoadBalancerResource::new(cc.guest.elb.clone()))
        .build()
}

/// Router over every supported chain
pub fn new_router(cc: &ChainConfig) -> Result<VersionRouter<ClusterSpec>> {
    VersionRouter::new(vec![chain_v1(cc)?, chain_v2(cc)?])
}
