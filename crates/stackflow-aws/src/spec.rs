//! Cluster specification
//!
//! The declarative description of one guest cluster. Fields left unset fall
//! back to the installation-wide [`OperatorConfig`].

use serde::{Deserialize, Serialize};
use stackflow_cloud::{Instance, ReconcileError, Result};
use stackflow_config::{ApiWhitelist, EncrypterBackend, OidcConfig, OperatorConfig};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Largest VPC prefix that still leaves room for per-zone subnets
pub const MAX_VPC_PREFIX: u8 = 24;

/// Subnets are carved out of the VPC range with this many extra prefix bits
pub const SUBNET_PREFIX_DELTA: u8 = 4;

/// Per-zone public and private subnets must fit into the VPC range
pub const MAX_AVAILABILITY_ZONES: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ClusterSpec {
    pub id: String,

    /// Version of the chain that last reconciled this cluster
    #[serde(default)]
    pub version: Option<String>,

    /// The cluster is being torn down
    #[serde(default)]
    pub deleting: bool,

    pub aws: AwsSpec,

    #[serde(default = "NodeGroup::default_masters")]
    pub masters: NodeGroup,

    #[serde(default = "NodeGroup::default_workers")]
    pub workers: NodeGroup,

    #[serde(default)]
    pub features: Features,

    /// Zone delegated to the cluster's hosted zone
    #[serde(default)]
    pub base_domain: Option<String>,

    #[serde(default)]
    pub logging: LoggingSpec,

    #[serde(default)]
    pub encryption: Option<EncrypterBackend>,

    #[serde(default)]
    pub api_whitelist: Option<ApiWhitelist>,

    #[serde(default)]
    pub oidc: Option<OidcConfig>,

    /// Registry mirror used by the nodes
    #[serde(default)]
    pub registry: Option<String>,

    /// Free-form labels, propagated to tags when `include_tags` is set
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct AwsSpec {
    pub region: String,
    pub availability_zones: Vec<String>,
    pub vpc_cidr: String,
    pub image_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct NodeGroup {
    pub count: u32,
    pub instance_type: String,
    #[serde(default = "default_volume_size")]
    pub volume_size_gb: u32,
}

fn default_volume_size() -> u32 {
    100
}

impl NodeGroup {
    fn default_masters() -> Self {
        Self {
            count: 1,
            instance_type: "m5.large".to_string(),
            volume_size_gb: default_volume_size(),
        }
    }

    fn default_workers() -> Self {
        Self {
            count: 3,
            instance_type: "m5.xlarge".to_string(),
            volume_size_gb: default_volume_size(),
        }
    }

    /// Instance families with local NVMe storage
    pub fn has_instance_storage(&self) -> bool {
        let family = self
            .instance_type
            .split('.')
            .next()
            .unwrap_or_default();
        family.starts_with("i3") || (family.len() > 2 && family.ends_with('d'))
    }
}

/// Per-cluster overrides of installation-wide toggles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct Features {
    #[serde(default)]
    pub monitoring: Option<bool>,
    #[serde(default)]
    pub dns: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct LoggingSpec {
    /// Expiration of delivered access logs, in days
    #[serde(default)]
    pub retention_days: Option<u32>,
}

impl ClusterSpec {
    pub fn monitoring_enabled(&self, config: &OperatorConfig) -> bool {
        self.features
            .monitoring
            .unwrap_or(config.advanced_monitoring_ec2)
    }

    pub fn dns_enabled(&self, config: &OperatorConfig) -> bool {
        self.features.dns.unwrap_or(config.route53_enabled)
    }

    pub fn encrypter_backend(&self, config: &OperatorConfig) -> EncrypterBackend {
        self.encryption.unwrap_or(config.encrypter_backend)
    }

    pub fn access_logs_expiration(&self, config: &OperatorConfig) -> u32 {
        self.logging
            .retention_days
            .unwrap_or(config.access_logs_expiration_days)
    }

    pub fn api_whitelist<'a>(&'a self, config: &'a OperatorConfig) -> &'a ApiWhitelist {
        self.api_whitelist.as_ref().unwrap_or(&config.api_whitelist)
    }

    pub fn oidc<'a>(&'a self, config: &'a OperatorConfig) -> Option<&'a OidcConfig> {
        self.oidc.as_ref().or(config.oidc.as_ref())
    }

    pub fn registry<'a>(&'a self, config: &'a OperatorConfig) -> Option<&'a str> {
        self.registry
            .as_deref()
            .or(config.registry_domain.as_deref())
    }

    /// Parsed VPC range
    pub fn vpc_network(&self) -> Result<Ipv4Cidr> {
        let cidr: Ipv4Cidr = self.aws.vpc_cidr.parse()?;
        if cidr.prefix > MAX_VPC_PREFIX {
            return Err(ReconcileError::invalid_config(
                "aws.vpc_cidr",
                format!("prefix must be /{MAX_VPC_PREFIX} or larger"),
            ));
        }
        Ok(cidr)
    }
}

impl Instance for ClusterSpec {
    fn id(&self) -> &str {
        &self.id
    }

    fn version_marker(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(ReconcileError::invalid_config("id", "must not be empty"));
        }
        // The id is embedded in bucket and stack names.
        if !self
            .id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ReconcileError::invalid_config(
                "id",
                "may only contain lowercase letters, digits and '-'",
            ));
        }
        if self.aws.region.trim().is_empty() {
            return Err(ReconcileError::invalid_config("aws.region", "must not be empty"));
        }
        if self.aws.image_id.trim().is_empty() {
            return Err(ReconcileError::invalid_config(
                "aws.image_id",
                "must not be empty",
            ));
        }

        let zones = self.aws.availability_zones.len();
        if zones == 0 || zones > MAX_AVAILABILITY_ZONES {
            return Err(ReconcileError::invalid_config(
                "aws.availability_zones",
                format!("expected 1 to {MAX_AVAILABILITY_ZONES} zones, got {zones}"),
            ));
        }
        self.vpc_network()?;

        if self.masters.count == 0 {
            return Err(ReconcileError::invalid_config(
                "masters.count",
                "at least one master is required",
            ));
        }
        if let Some(days) = self.logging.retention_days {
            if days == 0 {
                return Err(ReconcileError::invalid_config(
                    "logging.retention_days",
                    "must be at least one day",
                ));
            }
        }
        Ok(())
    }
}

/// IPv4 network in CIDR notation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    pub addr: Ipv4Addr,
    pub prefix: u8,
}

impl Ipv4Cidr {
    /// The `index`-th subnet with `delta` additional prefix bits
    pub fn subnet(&self, delta: u8, index: u32) -> Result<Ipv4Cidr> {
        let prefix = self.prefix + delta;
        if prefix > 32 || u64::from(index) >= 1u64 << delta {
            return Err(ReconcileError::invalid_config(
                "aws.vpc_cidr",
                format!("no subnet #{index} of /{prefix} in {self}"),
            ));
        }
        let base = u32::from(self.addr);
        let offset = index << (32 - u32::from(prefix));
        Ok(Ipv4Cidr {
            addr: Ipv4Addr::from(base | offset),
            prefix,
        })
    }
}

impl std::str::FromStr for Ipv4Cidr {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid =
            || ReconcileError::invalid_config("aws.vpc_cidr", format!("invalid CIDR {s:?}"));

        let (addr, prefix) = s.split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        if prefix == 0 || prefix > 32 {
            return Err(invalid());
        }

        let mask = u32::MAX << (32 - u32::from(prefix));
        if u32::from(addr) & !mask != 0 {
            return Err(ReconcileError::invalid_config(
                "aws.vpc_cidr",
                format!("{s} has host bits set"),
            ));
        }
        Ok(Ipv4Cidr { addr, prefix })
    }
}

impl std::fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}
