//! Operator configuration model
//!
//! Installation-wide settings shared by every resource chain.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};

/// Operator configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct OperatorConfig {
    /// Name of the installation, tagged on every created resource
    pub installation_name: String,

    /// Account guest clusters are created in
    pub guest_aws: AwsAccount,

    /// Account of the host (control plane); defaults to the guest account
    #[serde(default)]
    pub host_aws: Option<AwsAccount>,

    #[serde(default)]
    pub advanced_monitoring_ec2: bool,

    #[serde(default)]
    pub route53_enabled: bool,

    /// Propagate instance labels to resource tags
    #[serde(default)]
    pub include_tags: bool,

    /// Remove the access-log bucket when a cluster is deleted
    #[serde(default)]
    pub delete_logging_bucket: bool,

    #[serde(default = "default_access_logs_expiration")]
    pub access_logs_expiration_days: u32,

    /// Backend for instances that do not choose one
    #[serde(default)]
    pub encrypter_backend: EncrypterBackend,

    #[serde(default)]
    pub api_whitelist: ApiWhitelist,

    #[serde(default)]
    pub oidc: Option<OidcConfig>,

    #[serde(default)]
    pub registry_domain: Option<String>,

    #[serde(default)]
    pub pod_infra_container_image: Option<String>,

    #[serde(default)]
    pub vault_address: Option<String>,
}

fn default_access_logs_expiration() -> u32 {
    365
}

/// Cloud account context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct AwsAccount {
    pub region: String,
    pub account_id: String,

    /// Role assumed for API calls in this account
    #[serde(default)]
    pub role_arn: Option<String>,

    /// Host VPC guest clusters peer with
    #[serde(default)]
    pub vpc_id: Option<String>,
}

/// Encryption backend for cluster secrets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncrypterBackend {
    #[default]
    Kms,
    Vault,
}

impl std::fmt::Display for EncrypterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncrypterBackend::Kms => write!(f, "kms"),
            EncrypterBackend::Vault => write!(f, "vault"),
        }
    }
}

/// Guest cluster API access restriction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ApiWhitelist {
    #[serde(default)]
    pub enabled: bool,

    /// Comma separated CIDRs
    #[serde(default)]
    pub subnet_list: String,
}

impl ApiWhitelist {
    pub fn subnets(&self) -> Vec<String> {
        self.subnet_list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// OIDC provider settings passed to the API server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct OidcConfig {
    pub client_id: String,
    pub issuer_url: String,
    #[serde(default)]
    pub username_claim: Option<String>,
    #[serde(default)]
    pub groups_claim: Option<String>,
}

impl OperatorConfig {
    /// Account for host resources; the guest account when none is configured
    pub fn host_account(&self) -> &AwsAccount {
        match &self.host_aws {
            Some(host) => host,
            None => &self.guest_aws,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.installation_name.trim().is_empty() {
            return Err(ConfigError::invalid("installation_name", "must not be empty"));
        }
        validate_account("guest_aws", &self.guest_aws)?;

        match &self.host_aws {
            Some(host) => validate_account("host_aws", host)?,
            None => tracing::debug!(
                "no host account configured, assuming guest and host use the same account"
            ),
        }

        if self.api_whitelist.enabled && self.api_whitelist.subnets().is_empty() {
            return Err(ConfigError::invalid(
                "api_whitelist.subnet_list",
                "must not be empty when the whitelist is enabled",
            ));
        }

        if let Some(oidc) = &self.oidc {
            if oidc.issuer_url.trim().is_empty() {
                return Err(ConfigError::invalid("oidc.issuer_url", "must not be empty"));
            }
        }

        Ok(())
    }
}

fn validate_account(field: &str, account: &AwsAccount) -> Result<()> {
    if account.region.trim().is_empty() {
        return Err(ConfigError::invalid(
            &format!("{field}.region"),
            "must not be empty",
        ));
    }
    if account.account_id.trim().is_empty() {
        return Err(ConfigError::invalid(
            &format!("{field}.account_id"),
            "must not be empty",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
installation_name: gauss
guest_aws:
  region: eu-central-1
  account_id: "123456789012"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config: OperatorConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.access_logs_expiration_days, 365);
        assert_eq!(config.encrypter_backend, EncrypterBackend::Kms);
        assert!(!config.route53_enabled);
        assert_eq!(config.host_account(), &config.guest_aws);
    }

    #[test]
    fn test_host_account_override() {
        let yaml = format!(
            "{MINIMAL}host_aws:\n  region: eu-west-1\n  account_id: \"210987654321\"\n  \
             vpc_id: vpc-0abc\n"
        );
        let config: OperatorConfig = serde_yaml::from_str(&yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.host_account().account_id, "210987654321");
        assert_eq!(config.host_account().vpc_id.as_deref(), Some("vpc-0abc"));
    }

    #[test]
    fn test_empty_region_is_rejected() {
        let mut config: OperatorConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.guest_aws.region.clear();

        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "guest_aws.region"),
            other => panic!("Expected invalid region, got {other:?}"),
        }
    }

    #[test]
    fn test_enabled_whitelist_needs_subnets() {
        let mut config: OperatorConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.api_whitelist = ApiWhitelist {
            enabled: true,
            subnet_list: " , ".to_string(),
        };
        assert!(config.validate().is_err());

        config.api_whitelist.subnet_list = "10.0.0.0/8, 172.16.0.0/12".to_string();
        config.validate().unwrap();
        assert_eq!(
            config.api_whitelist.subnets(),
            vec!["10.0.0.0/8", "172.16.0.0/12"]
        );
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let yaml = format!("{MINIMAL}route53: true\n");
        assert!(serde_yaml::from_str::<OperatorConfig>(&yaml).is_err());
    }
}
