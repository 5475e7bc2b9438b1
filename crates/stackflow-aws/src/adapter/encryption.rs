//! Encryption backend wiring
//!
//! `kms` declares a per-cluster key and alias, `vault` passes the vault
//! address as a parameter.

use crate::composer::{Adapter, AdapterContext};
use crate::template::{Fragment, get_att, reference};
use serde_json::json;
use stackflow_cloud::{ReconcileError, Result};
use stackflow_config::EncrypterBackend;

pub const ENCRYPTION_KEY: &str = "EncryptionKey";
pub const VAULT_ADDRESS: &str = "VaultAddress";

#[derive(Debug, Default)]
pub struct EncryptionAdapter;

impl Adapter for EncryptionAdapter {
    fn name(&self) -> &str {
        "encryption"
    }

    fn fragment(&self, ctx: &AdapterContext<'_>) -> Result<Fragment> {
        match ctx.spec.encrypter_backend(ctx.config) {
            EncrypterBackend::Kms => {
                let account_id = &ctx.config.guest_aws.account_id;
                Ok(Fragment::new()
                    .resource(
                        ENCRYPTION_KEY,
                        json!({
                            "Type": "AWS::KMS::Key",
                            "Properties": {
                                "Description": format!("{} secret encryption", ctx.spec.id),
                                "EnableKeyRotation": true,
                                "KeyPolicy": {
                                    "Version": "2012-10-17",
                                    "Statement": [{
                                        "Effect": "Allow",
                                        "Principal": {
                                            "AWS": format!("arn:aws:iam::{account_id}:root")
                                        },
                                        "Action": "kms:*",
                                        "Resource": "*",
                                    }]
                                },
                            }
                        }),
                    )
                    .resource(
                        "EncryptionKeyAlias",
                        json!({
                            "Type": "AWS::KMS::Alias",
                            "Properties": {
                                "AliasName": format!("alias/{}", ctx.spec.id),
                                "TargetKeyId": reference(ENCRYPTION_KEY),
                            }
                        }),
                    )
                    .output("EncryptionKeyArn", get_att(ENCRYPTION_KEY, "Arn")))
            }
            EncrypterBackend::Vault => {
                let address = ctx.config.vault_address.as_deref().ok_or_else(|| {
                    ReconcileError::invalid_config(
                        "vault_address",
                        "required with the vault encrypter backend",
                    )
                })?;
                Ok(Fragment::new().parameter(VAULT_ADDRESS, address))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::CloudConfigRenderer;
    use crate::spec::tests::{cluster, operator_config};

    #[test]
    fn test_kms_key_and_alias() {
        let spec = cluster();
        let config = operator_config();
        let fragment = EncryptionAdapter
            .fragment(&AdapterContext {
                spec: &spec,
                config: &config,
                bootstrap: &CloudConfigRenderer,
            })
            .unwrap();

        assert_eq!(
            fragment.resources["EncryptionKeyAlias"]["Properties"]["AliasName"],
            "alias/al9qy"
        );
        assert!(fragment.parameters.is_empty());
    }

    #[test]
    fn test_vault_backend_needs_address() {
        let mut spec = cluster();
        spec.encryption = Some(EncrypterBackend::Vault);
        let mut config = operator_config();

        let result = EncryptionAdapter.fragment(&AdapterContext {
            spec: &spec,
            config: &config,
            bootstrap: &CloudConfigRenderer,
        });
        assert!(result.unwrap_err().to_string().contains("vault_address"));

        config.vault_address = Some("https://vault.gauss.example.com".to_string());
        let fragment = EncryptionAdapter
            .fragment(&AdapterContext {
                spec: &spec,
                config: &config,
                bootstrap: &CloudConfigRenderer,
            })
            .unwrap();
        assert!(fragment.resources.is_empty());
        assert_eq!(
            fragment.parameters[VAULT_ADDRESS],
            "https://vault.gauss.example.com"
        );
    }
}
