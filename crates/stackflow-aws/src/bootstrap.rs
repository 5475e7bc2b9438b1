//! Node bootstrap documents
//!
//! The stack carries the bootstrap document of each node group as opaque
//! user data. Rendering is pluggable through [`BootstrapRenderer`];
//! [`CloudConfigRenderer`] emits a minimal cloud-config.

use crate::spec::{ClusterSpec, NodeGroup};
use serde::Serialize;
use stackflow_cloud::{ReconcileError, Result};
use stackflow_config::OperatorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Master,
    Worker,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::Worker => "worker",
        }
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs of one bootstrap document
pub struct BootstrapContext<'a> {
    pub spec: &'a ClusterSpec,
    pub config: &'a OperatorConfig,
    pub role: NodeRole,
}

impl BootstrapContext<'_> {
    pub fn group(&self) -> &NodeGroup {
        match self.role {
            NodeRole::Master => &self.spec.masters,
            NodeRole::Worker => &self.spec.workers,
        }
    }
}

/// Renders the bootstrap document of a node group.
///
/// Must be deterministic: the output ends up in the stack template, and a
/// different rendering of the same inputs causes a stack update.
pub trait BootstrapRenderer: Send + Sync {
    fn render(&self, ctx: &BootstrapContext<'_>) -> Result<String>;
}

#[derive(Serialize)]
struct CloudConfig {
    write_files: Vec<WriteFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    storage: Option<Storage>,
}

#[derive(Serialize)]
struct WriteFile {
    path: String,
    permissions: &'static str,
    content: String,
}

#[derive(Serialize)]
struct Storage {
    filesystems: Vec<Filesystem>,
}

#[derive(Serialize)]
struct Filesystem {
    name: &'static str,
    mount: Mount,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Mount {
    device: &'static str,
    format: &'static str,
    wipe_filesystem: bool,
}

/// Default renderer producing a cloud-config document
#[derive(Debug, Default, Clone, Copy)]
pub struct CloudConfigRenderer;

impl CloudConfigRenderer {
    fn apiserver_flags(ctx: &BootstrapContext<'_>) -> Vec<String> {
        let mut flags = vec![format!("--cluster-name={}", ctx.spec.id)];
        if let Some(oidc) = ctx.spec.oidc(ctx.config) {
            flags.push(format!("--oidc-issuer-url={}", oidc.issuer_url));
            flags.push(format!("--oidc-client-id={}", oidc.client_id));
            if let Some(claim) = &oidc.username_claim {
                flags.push(format!("--oidc-username-claim={claim}"));
            }
            if let Some(claim) = &oidc.groups_claim {
                flags.push(format!("--oidc-groups-claim={claim}"));
            }
        }
        flags
    }

    fn kubelet_flags(ctx: &BootstrapContext<'_>) -> Vec<String> {
        let mut flags = vec![format!("--node-labels=role={}", ctx.role)];
        if let Some(image) = &ctx.config.pod_infra_container_image {
            flags.push(format!("--pod-infra-container-image={image}"));
        }
        flags
    }
}

impl BootstrapRenderer for CloudConfigRenderer {
    fn render(&self, ctx: &BootstrapContext<'_>) -> Result<String> {
        let mut write_files = vec![WriteFile {
            path: "/etc/kubernetes/config/kubelet.env".to_string(),
            permissions: "0644",
            content: format!("KUBELET_FLAGS=\"{}\"\n", Self::kubelet_flags(ctx).join(" ")),
        }];

        if ctx.role == NodeRole::Master {
            write_files.push(WriteFile {
                path: "/etc/kubernetes/config/apiserver.env".to_string(),
                permissions: "0644",
                content: format!(
                    "APISERVER_FLAGS=\"{}\"\n",
                    Self::apiserver_flags(ctx).join(" ")
                ),
            });
        }

        if let Some(registry) = ctx.spec.registry(ctx.config) {
            write_files.push(WriteFile {
                path: "/etc/docker/daemon.json".to_string(),
                permissions: "0644",
                content: format!("{{\"registry-mirrors\": [\"https://{registry}\"]}}\n"),
            });
        }

        let storage = ctx.group().has_instance_storage().then(|| Storage {
            filesystems: vec![Filesystem {
                name: "ephemeral1",
                mount: Mount {
                    device: "/dev/nvme0n1",
                    format: "xfs",
                    wipe_filesystem: true,
                },
            }],
        });

        let document = serde_yaml::to_string(&CloudConfig {
            write_files,
            storage,
        })
        .map_err(|e| ReconcileError::contract("bootstrap", e.to_string()))?;

        Ok(format!("#cloud-config\n{document}"))
    }
}
