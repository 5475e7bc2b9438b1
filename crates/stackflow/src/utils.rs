use anyhow::Context;
use serde::{Deserialize, Serialize};
use stackflow_aws::{ChainConfig, ClusterSpec, Clients, MemoryCloud, Snapshot};
use stackflow_cloud::{Instance, VersionRouter};
use stackflow_config::OperatorConfig;
use std::path::Path;
use std::sync::Arc;

/// Read and validate a cluster specification
pub fn load_cluster(path: &Path) -> anyhow::Result<ClusterSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read cluster file {}", path.display()))?;
    let spec: ClusterSpec = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse cluster file {}", path.display()))?;
    spec.validate()
        .with_context(|| format!("invalid cluster {}", spec.id))?;
    Ok(spec)
}

/// Saved in-memory cloud state
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PlanState {
    #[serde(default)]
    pub guest: Snapshot,
    /// Only used when the host account differs from the guest account
    #[serde(default)]
    pub host: Snapshot,
}

impl PlanState {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read state file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse state file {}", path.display()))
    }
}

/// In-memory clouds of the guest and host accounts
pub struct Clouds {
    pub guest: Arc<MemoryCloud>,
    pub host: Option<Arc<MemoryCloud>>,
}

impl Clouds {
    pub fn new(config: &OperatorConfig, state: PlanState) -> Self {
        let guest = Arc::new(MemoryCloud::from_snapshot(
            config.guest_aws.account_id.clone(),
            state.guest,
        ));
        let host = config
            .host_aws
            .as_ref()
            .filter(|host| host.account_id != config.guest_aws.account_id)
            .map(|host| Arc::new(MemoryCloud::from_snapshot(host.account_id.clone(), state.host)));
        Self { guest, host }
    }

    pub fn chain_config(&self, config: OperatorConfig) -> ChainConfig {
        let guest = Clients::from_cloud(self.guest.clone());
        let host = match &self.host {
            Some(host) => Clients::from_cloud(host.clone()),
            None => guest.clone(),
        };
        ChainConfig::new(config, guest, host)
    }

    pub async fn state(&self) -> PlanState {
        PlanState {
            guest: self.guest.snapshot().await,
            host: match &self.host {
                Some(host) => host.snapshot().await,
                None => Snapshot::default(),
            },
        }
    }
}

/// Router whose chains talk to empty in-memory clouds
pub fn offline_router(config: OperatorConfig) -> anyhow::Result<VersionRouter<ClusterSpec>> {
    let clouds = Clouds::new(&config, PlanState::default());
    Ok(stackflow_aws::new_router(&clouds.chain_config(config))?)
}
