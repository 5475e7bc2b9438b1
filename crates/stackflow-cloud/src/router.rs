//! Version routing
//!
//! Several chains coexist: instances keep reconciling with the chain named
//! by their version marker until a migration changes the marker.

use crate::chain::{PassReport, ResourceChain};
use crate::error::{ReconcileError, Result};
use crate::resource::Instance;

/// Maps version identifiers to fully constructed chains.
///
/// Chains are registered oldest first and never mutated afterwards.
pub struct VersionRouter<I: Instance> {
    chains: Vec<ResourceChain<I>>,
}

impl<I: Instance + 'static> VersionRouter<I> {
    /// Create a router from chains ordered oldest to newest
    pub fn new(chains: Vec<ResourceChain<I>>) -> Result<Self> {
        if chains.is_empty() {
            return Err(ReconcileError::contract(
                "router",
                "at least one chain must be registered",
            ));
        }

        for (i, chain) in chains.iter().enumerate() {
            if chains[..i].iter().any(|c| c.version() == chain.version()) {
                return Err(ReconcileError::contract(
                    "router",
                    format!("version {} registered twice", chain.version()),
                ));
            }
        }

        Ok(Self { chains })
    }

    /// Supported versions, oldest first
    pub fn versions(&self) -> Vec<&str> {
        self.chains.iter().map(|c| c.version()).collect()
    }

    pub fn chains(&self) -> &[ResourceChain<I>] {
        &self.chains
    }

    pub fn oldest(&self) -> &ResourceChain<I> {
        &self.chains[0]
    }

    pub fn latest(&self) -> &ResourceChain<I> {
        &self.chains[self.chains.len() - 1]
    }

    pub fn get(&self, version: &str) -> Option<&ResourceChain<I>> {
        self.chains.iter().find(|c| c.version() == version)
    }

    /// Select the chain for an instance.
    ///
    /// No marker selects the oldest chain; an unknown marker is an error,
    /// never a fallback to another chain.
    pub fn select(&self, instance: &I) -> Result<&ResourceChain<I>> {
        match instance.version_marker() {
            None => Ok(self.oldest()),
            Some(version) => self.get(version).ok_or_else(|| ReconcileError::UnsupportedVersion {
                instance: instance.id().to_string(),
                version: version.to_string(),
            }),
        }
    }

    /// Validate the instance, select its chain and run one pass
    pub async fn reconcile(&self, instance: &I) -> Result<PassReport> {
        instance.validate()?;

        let chain = self.select(instance).inspect_err(|e| {
            tracing::error!(cluster = instance.id(), error = %e, "cannot select resource chain");
        })?;

        chain.reconcile(instance).await
    }
}
