//! Ordered resource chains and reconciliation passes

use crate::error::{Phase, ReconcileError, Result};
use crate::patch::{ChangeKind, Patch, PatchSummary};
use crate::resource::{Instance, Resource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::marker::PhantomData;

/// Type-erased chain entry wrapping one [`Resource`]
#[async_trait]
trait ChainEntry<I: Instance>: Send + Sync {
    fn name(&self) -> &str;

    /// Compute the patch and apply its creates
    async fn create_phase<'a>(&'a self, instance: &I) -> Result<Box<dyn StagedPatch<I> + 'a>>;
}

/// Updates and deletes held back until the rest of the pass has run
#[async_trait]
trait StagedPatch<I: Instance>: Send + Sync {
    fn summary(&self) -> PatchSummary;

    async fn apply_update(&self, instance: &I) -> Result<()>;

    async fn apply_delete(&self, instance: &I) -> Result<()>;
}

struct Entry<R>(R);

struct Staged<'a, R, I>
where
    R: Resource<I>,
    I: Instance,
{
    resource: &'a R,
    patch: Patch<R::State>,
    _instance: PhantomData<fn(&I)>,
}

#[async_trait]
impl<I, R> ChainEntry<I> for Entry<R>
where
    I: Instance + 'static,
    R: Resource<I> + 'static,
{
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn create_phase<'a>(&'a self, instance: &I) -> Result<Box<dyn StagedPatch<I> + 'a>> {
        let resource = &self.0;
        let name = resource.name();

        let current = resource
            .current_state(instance)
            .await
            .map_err(|e| e.in_resource(name, Phase::CurrentState))?;
        let desired = resource
            .desired_state(instance, &current)
            .await
            .map_err(|e| e.in_resource(name, Phase::DesiredState))?;

        let patch = resource.new_patch(&current, &desired);
        tracing::debug!(
            resource = name,
            cluster = instance.id(),
            "computed patch: {}",
            patch.summary()
        );

        if patch.has(ChangeKind::Create) {
            resource
                .apply_create(instance, &patch)
                .await
                .map_err(|e| e.in_resource(name, Phase::Create))?;
        }

        Ok(Box::new(Staged {
            resource,
            patch,
            _instance: PhantomData,
        }))
    }
}

#[async_trait]
impl<'a, I, R> StagedPatch<I> for Staged<'a, R, I>
where
    I: Instance + 'static,
    R: Resource<I> + 'static,
{
    fn summary(&self) -> PatchSummary {
        self.patch.summary()
    }

    async fn apply_update(&self, instance: &I) -> Result<()> {
        if !self.patch.has(ChangeKind::Update) {
            return Ok(());
        }
        self.resource
            .apply_update(instance, &self.patch)
            .await
            .map_err(|e| e.in_resource(self.resource.name(), Phase::Update))
    }

    async fn apply_delete(&self, instance: &I) -> Result<()> {
        if !self.patch.has(ChangeKind::Delete) {
            return Ok(());
        }
        self.resource
            .apply_delete(instance, &self.patch)
            .await
            .map_err(|e| e.in_resource(self.resource.name(), Phase::Delete))
    }
}

/// Ordered, immutable list of reconcilers for one version.
///
/// A pass walks the chain in order computing each patch and applying its
/// creates, so downstream resources observe upstream creations. Updates are
/// then applied in chain order, and deletes last in reverse chain order.
pub struct ResourceChain<I: Instance> {
    version: String,
    entries: Vec<Box<dyn ChainEntry<I>>>,
}

impl<I: Instance + 'static> ResourceChain<I> {
    pub fn builder(version: impl Into<String>) -> ChainBuilder<I> {
        ChainBuilder {
            version: version.into(),
            entries: Vec::new(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Resource names in chain order
    pub fn resources(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name()).collect()
    }

    /// Run one reconciliation pass for `instance`.
    ///
    /// Errors stop the pass; side effects already applied stay applied.
    pub async fn reconcile(&self, instance: &I) -> Result<PassReport> {
        let started_at = Utc::now();
        tracing::info!(
            cluster = instance.id(),
            version = %self.version,
            "reconciling {} resources",
            self.entries.len()
        );

        let mut staged = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            staged.push(entry.create_phase(instance).await?);
        }

        for patch in &staged {
            patch.apply_update(instance).await?;
        }

        for patch in staged.iter().rev() {
            patch.apply_delete(instance).await?;
        }

        let report = PassReport {
            instance: instance.id().to_string(),
            version: self.version.clone(),
            started_at,
            finished_at: Utc::now(),
            resources: self
                .entries
                .iter()
                .zip(&staged)
                .map(|(entry, patch)| ResourceReport {
                    name: entry.name().to_string(),
                    summary: patch.summary(),
                })
                .collect(),
        };

        tracing::info!(
            cluster = instance.id(),
            version = %self.version,
            "reconciled: {}",
            report.total()
        );
        Ok(report)
    }
}

impl<I: Instance> std::fmt::Debug for ResourceChain<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceChain")
            .field("version", &self.version)
            .field(
                "resources",
                &self.entries.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Builder for [`ResourceChain`]
pub struct ChainBuilder<I: Instance> {
    version: String,
    entries: Vec<Box<dyn ChainEntry<I>>>,
}

impl<I: Instance + 'static> ChainBuilder<I> {
    /// Append a reconciler; chain order is dependency order
    pub fn with<R>(mut self, resource: R) -> Self
    where
        R: Resource<I> + 'static,
    {
        self.entries.push(Box::new(Entry(resource)));
        self
    }

    pub fn build(self) -> Result<ResourceChain<I>> {
        if self.version.is_empty() {
            return Err(ReconcileError::contract("chain", "version must not be empty"));
        }
        if self.entries.is_empty() {
            return Err(ReconcileError::contract(
                format!("chain {}", self.version),
                "chain has no resources",
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.name().to_string()) {
                return Err(ReconcileError::contract(
                    format!("chain {}", self.version),
                    format!("resource {} registered twice", entry.name()),
                ));
            }
        }

        Ok(ResourceChain {
            version: self.version,
            entries: self.entries,
        })
    }
}

/// Changes of one resource within a pass
#[derive(Debug, Clone, Serialize)]
pub struct ResourceReport {
    pub name: String,
    pub summary: PatchSummary,
}

/// Result of a reconciliation pass
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub instance: String,
    /// Version of the chain that ran; the driver persists it as the marker
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub resources: Vec<ResourceReport>,
}

impl PassReport {
    pub fn total(&self) -> PatchSummary {
        self.resources
            .iter()
            .fold(PatchSummary::default(), |acc, r| acc + r.summary)
    }

    pub fn has_changes(&self) -> bool {
        self.total().has_changes()
    }

    pub fn resource(&self, name: &str) -> Option<&PatchSummary> {
        self.resources
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::patch::ResourceItem;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    struct Cluster {
        id: String,
        deleting: bool,
    }

    impl Instance for Cluster {
        fn id(&self) -> &str {
            &self.id
        }

        fn version_marker(&self) -> Option<&str> {
            None
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Thing {
        name: String,
        revision: u32,
    }

    impl ResourceItem for Thing {
        fn key(&self) -> &str {
            &self.name
        }
    }

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Owns one remote thing per resource, shared journal across the chain
    struct ThingResource {
        name: &'static str,
        revision: u32,
        remote: Mutex<Vec<Thing>>,
        journal: Journal,
    }

    impl ThingResource {
        fn new(
            name: &'static str,
            revision: u32,
            existing: Option<u32>,
            journal: &Journal,
        ) -> Self {
            Self {
                name,
                revision,
                remote: Mutex::new(
                    existing
                        .map(|revision| Thing {
                            name: name.to_string(),
                            revision,
                        })
                        .into_iter()
                        .collect(),
                ),
                journal: journal.clone(),
            }
        }
    }

    #[async_trait]
    impl Resource<Cluster> for ThingResource {
        type State = Thing;

        fn name(&self) -> &str {
            self.name
        }

        async fn current_state(&self, _instance: &Cluster) -> Result<Vec<Thing>> {
            Ok(self.remote.lock().await.clone())
        }

        async fn desired_state(
            &self,
            instance: &Cluster,
            _current: &[Thing],
        ) -> Result<Vec<Thing>> {
            if instance.deleting {
                return Ok(Vec::new());
            }
            Ok(vec![Thing {
                name: self.name.to_string(),
                revision: self.revision,
            }])
        }

        async fn apply_create(&self, _instance: &Cluster, patch: &Patch<Thing>) -> Result<()> {
            for thing in patch.creates() {
                self.journal.lock().await.push(format!("create {}", thing.name));
                self.remote.lock().await.push(thing.clone());
            }
            Ok(())
        }

        async fn apply_update(&self, _instance: &Cluster, patch: &Patch<Thing>) -> Result<()> {
            for thing in patch.updates() {
                self.journal.lock().await.push(format!("update {}", thing.name));
                *self.remote.lock().await = vec![thing.clone()];
            }
            Ok(())
        }

        async fn apply_delete(&self, _instance: &Cluster, patch: &Patch<Thing>) -> Result<()> {
            for thing in patch.deletes() {
                self.journal.lock().await.push(format!("delete {}", thing.name));
                self.remote.lock().await.clear();
            }
            Ok(())
        }
    }

    fn cluster(deleting: bool) -> Cluster {
        Cluster {
            id: "c1".to_string(),
            deleting,
        }
    }

    #[tokio::test]
    async fn test_pass_orders_creates_updates_deletes_across_chain() {
        let journal = Journal::default();
        let chain = ResourceChain::builder("1.0.0")
            .with(ThingResource::new("network", 2, Some(1), &journal))
            .with(ThingResource::new("stack", 1, None, &journal))
            .build()
            .unwrap();

        let report = chain.reconcile(&cluster(false)).await.unwrap();
        assert_eq!(*journal.lock().await, vec!["create stack", "update network"]);
        assert_eq!(report.resource("network").unwrap().update, 1);
        assert_eq!(report.resource("stack").unwrap().create, 1);
        assert_eq!(report.version, "1.0.0");

        let report = chain.reconcile(&cluster(false)).await.unwrap();
        assert!(!report.has_changes());
    }

    #[tokio::test]
    async fn test_deletes_run_last_in_reverse_order() {
        let journal = Journal::default();
        let chain = ResourceChain::builder("1.0.0")
            .with(ThingResource::new("network", 1, Some(1), &journal))
            .with(ThingResource::new("stack", 1, Some(1), &journal))
            .with(ThingResource::new("loadbalancer", 1, Some(1), &journal))
            .build()
            .unwrap();

        let report = chain.reconcile(&cluster(true)).await.unwrap();
        assert_eq!(
            *journal.lock().await,
            vec!["delete loadbalancer", "delete stack", "delete network"]
        );
        assert_eq!(report.total().delete, 3);
    }

    #[test]
    fn test_duplicate_resource_is_rejected() {
        let journal = Journal::default();
        let err = ResourceChain::builder("1.0.0")
            .with(ThingResource::new("stack", 1, None, &journal))
            .with(ThingResource::new("stack", 2, None, &journal))
            .build()
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Contract);
    }

    #[test]
    fn test_empty_chain_is_rejected() {
        let err = ResourceChain::<Cluster>::builder("1.0.0").build().unwrap_err();
        assert_eq!(err.class(), ErrorClass::Contract);
    }

    #[test]
    fn test_resources_keep_chain_order() {
        let journal = Journal::default();
        let chain = ResourceChain::builder("2.0.0")
            .with(ThingResource::new("s3bucket", 1, None, &journal))
            .with(ThingResource::new("cloudformation", 1, None, &journal))
            .build()
            .unwrap();
        assert_eq!(chain.resources(), vec!["s3bucket", "cloudformation"]);
        assert_eq!(chain.version(), "2.0.0");
    }
}
