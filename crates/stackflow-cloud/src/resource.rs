//! Resource reconciler contract
//!
//! Every resource kind (bucket, stack, load balancer, role, ...) implements
//! [`Resource`]. The diff itself is generic; implementations provide state
//! retrieval, desired state derivation and the remote side effects.

use crate::diff;
use crate::error::{Phase, ReconcileError, Result};
use crate::patch::{ChangeKind, Patch, PatchSummary, ResourceItem};
use async_trait::async_trait;

/// Specification instance being reconciled.
///
/// Reconcilers only ever read it.
pub trait Instance: Send + Sync {
    /// Identifier of the instance, used for logging and ownership tags
    fn id(&self) -> &str;

    /// Version of the chain that last reconciled the instance
    fn version_marker(&self) -> Option<&str>;

    /// Check the fields desired state derivation depends on
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Reconciler for one resource kind
#[async_trait]
pub trait Resource<I: Instance>: Send + Sync {
    /// Element of current and desired state
    type State: ResourceItem;

    /// Returns the resource name (e.g., "s3bucket", "cloudformation")
    fn name(&self) -> &str;

    /// Query the provider for what exists right now.
    ///
    /// An absent resource is an empty state, not an error.
    async fn current_state(&self, instance: &I) -> Result<Vec<Self::State>>;

    /// Derive what should exist from the instance.
    ///
    /// Must be deterministic for the same inputs.
    async fn desired_state(
        &self,
        instance: &I,
        current: &[Self::State],
    ) -> Result<Vec<Self::State>>;

    /// Whether an element present in both states needs an update
    fn needs_update(&self, current: &Self::State, desired: &Self::State) -> bool {
        current != desired
    }

    fn new_create_patch(
        &self,
        current: &[Self::State],
        desired: &[Self::State],
    ) -> Patch<Self::State> {
        diff::create_patch(current, desired)
    }

    fn new_update_patch(
        &self,
        current: &[Self::State],
        desired: &[Self::State],
    ) -> Patch<Self::State> {
        diff::update_patch(current, desired, |c, d| self.needs_update(c, d))
    }

    fn new_delete_patch(
        &self,
        current: &[Self::State],
        desired: &[Self::State],
    ) -> Patch<Self::State> {
        diff::delete_patch(current, desired)
    }

    /// Full patch bridging current to desired state
    fn new_patch(&self, current: &[Self::State], desired: &[Self::State]) -> Patch<Self::State> {
        self.new_create_patch(current, desired)
            .merge(self.new_update_patch(current, desired))
            .merge(self.new_delete_patch(current, desired))
    }

    /// Apply the create changes of `patch`.
    ///
    /// "Already exists" must be treated as success.
    async fn apply_create(&self, _instance: &I, patch: &Patch<Self::State>) -> Result<()> {
        reject(self.name(), ChangeKind::Create, patch)
    }

    async fn apply_update(&self, _instance: &I, patch: &Patch<Self::State>) -> Result<()> {
        reject(self.name(), ChangeKind::Update, patch)
    }

    /// Apply the delete changes of `patch`.
    ///
    /// "Not found" must be treated as success.
    async fn apply_delete(&self, _instance: &I, patch: &Patch<Self::State>) -> Result<()> {
        reject(self.name(), ChangeKind::Delete, patch)
    }

    /// Reconcile this resource on its own: current, desired, patch, apply
    async fn reconcile(&self, instance: &I) -> Result<PatchSummary> {
        let current = self
            .current_state(instance)
            .await
            .map_err(|e| e.in_resource(self.name(), Phase::CurrentState))?;
        let desired = self
            .desired_state(instance, &current)
            .await
            .map_err(|e| e.in_resource(self.name(), Phase::DesiredState))?;

        let patch = self.new_patch(&current, &desired);

        if patch.has(ChangeKind::Create) {
            self.apply_create(instance, &patch)
                .await
                .map_err(|e| e.in_resource(self.name(), Phase::Create))?;
        }
        if patch.has(ChangeKind::Update) {
            self.apply_update(instance, &patch)
                .await
                .map_err(|e| e.in_resource(self.name(), Phase::Update))?;
        }
        if patch.has(ChangeKind::Delete) {
            self.apply_delete(instance, &patch)
                .await
                .map_err(|e| e.in_resource(self.name(), Phase::Delete))?;
        }

        Ok(patch.summary())
    }
}

fn reject<T: ResourceItem>(resource: &str, kind: ChangeKind, patch: &Patch<T>) -> Result<()> {
    if patch.has(kind) {
        return Err(ReconcileError::contract(
            resource,
            format!("{kind} changes are not supported"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use tokio::sync::Mutex;

    struct Cluster {
        id: String,
        tables: Vec<(&'static str, u32)>,
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
    struct Table {
        name: String,
        capacity: u32,
    }

    impl ResourceItem for Table {
        fn key(&self) -> &str {
            &self.name
        }
    }

    /// Keeps tables in memory and records every side effect
    #[derive(Default)]
    struct TableResource {
        remote: Mutex<Vec<Table>>,
        log: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Resource<Cluster> for TableResource {
        type State = Table;

        fn name(&self) -> &str {
            "table"
        }

        async fn current_state(&self, _instance: &Cluster) -> Result<Vec<Table>> {
            Ok(self.remote.lock().await.clone())
        }

        async fn desired_state(
            &self,
            instance: &Cluster,
            _current: &[Table],
        ) -> Result<Vec<Table>> {
            Ok(instance
                .tables
                .iter()
                .map(|(name, capacity)| Table {
                    name: name.to_string(),
                    capacity: *capacity,
                })
                .collect())
        }

        async fn apply_create(&self, _instance: &Cluster, patch: &Patch<Table>) -> Result<()> {
            for table in patch.creates() {
                self.log.lock().await.push(format!("create {}", table.name));
                self.remote.lock().await.push(table.clone());
            }
            Ok(())
        }

        async fn apply_update(&self, _instance: &Cluster, patch: &Patch<Table>) -> Result<()> {
            let mut remote = self.remote.lock().await;
            for table in patch.updates() {
                self.log.lock().await.push(format!("update {}", table.name));
                if let Some(existing) = remote.iter_mut().find(|t| t.name == table.name) {
                    *existing = table.clone();
                }
            }
            Ok(())
        }

        async fn apply_delete(&self, _instance: &Cluster, patch: &Patch<Table>) -> Result<()> {
            let mut remote = self.remote.lock().await;
            for table in patch.deletes() {
                self.log.lock().await.push(format!("delete {}", table.name));
                remote.retain(|t| t.name != table.name);
            }
            Ok(())
        }
    }

    fn cluster(tables: Vec<(&'static str, u32)>) -> Cluster {
        Cluster {
            id: "c1".to_string(),
            tables,
        }
    }

    #[tokio::test]
    async fn test_reconcile_converges() {
        let resource = TableResource::default();
        let instance = cluster(vec![("users", 5), ("events", 10)]);

        let summary = resource.reconcile(&instance).await.unwrap();
        assert_eq!(summary.create, 2);

        let summary = resource.reconcile(&instance).await.unwrap();
        assert!(!summary.has_changes());
    }

    #[tokio::test]
    async fn test_reconcile_applies_create_update_delete_in_order() {
        let resource = TableResource::default();
        resource.reconcile(&cluster(vec![("a", 1), ("b", 1)])).await.unwrap();
        resource.log.lock().await.clear();

        let summary = resource
            .reconcile(&cluster(vec![("b", 2), ("c", 1)]))
            .await
            .unwrap();
        assert_eq!(summary.to_string(), "1 to create, 1 to update, 1 to delete");
        assert_eq!(
            *resource.log.lock().await,
            vec!["create c", "update b", "delete a"]
        );
    }

    struct ReadOnly;

    #[async_trait]
    impl Resource<Cluster> for ReadOnly {
        type State = Table;

        fn name(&self) -> &str {
            "read-only"
        }

        async fn current_state(&self, _instance: &Cluster) -> Result<Vec<Table>> {
            Ok(Vec::new())
        }

        async fn desired_state(
            &self,
            instance: &Cluster,
            _current: &[Table],
        ) -> Result<Vec<Table>> {
            Ok(instance
                .tables
                .iter()
                .map(|(name, capacity)| Table {
                    name: name.to_string(),
                    capacity: *capacity,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_unsupported_change_is_contract_violation() {
        let err = ReadOnly
            .reconcile(&cluster(vec![("a", 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Contract);
        assert!(err.to_string().contains("read-only (create)"));
    }
}
