//! Change and patch types for cloud resource reconciliation

use serde::{Deserialize, Serialize};

/// An element of current or desired state, matched by logical name
pub trait ResourceItem: Clone + PartialEq + std::fmt::Debug + Send + Sync {
    /// Stable logical name used to match current against desired state
    fn key(&self) -> &str;
}

/// Type of change to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Create a new resource
    Create,
    /// Update an existing resource
    Update,
    /// Delete a resource
    Delete,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Create => write!(f, "create"),
            ChangeKind::Update => write!(f, "update"),
            ChangeKind::Delete => write!(f, "delete"),
        }
    }
}

/// One atomic operation against the provider
#[derive(Debug, Clone, PartialEq)]
pub struct Change<T> {
    pub kind: ChangeKind,
    pub item: T,
}

impl<T: ResourceItem> Change<T> {
    pub fn key(&self) -> &str {
        self.item.key()
    }
}

/// Ordered changes for one resource reconciler.
///
/// Creates always precede updates, which always precede deletes.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch<T> {
    changes: Vec<Change<T>>,
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Self {
            changes: Vec::new(),
        }
    }
}

impl<T: ResourceItem> Patch<T> {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_creates(items: Vec<T>) -> Self {
        Self::of_kind(ChangeKind::Create, items)
    }

    pub fn with_updates(items: Vec<T>) -> Self {
        Self::of_kind(ChangeKind::Update, items)
    }

    pub fn with_deletes(items: Vec<T>) -> Self {
        Self::of_kind(ChangeKind::Delete, items)
    }

    fn of_kind(kind: ChangeKind, items: Vec<T>) -> Self {
        Self {
            changes: items.into_iter().map(|item| Change { kind, item }).collect(),
        }
    }

    /// Add a change, keeping the create/update/delete order.
    ///
    /// Changes of the same kind keep their insertion order.
    pub fn push(&mut self, kind: ChangeKind, item: T) {
        let at = self.changes.partition_point(|c| c.kind <= kind);
        self.changes.insert(at, Change { kind, item });
    }

    /// Append all changes of `other`, keeping the ordering invariant
    pub fn merge(mut self, other: Patch<T>) -> Self {
        for change in other.changes {
            self.push(change.kind, change.item);
        }
        self
    }

    pub fn changes(&self) -> &[Change<T>] {
        &self.changes
    }

    /// Items of the given change kind, in patch order
    pub fn items(&self, kind: ChangeKind) -> Vec<&T> {
        self.changes
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| &c.item)
            .collect()
    }

    pub fn creates(&self) -> Vec<&T> {
        self.items(ChangeKind::Create)
    }

    pub fn updates(&self) -> Vec<&T> {
        self.items(ChangeKind::Update)
    }

    pub fn deletes(&self) -> Vec<&T> {
        self.items(ChangeKind::Delete)
    }

    pub fn has(&self, kind: ChangeKind) -> bool {
        self.changes.iter().any(|c| c.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Patch restricted to one change kind
    pub fn only(&self, kind: ChangeKind) -> Patch<T> {
        Self {
            changes: self
                .changes
                .iter()
                .filter(|c| c.kind == kind)
                .cloned()
                .collect(),
        }
    }

    pub fn summary(&self) -> PatchSummary {
        PatchSummary {
            create: self.creates().len(),
            update: self.updates().len(),
            delete: self.deletes().len(),
        }
    }
}

/// Summary of a patch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

impl PatchSummary {
    pub fn has_changes(&self) -> bool {
        self.create + self.update + self.delete > 0
    }
}

impl std::ops::Add for PatchSummary {
    type Output = PatchSummary;

    fn add(self, rhs: PatchSummary) -> PatchSummary {
        PatchSummary {
            create: self.create + rhs.create,
            update: self.update + rhs.update,
            delete: self.delete + rhs.delete,
        }
    }
}

impl std::fmt::Display for PatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete",
            self.create, self.update, self.delete
        )
    }
}
