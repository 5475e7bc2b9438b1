//! Diffing current against desired state by logical name

use crate::patch::{Patch, ResourceItem};

fn find<'a, T: ResourceItem>(items: &'a [T], key: &str) -> Option<&'a T> {
    items.iter().find(|i| i.key() == key)
}

/// Desired elements with no current counterpart
pub fn create_patch<T: ResourceItem>(current: &[T], desired: &[T]) -> Patch<T> {
    Patch::with_creates(
        desired
            .iter()
            .filter(|d| find(current, d.key()).is_none())
            .cloned()
            .collect(),
    )
}

/// Current elements with no desired counterpart
pub fn delete_patch<T: ResourceItem>(current: &[T], desired: &[T]) -> Patch<T> {
    Patch::with_deletes(
        current
            .iter()
            .filter(|c| find(desired, c.key()).is_none())
            .cloned()
            .collect(),
    )
}

/// Desired elements present in both states for which `differs` holds.
///
/// The update carries the desired element.
pub fn update_patch<T, F>(current: &[T], desired: &[T], differs: F) -> Patch<T>
where
    T: ResourceItem,
    F: Fn(&T, &T) -> bool,
{
    Patch::with_updates(
        desired
            .iter()
            .filter(|d| find(current, d.key()).is_some_and(|c| differs(c, d)))
            .cloned()
            .collect(),
    )
}
