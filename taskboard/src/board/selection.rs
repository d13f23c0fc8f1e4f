//! Task ids picked for a pending bulk action.

use std::collections::BTreeSet;

use taskboard_proto::TaskId;

/// Set of selected task ids.
///
/// Membership rules (only ids in the current view may be added) are enforced
/// by the store, which owns both the view and the selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: BTreeSet<TaskId>,
}

impl SelectionSet {
    /// Creates an empty selection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `id` if absent, removes it if present. Returns `true` if the id
    /// is selected afterwards.
    pub fn toggle(&mut self, id: &TaskId) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.clone());
            true
        }
    }

    /// Adds `id`. Returns `true` if it was not selected before.
    pub fn insert(&mut self, id: &TaskId) -> bool {
        self.ids.insert(id.clone())
    }

    /// Removes `id`. Returns `true` if it was selected.
    pub fn remove(&mut self, id: &TaskId) -> bool {
        self.ids.remove(id)
    }

    /// Keeps only the ids for which `keep` returns `true`.
    pub fn retain(&mut self, keep: impl FnMut(&TaskId) -> bool) {
        self.ids.retain(keep);
    }

    /// Whether `id` is selected.
    #[must_use]
    pub fn contains(&self, id: &TaskId) -> bool {
        self.ids.contains(id)
    }

    /// Number of selected ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Empties the selection.
    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Selected ids in a stable order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<TaskId> {
        self.ids.iter().cloned().collect()
    }

    /// Iterates over selected ids.
    pub fn iter(&self) -> impl Iterator<Item = &TaskId> {
        self.ids.iter()
    }
}
