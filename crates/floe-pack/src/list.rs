//! Ordered variable selections feeding the pack builders.

use crate::fingerprint::AllocFingerprint;
use floe_core::{SparseId, VarLabel};
use floe_field::CellVariable;
use std::sync::Arc;

/// An ordered, de-duplicated selection of variables.
///
/// The registry hands variables over in name-sorted order and pack slot
/// layout follows list order, so the same selection always produces the
/// same layout. Adding a label twice keeps the first occurrence.
#[derive(Clone, Debug, Default)]
pub struct VarList {
    vars: Vec<Arc<CellVariable>>,
}

impl VarList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `var` unless its label is already present or a sparse filter
    /// excludes it. Returns whether the variable was admitted.
    ///
    /// With `sparse_ids` of `None` every variable passes. With a filter,
    /// dense variables still pass; sparse variables pass only when their
    /// ID is listed. Unallocated variables are admitted either way — they
    /// occupy slots, and the allocation state is captured separately by
    /// [`fingerprint`](Self::fingerprint).
    pub fn add(&mut self, var: &Arc<CellVariable>, sparse_ids: Option<&[SparseId]>) -> bool {
        if let (Some(filter), Some(id)) = (sparse_ids, var.label().sparse_id()) {
            if !filter.contains(&id) {
                return false;
            }
        }
        if self.vars.iter().any(|v| v.label() == var.label()) {
            return false;
        }
        self.vars.push(Arc::clone(var));
        true
    }

    /// The selected variables in list order.
    pub fn vars(&self) -> &[Arc<CellVariable>] {
        &self.vars
    }

    /// Number of selected variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// The labels in list order. This is the cache key for the selection.
    pub fn labels(&self) -> Vec<VarLabel> {
        self.vars.iter().map(|v| v.label().clone()).collect()
    }

    /// The current allocation bit of every member, in list order.
    pub fn fingerprint(&self) -> AllocFingerprint {
        self.vars.iter().map(|v| v.is_allocated()).collect()
    }
}

impl FromIterator<Arc<CellVariable>> for VarList {
    fn from_iter<I: IntoIterator<Item = Arc<CellVariable>>>(iter: I) -> Self {
        let mut list = Self::new();
        for var in iter {
            list.add(&var, None);
        }
        list
    }
}
