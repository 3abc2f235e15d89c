//! Sparse allocation policy.
//!
//! Dense variables always hold storage. Sparse variables come and go at
//! runtime, but only when sparse support is switched on for the container;
//! with it off they are materialized eagerly and pinned, so a run can flip
//! one flag and get dense semantics everywhere. Misdirected lifecycle calls
//! are hard errors rather than silent no-ops.

use floe_core::{AllocError, Metadata, MetadataFlag};
use floe_field::CellVariable;
use log::debug;

/// Container-wide sparse behavior, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SparseConfig {
    /// Allow deferred allocation and runtime deallocation of sparse
    /// variables. Off by default: sparse-flagged variables then allocate
    /// eagerly like dense ones and refuse to deallocate.
    pub enabled: bool,
}

/// Decides when cell variables get storage and polices who may release it.
#[derive(Debug, Clone, Copy)]
pub struct AllocationPolicy {
    config: SparseConfig,
}

impl AllocationPolicy {
    /// Policy under the given config.
    pub fn new(config: SparseConfig) -> Self {
        Self { config }
    }

    /// The config this policy was built from.
    pub fn config(&self) -> SparseConfig {
        self.config
    }

    /// Whether sparse variables may be deallocated at runtime.
    pub fn sparse_enabled(&self) -> bool {
        self.config.enabled
    }

    /// True when a variable with this metadata starts life unallocated.
    pub fn defer_initial_allocation(&self, meta: &Metadata) -> bool {
        self.config.enabled && meta.is_set(MetadataFlag::Sparse)
    }

    /// Materialize storage for `var`, filling it with the metadata default.
    ///
    /// Idempotent, and legal for any cell variable: allocating something
    /// already allocated is not an event worth failing over.
    pub fn allocate(&self, var: &CellVariable) {
        if !var.is_allocated() {
            debug!("allocating {}", var.label());
        }
        var.allocate();
    }

    /// Release the storage of `var`.
    ///
    /// # Errors
    ///
    /// [`AllocError::NotSparse`] for a variable without the `Sparse` flag,
    /// [`AllocError::SparseDisabled`] when the container pins sparse
    /// variables. Both indicate a caller bug upstream.
    pub fn deallocate(&self, var: &CellVariable) -> Result<(), AllocError> {
        if !var.metadata().is_set(MetadataFlag::Sparse) {
            return Err(AllocError::NotSparse {
                label: var.label().to_string(),
            });
        }
        if !self.config.enabled {
            return Err(AllocError::SparseDisabled {
                label: var.label().to_string(),
            });
        }
        if var.is_allocated() {
            debug!("deallocating {}", var.label());
        }
        var.deallocate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floe_core::{AllocError, Placement, SparseId, VarLabel};
    use floe_field::BlockLayout;

    fn layout() -> BlockLayout {
        BlockLayout::new(4, 1, 1, 2, false).unwrap()
    }

    fn dense_var() -> CellVariable {
        let meta = Metadata::new(Placement::Cell, &[MetadataFlag::Independent]);
        CellVariable::new(VarLabel::dense("rho"), meta, layout())
    }

    fn sparse_var() -> CellVariable {
        let meta = Metadata::new(
            Placement::Cell,
            &[MetadataFlag::Independent, MetadataFlag::Sparse],
        );
        CellVariable::new(VarLabel::sparse("q", SparseId(3)), meta, layout())
    }

    fn policy(enabled: bool) -> AllocationPolicy {
        AllocationPolicy::new(SparseConfig { enabled })
    }

    #[test]
    fn deferral_needs_both_the_flag_and_the_config() {
        assert!(policy(true).defer_initial_allocation(sparse_var().metadata()));
        assert!(!policy(true).defer_initial_allocation(dense_var().metadata()));
        assert!(!policy(false).defer_initial_allocation(sparse_var().metadata()));
    }

    #[test]
    fn allocate_is_idempotent() {
        let var = sparse_var();
        let policy = policy(true);
        policy.allocate(&var);
        let generation = var.storage_generation();
        policy.allocate(&var);
        assert!(var.is_allocated());
        assert_eq!(var.storage_generation(), generation);
    }

    #[test]
    fn dense_variables_refuse_to_deallocate() {
        let var = dense_var();
        let err = policy(true).deallocate(&var).unwrap_err();
        assert!(matches!(err, AllocError::NotSparse { .. }));
    }

    #[test]
    fn disabled_sparse_support_pins_storage() {
        let var = sparse_var();
        policy(false).allocate(&var);
        let err = policy(false).deallocate(&var).unwrap_err();
        assert!(matches!(err, AllocError::SparseDisabled { .. }));
        assert!(var.is_allocated());
    }

    #[test]
    fn enabled_sparse_support_releases_storage() {
        let var = sparse_var();
        let policy = policy(true);
        policy.allocate(&var);
        policy.deallocate(&var).unwrap();
        assert!(!var.is_allocated());
    }
}
