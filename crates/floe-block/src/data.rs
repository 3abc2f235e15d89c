//! The per-block variable container.
//!
//! [`BlockData`] is the registry every other layer hangs off: variables are
//! registered here (usually wholesale from a [`ResolvedSchema`]), looked up
//! here, selected into [`VarList`]s here, and bundled into cached packs
//! here. The boundary-exchange face of the container lives in
//! [`exchange`](crate::exchange).
//!
//! Copies come in two depths. A shallow copy shares every variable's
//! storage with the source and is how task lists build stage-local views; a
//! deep copy clones storage except for `OneCopy` variables and face fields,
//! which are shared by rule. Neither depth copies boundary-channel state;
//! a copy that needs to exchange runs its own channel setup.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use floe_comm::{BoundaryVariable, Transport};
use floe_core::{
    AllocError, BlockId, ConfigError, FlagSet, Metadata, MetadataFlag, Placement, ResolvedSchema,
    SelectionError, SparseId, VarLabel,
};
use floe_field::{BlockLayout, CellVariable, FaceVariable};
use floe_pack::{PackCache, VarList, VariableFluxPack, VariablePack};
use log::debug;

use crate::alloc::{AllocationPolicy, SparseConfig};

/// Which variables a [`BlockData::copy_from`] copy admits.
#[derive(Debug, Clone, Copy)]
pub enum CopyFilter<'a> {
    /// Every variable.
    All,
    /// Variables whose flags intersect the given set. An empty set matches
    /// everything.
    Flags(&'a [MetadataFlag]),
    /// Variables with the given base names. A name matching neither a
    /// dense variable, a sparse pool, nor a face variable is an error.
    Names(&'a [&'a str]),
}

/// All field data living on one mesh block.
///
/// Cell variables are held behind [`Arc`] so packs, boundary channels, and
/// shallow copies can share them; their storage is interior-locked, so a
/// `&BlockData` is enough to read or write field data. Registry membership
/// itself only changes through `&mut` methods, which is what keeps the
/// pack cache and boundary map honest.
pub struct BlockData {
    block: BlockId,
    layout: BlockLayout,
    policy: AllocationPolicy,
    schema: Option<Arc<ResolvedSchema>>,
    cell_vars: BTreeMap<VarLabel, Arc<CellVariable>>,
    face_vars: BTreeMap<VarLabel, Arc<FaceVariable>>,
    pack_cache: PackCache,
    pub(crate) boundaries: BTreeMap<VarLabel, BoundaryVariable>,
    pub(crate) transport: Option<Arc<dyn Transport>>,
}

impl BlockData {
    /// An empty container for `block`. Variables arrive through
    /// [`initialize`](Self::initialize) or
    /// [`add_variable`](Self::add_variable).
    pub fn new(block: BlockId, layout: BlockLayout, sparse: SparseConfig) -> Self {
        Self {
            block,
            layout,
            policy: AllocationPolicy::new(sparse),
            schema: None,
            cell_vars: BTreeMap::new(),
            face_vars: BTreeMap::new(),
            pack_cache: PackCache::new(),
            boundaries: BTreeMap::new(),
            transport: None,
        }
    }

    /// The block this container belongs to.
    pub fn block(&self) -> BlockId {
        self.block
    }

    /// The block's index-space layout.
    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// The sparse config the container was built with.
    pub fn sparse_config(&self) -> SparseConfig {
        self.policy.config()
    }

    /// The schema the container was last initialized from, if any.
    pub fn schema(&self) -> Option<&Arc<ResolvedSchema>> {
        self.schema.as_ref()
    }

    /// Number of registered variables, cell and face together. Sparse pool
    /// members count individually.
    pub fn var_count(&self) -> usize {
        self.cell_vars.len() + self.face_vars.len()
    }

    /// Registered cell variables in label order.
    pub fn cell_variables(&self) -> impl Iterator<Item = &Arc<CellVariable>> {
        self.cell_vars.values()
    }

    /// Registered face variables in label order.
    pub fn face_variables(&self) -> impl Iterator<Item = &Arc<FaceVariable>> {
        self.face_vars.values()
    }

    // ── Registration ────────────────────────────────────────────────────

    /// Drop everything and register every field of `schema`.
    ///
    /// Pool bases expand to one variable per member ID. Dense and face
    /// variables materialize storage immediately; sparse members defer
    /// while sparse support is enabled.
    ///
    /// # Errors
    ///
    /// Anything [`add_variable`](Self::add_variable) rejects, typically an
    /// unsupported placement. The container is left empty on failure, not
    /// half-populated.
    pub fn initialize(&mut self, schema: &Arc<ResolvedSchema>) -> Result<(), ConfigError> {
        self.clear();
        for (label, meta) in schema.all_fields() {
            if let Err(err) = self.add_variable(label.base(), meta.clone(), label.sparse_id()) {
                self.clear();
                return Err(err);
            }
        }
        self.schema = Some(Arc::clone(schema));
        debug!(
            "block b{}: registered {} variables from schema",
            self.block,
            self.var_count()
        );
        Ok(())
    }

    /// Register a single variable.
    ///
    /// `sparse_id` must be present exactly when the metadata carries the
    /// `Sparse` flag; the registered label is then `name_id`.
    ///
    /// # Errors
    ///
    /// Invalid metadata, a sparse flag/ID mismatch, a negative ID, a label
    /// already taken, or a placement the container does not support (only
    /// cell and face fields exist today).
    pub fn add_variable(
        &mut self,
        name: &str,
        meta: Metadata,
        sparse_id: Option<SparseId>,
    ) -> Result<(), ConfigError> {
        meta.validate(name)?;
        if meta.is_set(MetadataFlag::Sparse) != sparse_id.is_some() {
            return Err(ConfigError::InvalidMetadata {
                name: name.to_string(),
                reason: "the Sparse flag and a sparse ID must come together".to_string(),
            });
        }
        if let Some(id) = sparse_id {
            if id.0 < 0 {
                return Err(ConfigError::InvalidSparseId {
                    base: name.to_string(),
                    id,
                });
            }
        }
        let label = VarLabel::new(name, sparse_id);
        if self.cell_vars.contains_key(&label) || self.face_vars.contains_key(&label) {
            return Err(ConfigError::DuplicateField {
                label: label.to_string(),
            });
        }
        match meta.placement() {
            Placement::Edge | Placement::Node => Err(ConfigError::UnsupportedPlacement {
                placement: meta.placement(),
                name: name.to_string(),
            }),
            Placement::Face => {
                let var = FaceVariable::new(label.clone(), meta, self.layout);
                self.face_vars.insert(label, Arc::new(var));
                Ok(())
            }
            Placement::Cell => {
                let var = CellVariable::new(label.clone(), meta, self.layout);
                if !self.policy.defer_initial_allocation(var.metadata()) {
                    self.policy.allocate(&var);
                }
                self.cell_vars.insert(label, Arc::new(var));
                Ok(())
            }
        }
    }

    /// Remove the variable with this exact label.
    ///
    /// Cached packs containing it are purged and its boundary channels are
    /// dropped.
    ///
    /// # Errors
    ///
    /// [`SelectionError::UnknownVariable`] when no such label is
    /// registered.
    pub fn remove(&mut self, label: &VarLabel) -> Result<(), SelectionError> {
        let removed =
            self.cell_vars.remove(label).is_some() || self.face_vars.remove(label).is_some();
        if !removed {
            return Err(SelectionError::UnknownVariable {
                name: label.to_string(),
            });
        }
        self.pack_cache.purge(label);
        self.boundaries.remove(label);
        Ok(())
    }

    fn clear(&mut self) {
        self.cell_vars.clear();
        self.face_vars.clear();
        self.pack_cache.clear();
        self.boundaries.clear();
        self.transport = None;
        self.schema = None;
    }

    // ── Lookup ──────────────────────────────────────────────────────────

    /// Get the dense cell variable named `name`.
    ///
    /// # Errors
    ///
    /// [`SelectionError::UnknownVariable`] when absent. Sparse members are
    /// not found here; use [`get_sparse`](Self::get_sparse).
    pub fn get(&self, name: &str) -> Result<&Arc<CellVariable>, SelectionError> {
        self.cell_vars
            .get(&VarLabel::dense(name))
            .ok_or_else(|| SelectionError::UnknownVariable {
                name: name.to_string(),
            })
    }

    /// Get member `id` of the sparse pool `base`.
    ///
    /// # Errors
    ///
    /// [`SelectionError::UnknownSparseId`] when the pool exists but has no
    /// such member, [`SelectionError::UnknownVariable`] when there is no
    /// pool at all.
    pub fn get_sparse(
        &self,
        base: &str,
        id: SparseId,
    ) -> Result<&Arc<CellVariable>, SelectionError> {
        self.cell_vars
            .get(&VarLabel::sparse(base, id))
            .ok_or_else(|| {
                if self.pool_members(base).next().is_some() {
                    SelectionError::UnknownSparseId {
                        base: base.to_string(),
                        id,
                    }
                } else {
                    SelectionError::UnknownVariable {
                        name: base.to_string(),
                    }
                }
            })
    }

    /// Get the face variable named `name`.
    ///
    /// # Errors
    ///
    /// [`SelectionError::UnknownVariable`] when absent.
    pub fn get_face(&self, name: &str) -> Result<&Arc<FaceVariable>, SelectionError> {
        self.face_vars
            .get(&VarLabel::dense(name))
            .ok_or_else(|| SelectionError::UnknownVariable {
                name: name.to_string(),
            })
    }

    /// Whether the variable with this exact label currently holds storage.
    /// Unregistered labels are simply not allocated; face fields always
    /// are.
    pub fn is_allocated(&self, label: &VarLabel) -> bool {
        self.cell_vars
            .get(label)
            .map(|var| var.is_allocated())
            .unwrap_or_else(|| self.face_vars.contains_key(label))
    }

    /// Members of the sparse pool `base` in ascending ID order. Empty when
    /// no such pool exists.
    fn pool_members(&self, base: &str) -> impl Iterator<Item = &Arc<CellVariable>> {
        let lo = VarLabel::sparse(base, SparseId(0));
        let hi = VarLabel::sparse(base, SparseId(i32::MAX));
        self.cell_vars.range(lo..=hi).map(|(_, var)| var)
    }

    // ── Selection ───────────────────────────────────────────────────────

    /// Select cell variables by base name.
    ///
    /// A name matching a dense variable contributes that variable; a name
    /// matching a sparse pool contributes every member in ascending ID
    /// order, narrowed by `sparse` when given. The filter applies to
    /// sparse members only, and narrowing a selection down to nothing is
    /// fine.
    ///
    /// # Errors
    ///
    /// [`SelectionError::UnknownVariable`] for a name matching nothing.
    pub fn select_by_name(
        &self,
        names: &[&str],
        sparse: Option<&[SparseId]>,
    ) -> Result<VarList, SelectionError> {
        let mut list = VarList::new();
        for &name in names {
            if let Some(var) = self.cell_vars.get(&VarLabel::dense(name)) {
                list.add(var, sparse);
                continue;
            }
            let mut found = false;
            for var in self.pool_members(name) {
                list.add(var, sparse);
                found = true;
            }
            if !found {
                return Err(SelectionError::UnknownVariable {
                    name: name.to_string(),
                });
            }
        }
        Ok(list)
    }

    /// Select cell variables by metadata flags, in label order.
    ///
    /// With `match_all` a variable must carry every listed flag, otherwise
    /// any one suffices. An empty flag list matches everything. Flag
    /// selection cannot name a missing variable, so there is nothing to
    /// fail on.
    pub fn select_by_flags(
        &self,
        flags: &[MetadataFlag],
        match_all: bool,
        sparse: Option<&[SparseId]>,
    ) -> VarList {
        let mut list = VarList::new();
        for var in self.cell_vars.values() {
            let set = var.metadata().flags();
            let matched = flags.is_empty()
                || (match_all && set.contains_all(flags))
                || (!match_all && set.contains_any(flags));
            if matched {
                list.add(var, sparse);
            }
        }
        list
    }

    // ── Copies ──────────────────────────────────────────────────────────

    /// Build a new container over a subset of `src`'s variables.
    ///
    /// `shallow` copies share every admitted variable's storage with the
    /// source. Deep copies clone cell storage, except that `OneCopy`
    /// variables and face fields are always shared. `sparse` narrows
    /// admitted pool members. The copy starts without boundary channels
    /// regardless of depth.
    ///
    /// # Errors
    ///
    /// Only [`CopyFilter::Names`] can fail, on a name matching nothing.
    pub fn copy_from(
        src: &BlockData,
        shallow: bool,
        filter: CopyFilter<'_>,
        sparse: Option<&[SparseId]>,
    ) -> Result<Self, SelectionError> {
        match filter {
            CopyFilter::All => Ok(src.copy_where(shallow, sparse, |_| true)),
            CopyFilter::Flags(flags) => Ok(src.copy_where(shallow, sparse, |set| {
                flags.is_empty() || set.contains_any(flags)
            })),
            CopyFilter::Names(names) => src.copy_names(shallow, sparse, names),
        }
    }

    /// Shallow view holding the named variables.
    ///
    /// # Errors
    ///
    /// [`SelectionError::UnknownVariable`] for a name matching nothing.
    pub fn sub_container_by_names(&self, names: &[&str]) -> Result<Self, SelectionError> {
        self.copy_names(true, None, names)
    }

    /// Shallow view holding variables that carry any of `flags`.
    pub fn sub_container_by_flags(&self, flags: &[MetadataFlag]) -> Self {
        self.copy_where(true, None, |set| {
            flags.is_empty() || set.contains_any(flags)
        })
    }

    /// Shallow view keeping only the given sparse IDs. Dense variables are
    /// all kept; pool members outside `ids` are dropped.
    pub fn sparse_slice(&self, ids: &[SparseId]) -> Self {
        self.copy_where(true, Some(ids), |_| true)
    }

    fn empty_like(&self) -> Self {
        let mut dst = Self::new(self.block, self.layout, self.policy.config());
        dst.schema = self.schema.clone();
        dst
    }

    fn copy_where<F: Fn(FlagSet) -> bool>(
        &self,
        shallow: bool,
        sparse: Option<&[SparseId]>,
        keep: F,
    ) -> Self {
        let mut dst = self.empty_like();
        for var in self.cell_vars.values() {
            if keep(var.metadata().flags()) {
                dst.admit_cell(var, shallow, sparse);
            }
        }
        for var in self.face_vars.values() {
            if keep(var.metadata().flags()) {
                dst.admit_face(var);
            }
        }
        dst
    }

    fn copy_names(
        &self,
        shallow: bool,
        sparse: Option<&[SparseId]>,
        names: &[&str],
    ) -> Result<Self, SelectionError> {
        let mut dst = self.empty_like();
        for &name in names {
            if let Some(var) = self.cell_vars.get(&VarLabel::dense(name)) {
                dst.admit_cell(var, shallow, sparse);
                continue;
            }
            if let Some(var) = self.face_vars.get(&VarLabel::dense(name)) {
                dst.admit_face(var);
                continue;
            }
            let mut found = false;
            for var in self.pool_members(name) {
                dst.admit_cell(var, shallow, sparse);
                found = true;
            }
            if !found {
                return Err(SelectionError::UnknownVariable {
                    name: name.to_string(),
                });
            }
        }
        Ok(dst)
    }

    fn admit_cell(&mut self, var: &Arc<CellVariable>, shallow: bool, sparse: Option<&[SparseId]>) {
        if let (Some(filter), Some(id)) = (sparse, var.label().sparse_id()) {
            if !filter.contains(&id) {
                return;
            }
        }
        let shared = shallow || var.metadata().is_set(MetadataFlag::OneCopy);
        let copy = if shared {
            Arc::clone(var)
        } else {
            Arc::new(var.deep_copy())
        };
        self.cell_vars.insert(var.label().clone(), copy);
    }

    fn admit_face(&mut self, var: &Arc<FaceVariable>) {
        // Face fields are OneCopy by rule; every copy shares.
        self.face_vars.insert(var.label().clone(), Arc::clone(var));
    }

    // ── Sparse lifecycle ────────────────────────────────────────────────

    /// Materialize storage for member `id` of pool `base`. Idempotent.
    ///
    /// # Errors
    ///
    /// [`AllocError::UnknownVariable`] when no such member is registered.
    pub fn allocate_sparse(&mut self, base: &str, id: SparseId) -> Result<(), AllocError> {
        let var = self.sparse_target(base, id)?;
        self.policy.allocate(var);
        Ok(())
    }

    /// Release storage for member `id` of pool `base`.
    ///
    /// # Errors
    ///
    /// [`AllocError::UnknownVariable`] when no such member is registered,
    /// [`AllocError::SparseDisabled`] when the container pins sparse
    /// variables.
    pub fn deallocate_sparse(&mut self, base: &str, id: SparseId) -> Result<(), AllocError> {
        let var = self.sparse_target(base, id)?;
        self.policy.deallocate(var)
    }

    fn sparse_target(&self, base: &str, id: SparseId) -> Result<&Arc<CellVariable>, AllocError> {
        let label = VarLabel::sparse(base, id);
        self.cell_vars
            .get(&label)
            .ok_or_else(|| AllocError::UnknownVariable {
                label: label.to_string(),
            })
    }

    // ── Pack retrieval ──────────────────────────────────────────────────

    /// Get the cached pack over the named variables, rebuilding it only
    /// when absent or when a member's allocation state changed since it
    /// was built. `coarse` selects the pack over coarse-mirror buffers.
    ///
    /// # Errors
    ///
    /// [`SelectionError::UnknownVariable`] for a name matching nothing.
    pub fn pack_variables_by_name(
        &mut self,
        names: &[&str],
        sparse: Option<&[SparseId]>,
        coarse: bool,
    ) -> Result<&VariablePack, SelectionError> {
        let list = self.select_by_name(names, sparse)?;
        Ok(self.pack_cache.get_or_build(&list, coarse))
    }

    /// Get the cached pack over variables carrying all of `flags`.
    pub fn pack_variables_by_flags(
        &mut self,
        flags: &[MetadataFlag],
        sparse: Option<&[SparseId]>,
        coarse: bool,
    ) -> &VariablePack {
        let list = self.select_by_flags(flags, true, sparse);
        self.pack_cache.get_or_build(&list, coarse)
    }

    /// Get the cached pack over every cell variable.
    pub fn pack_all_variables(
        &mut self,
        sparse: Option<&[SparseId]>,
        coarse: bool,
    ) -> &VariablePack {
        let list = self.select_by_flags(&[], true, sparse);
        self.pack_cache.get_or_build(&list, coarse)
    }

    /// Get the cached variable-and-flux pack over two name selections.
    ///
    /// `flux_names` should name flux-carrying variables; the flux half of
    /// the pack indexes their flux buffers.
    ///
    /// # Errors
    ///
    /// [`SelectionError::UnknownVariable`] for a name in either list
    /// matching nothing.
    pub fn pack_variables_and_fluxes_by_name(
        &mut self,
        names: &[&str],
        flux_names: &[&str],
        sparse: Option<&[SparseId]>,
    ) -> Result<&VariableFluxPack, SelectionError> {
        let vars = self.select_by_name(names, sparse)?;
        let fluxes = self.select_by_name(flux_names, sparse)?;
        Ok(self.pack_cache.get_or_build_flux(&vars, &fluxes))
    }

    /// Get the cached variable-and-flux pack over variables carrying all
    /// of `flags`. The flux half covers the subset that carries
    /// `WithFluxes`.
    pub fn pack_variables_and_fluxes_by_flags(
        &mut self,
        flags: &[MetadataFlag],
        sparse: Option<&[SparseId]>,
    ) -> &VariableFluxPack {
        let vars = self.select_by_flags(flags, true, sparse);
        let fluxes = flux_subset(&vars);
        self.pack_cache.get_or_build_flux(&vars, &fluxes)
    }

    /// Get the cached variable-and-flux pack over every cell variable,
    /// with the flux half covering those that carry `WithFluxes`.
    pub fn pack_all_variables_and_fluxes(
        &mut self,
        sparse: Option<&[SparseId]>,
    ) -> &VariableFluxPack {
        let vars = self.select_by_flags(&[], true, sparse);
        let fluxes = flux_subset(&vars);
        self.pack_cache.get_or_build_flux(&vars, &fluxes)
    }

    /// Number of distinct cached packs, across the cell, coarse, and flux
    /// cache maps.
    pub fn cached_pack_count(&self) -> usize {
        self.pack_cache.cell_pack_count()
            + self.pack_cache.coarse_pack_count()
            + self.pack_cache.flux_pack_count()
    }
}

impl fmt::Debug for BlockData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vars: Vec<String> = self
            .cell_vars
            .values()
            .map(|var| {
                let mark = if var.is_allocated() { '+' } else { '-' };
                format!("{}{}", var.label(), mark)
            })
            .collect();
        f.debug_struct("BlockData")
            .field("block", &self.block)
            .field("cell_vars", &vars)
            .field("face_vars", &self.face_vars.len())
            .field("channels", &self.boundaries.len())
            .finish()
    }
}

fn flux_subset(list: &VarList) -> VarList {
    let mut fluxes = VarList::new();
    for var in list.vars() {
        if var.metadata().is_set(MetadataFlag::WithFluxes) {
            fluxes.add(var, None);
        }
    }
    fluxes
}

const _: fn() = || {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<BlockData>();
};
