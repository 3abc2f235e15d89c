//! Pack memoization with allocation-fingerprint invalidation.
//!
//! [`PackCache`] keys packs by their selection's label sequence and lazily
//! builds on first use. Subsequent lookups return the cached pack as long
//! as the selection's current [`AllocFingerprint`] matches the one the
//! pack was built under; otherwise the stale pack is discarded and a fresh
//! one built in place. Cached packs are never patched up — allocation
//! changed, so slot validity changed, and a rebuild is the only safe move.
//!
//! The cache does **not** key on storage generation, because generations
//! bump on every allocate and deallocate of any member and carry no layout
//! information beyond what the fingerprint already captures.

use crate::fingerprint::AllocFingerprint;
use crate::list::VarList;
use crate::pack::{VariableFluxPack, VariablePack};
use floe_core::VarLabel;
use indexmap::IndexMap;

type PackKey = Vec<VarLabel>;
type FluxKey = (Vec<VarLabel>, Vec<VarLabel>);

/// Memoized packs for one container.
///
/// Cell-domain packs, coarse-mirror packs, and flux packs are cached
/// independently: the same selection can be packed against cell data and
/// coarse data at once, and the two invalidate separately.
///
/// # Invalidation
///
/// A cached pack is discarded and rebuilt when:
/// - the selection has never been packed,
/// - any member's allocation state differs from the cached fingerprint,
/// - [`purge`](Self::purge) dropped it because a member was removed.
///
/// A cached pack is **not** rebuilt when member data changes — packs hold
/// no data, only layout, so per-stage writes leave them valid.
#[derive(Debug, Default)]
pub struct PackCache {
    cell_packs: IndexMap<PackKey, VariablePack>,
    coarse_packs: IndexMap<PackKey, VariablePack>,
    flux_packs: IndexMap<FluxKey, VariableFluxPack>,
}

impl PackCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the pack for `list`, rebuilding if absent or stale.
    ///
    /// `coarse` selects the coarse-mirror cache; the same label sequence
    /// may be cached in both at once.
    pub fn get_or_build(&mut self, list: &VarList, coarse: bool) -> &VariablePack {
        let key = list.labels();
        let current = list.fingerprint();
        let map = if coarse {
            &mut self.coarse_packs
        } else {
            &mut self.cell_packs
        };

        let stale = match map.get(&key) {
            None => true,
            Some(pack) => pack.fingerprint() != &current,
        };
        if stale {
            map.insert(key.clone(), VariablePack::build(list, coarse));
        }
        map.get(&key).unwrap()
    }

    /// Get the flux pack for `(vars, fluxes)`, rebuilding if absent or stale.
    pub fn get_or_build_flux(
        &mut self,
        vars: &VarList,
        fluxes: &VarList,
    ) -> &VariableFluxPack {
        let key = (vars.labels(), fluxes.labels());
        let current: AllocFingerprint = vars
            .fingerprint()
            .iter()
            .chain(fluxes.fingerprint().iter())
            .collect();

        let stale = match self.flux_packs.get(&key) {
            None => true,
            Some(pack) => pack.fingerprint() != &current,
        };
        if stale {
            self.flux_packs
                .insert(key.clone(), VariableFluxPack::build(vars, fluxes));
        }
        self.flux_packs.get(&key).unwrap()
    }

    /// Drop every cached pack whose selection contains `label`.
    ///
    /// Called when a variable is removed from the registry; packs over
    /// selections that never included it stay cached.
    pub fn purge(&mut self, label: &VarLabel) {
        self.cell_packs.retain(|key, _| !key.contains(label));
        self.coarse_packs.retain(|key, _| !key.contains(label));
        self.flux_packs
            .retain(|(vars, fluxes), _| !vars.contains(label) && !fluxes.contains(label));
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.cell_packs.clear();
        self.coarse_packs.clear();
        self.flux_packs.clear();
    }

    /// Number of cached cell-domain packs.
    pub fn cell_pack_count(&self) -> usize {
        self.cell_packs.len()
    }

    /// Number of cached coarse-mirror packs.
    pub fn coarse_pack_count(&self) -> usize {
        self.coarse_packs.len()
    }

    /// Number of cached flux packs.
    pub fn flux_pack_count(&self) -> usize {
        self.flux_packs.len()
    }
}
