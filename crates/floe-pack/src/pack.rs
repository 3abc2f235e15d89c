//! Built packs: flat slot views over a variable selection.

use crate::fingerprint::AllocFingerprint;
use crate::list::VarList;
use floe_core::{PackId, VarLabel};
use floe_field::{CellVariable, VarRead, VarWrite};
use indexmap::IndexMap;
use std::sync::Arc;

/// Half-open range of component slots one variable occupies in a pack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotRange {
    /// First slot.
    pub start: usize,
    /// One past the last slot.
    pub end: usize,
}

impl SlotRange {
    /// Number of slots covered.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the range covers no slots.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Lookup from rendered label to slot range.
///
/// Every pack member appears under its full label (`"q_3"`). Sparse pool
/// members additionally widen an entry under their bare base name, so
/// `"q"` resolves to the union of the pool's slots — pool members are
/// packed contiguously in ascending ID order, which makes that union a
/// single dense range.
#[derive(Clone, Debug, Default)]
pub struct PackIndexMap {
    slots: IndexMap<String, SlotRange>,
}

impl PackIndexMap {
    fn insert_or_widen(&mut self, key: String, slots: SlotRange) {
        self.slots
            .entry(key)
            .and_modify(|r| {
                r.start = r.start.min(slots.start);
                r.end = r.end.max(slots.end);
            })
            .or_insert(slots);
    }

    /// The slot range registered under `key`, if any.
    pub fn get(&self, key: &str) -> Option<SlotRange> {
        self.slots.get(key).copied()
    }

    /// Whether `key` is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no keys are registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate `(key, range)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, SlotRange)> + '_ {
        self.slots.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// One pack member: a variable, its slots, and its allocation at build time.
#[derive(Clone, Debug)]
pub struct PackedVar {
    label: VarLabel,
    var: Arc<CellVariable>,
    slots: SlotRange,
    allocated: bool,
}

impl PackedVar {
    fn of(var: &Arc<CellVariable>, slots: SlotRange) -> Self {
        Self {
            label: var.label().clone(),
            var: Arc::clone(var),
            slots,
            allocated: var.is_allocated(),
        }
    }

    /// The member's identity.
    pub fn label(&self) -> &VarLabel {
        &self.label
    }

    /// The underlying variable.
    pub fn var(&self) -> &Arc<CellVariable> {
        &self.var
    }

    /// The member's slot range within the pack.
    pub fn slots(&self) -> SlotRange {
        self.slots
    }

    /// Whether the member was allocated when the pack was built.
    ///
    /// This is the bit the pack's fingerprint recorded; the variable's
    /// live state may have moved on, which is exactly what the cache
    /// detects on the next lookup.
    pub fn allocated_at_build(&self) -> bool {
        self.allocated
    }
}

fn lay_out(list: &VarList) -> (Vec<PackedVar>, PackIndexMap, usize) {
    let mut entries = Vec::with_capacity(list.len());
    let mut index = PackIndexMap::default();
    let mut nslots = 0;
    for var in list.vars() {
        let slots = SlotRange {
            start: nslots,
            end: nslots + var.ncomp(),
        };
        nslots = slots.end;
        index.insert_or_widen(var.label().to_string(), slots);
        if var.label().is_sparse() {
            index.insert_or_widen(var.label().base().to_string(), slots);
        }
        entries.push(PackedVar::of(var, slots));
    }
    (entries, index, nslots)
}

fn bits(entries: &[PackedVar]) -> impl Iterator<Item = bool> + '_ {
    entries.iter().map(|e| e.allocated)
}

/// A flat, indexed bundle over one variable selection.
///
/// A pack is an immutable snapshot of the selection's layout and
/// allocation state. Data access goes through the members' own storage
/// locks, so a cached pack never holds data stale — only its allocation
/// snapshot can go stale, and the cache re-validates that on every hit.
#[derive(Clone, Debug)]
pub struct VariablePack {
    id: PackId,
    coarse: bool,
    entries: Vec<PackedVar>,
    index: PackIndexMap,
    fingerprint: AllocFingerprint,
    nslots: usize,
}

impl VariablePack {
    pub(crate) fn build(list: &VarList, coarse: bool) -> Self {
        let (entries, index, nslots) = lay_out(list);
        let fingerprint = bits(&entries).collect();
        Self {
            id: PackId::next(),
            coarse,
            entries,
            index,
            fingerprint,
            nslots,
        }
    }

    /// Unique ID of this build. Stable across cache hits, fresh on rebuild.
    pub fn id(&self) -> PackId {
        self.id
    }

    /// Whether reads should target the members' coarse mirrors.
    pub fn is_coarse(&self) -> bool {
        self.coarse
    }

    /// Number of member variables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pack has no members.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total component slots across all members.
    pub fn nslots(&self) -> usize {
        self.nslots
    }

    /// Label-to-slots lookup.
    pub fn index(&self) -> &PackIndexMap {
        &self.index
    }

    /// The allocation snapshot taken at build time.
    pub fn fingerprint(&self) -> &AllocFingerprint {
        &self.fingerprint
    }

    /// The members in slot order.
    pub fn entries(&self) -> &[PackedVar] {
        &self.entries
    }

    /// Member `i` in slot order.
    pub fn entry(&self, i: usize) -> &PackedVar {
        &self.entries[i]
    }

    /// Whether member `i` was allocated when the pack was built.
    pub fn is_allocated(&self, i: usize) -> bool {
        self.entries[i].allocated
    }

    /// Read access to member `i`, or `None` while it is deallocated.
    pub fn read(&self, i: usize) -> Option<VarRead<'_>> {
        self.entries[i].var.read()
    }

    /// Write access to member `i`, or `None` while it is deallocated.
    pub fn write(&self, i: usize) -> Option<VarWrite<'_>> {
        self.entries[i].var.write()
    }
}

/// A [`VariablePack`] paired with the flux-carrying subset's flux storage.
///
/// Slot layout and indexing of the data side match a plain pack over the
/// same selection; the flux side gets its own layout and index. The
/// fingerprint covers both sides, data bits first.
#[derive(Clone, Debug)]
pub struct VariableFluxPack {
    id: PackId,
    entries: Vec<PackedVar>,
    flux_entries: Vec<PackedVar>,
    index: PackIndexMap,
    flux_index: PackIndexMap,
    fingerprint: AllocFingerprint,
    nslots: usize,
    flux_nslots: usize,
}

impl VariableFluxPack {
    pub(crate) fn build(vars: &VarList, fluxes: &VarList) -> Self {
        let (entries, index, nslots) = lay_out(vars);
        let (flux_entries, flux_index, flux_nslots) = lay_out(fluxes);
        let fingerprint = bits(&entries).chain(bits(&flux_entries)).collect();
        Self {
            id: PackId::next(),
            entries,
            flux_entries,
            index,
            flux_index,
            fingerprint,
            nslots,
            flux_nslots,
        }
    }

    /// Unique ID of this build. Stable across cache hits, fresh on rebuild.
    pub fn id(&self) -> PackId {
        self.id
    }

    /// Number of data members.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the data side has no members.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of flux-carrying members.
    pub fn flux_len(&self) -> usize {
        self.flux_entries.len()
    }

    /// Total data slots.
    pub fn nslots(&self) -> usize {
        self.nslots
    }

    /// Total flux slots.
    pub fn flux_nslots(&self) -> usize {
        self.flux_nslots
    }

    /// Label-to-slots lookup for the data side.
    pub fn index(&self) -> &PackIndexMap {
        &self.index
    }

    /// Label-to-slots lookup for the flux side.
    pub fn flux_index(&self) -> &PackIndexMap {
        &self.flux_index
    }

    /// The combined allocation snapshot, data bits then flux bits.
    pub fn fingerprint(&self) -> &AllocFingerprint {
        &self.fingerprint
    }

    /// The data members in slot order.
    pub fn entries(&self) -> &[PackedVar] {
        &self.entries
    }

    /// The flux-carrying members in slot order.
    pub fn flux_entries(&self) -> &[PackedVar] {
        &self.flux_entries
    }

    /// Read access to data member `i`, or `None` while it is deallocated.
    pub fn read(&self, i: usize) -> Option<VarRead<'_>> {
        self.entries[i].var.read()
    }

    /// Write access to data member `i`, or `None` while it is deallocated.
    pub fn write(&self, i: usize) -> Option<VarWrite<'_>> {
        self.entries[i].var.write()
    }

    /// Read access to flux member `i`'s storage, or `None` while it is
    /// deallocated. Flux buffers hang off the same storage, so the guard's
    /// flux accessors are what the caller wants here.
    pub fn flux_read(&self, i: usize) -> Option<VarRead<'_>> {
        self.flux_entries[i].var.read()
    }

    /// Write access to flux member `i`'s storage.
    pub fn flux_write(&self, i: usize) -> Option<VarWrite<'_>> {
        self.flux_entries[i].var.write()
    }
}
