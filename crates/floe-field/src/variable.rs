//! Field variables: named storage bound to one block's layout.
//!
//! A [`CellVariable`] owns its cell-centered data behind a lock so that
//! containers sharing the variable (shallow copies, one-copy fields) all
//! observe allocation and deallocation. The allocation flag and storage
//! generation are mirrored in atomics for lock-free queries.

use crate::buffer::Buffer;
use crate::layout::{Axis, BlockLayout, IndexDomain};
use floe_core::{Metadata, MetadataFlag, Real, StorageGeneration, VarLabel};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Everything a cell variable materializes when allocated.
#[derive(Clone, Debug)]
pub(crate) struct VarStorage {
    /// Cell-centered data over the entire domain, ghosts included.
    pub(crate) data: Buffer,
    /// Coarse mirror for exchange across refinement jumps.
    pub(crate) coarse: Option<Buffer>,
    /// Face-area fluxes, one buffer per active axis.
    pub(crate) flux: Option<[Buffer; 3]>,
}

/// A named, cell-centered field variable on one block.
#[derive(Debug)]
pub struct CellVariable {
    label: VarLabel,
    meta: Metadata,
    layout: BlockLayout,
    state: RwLock<Option<VarStorage>>,
    // Mirrors of the locked state, kept for lock-free queries.
    allocated: AtomicBool,
    generation: AtomicU64,
}

impl CellVariable {
    /// Create the variable without allocating storage.
    pub fn new(label: VarLabel, meta: Metadata, layout: BlockLayout) -> Self {
        Self {
            label,
            meta,
            layout,
            state: RwLock::new(None),
            allocated: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// The variable's identity.
    pub fn label(&self) -> &VarLabel {
        &self.label
    }

    /// The metadata the variable was registered with.
    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    /// The block layout the storage is sized for.
    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// Number of components per cell.
    pub fn ncomp(&self) -> usize {
        self.meta.ncomp()
    }

    /// Whether storage is currently materialized.
    pub fn is_allocated(&self) -> bool {
        self.allocated.load(Ordering::Acquire)
    }

    /// Generation counter, bumped on every allocate and deallocate.
    ///
    /// A holder of block-local state derived from the storage (boundary
    /// bindings, packs) records the generation it saw and treats a later
    /// mismatch as a reallocation.
    pub fn storage_generation(&self) -> StorageGeneration {
        StorageGeneration(self.generation.load(Ordering::Acquire))
    }

    fn buffer_extents(&self) -> (usize, usize, usize) {
        (
            self.layout.extent(Axis::X3, IndexDomain::Entire),
            self.layout.extent(Axis::X2, IndexDomain::Entire),
            self.layout.extent(Axis::X1, IndexDomain::Entire),
        )
    }

    /// Materialize storage filled with the metadata's default value.
    ///
    /// Allocating an already-allocated variable is a no-op. Each fresh
    /// allocation bumps the storage generation.
    pub fn allocate(&self) {
        let mut state = self.state.write().unwrap();
        if state.is_some() {
            return;
        }
        let ncomp = self.meta.ncomp();
        let (n3, n2, n1) = self.buffer_extents();
        let data = Buffer::filled(ncomp, n3, n2, n1, self.meta.default_value());
        let coarse = self.layout.coarse().map(|c| {
            Buffer::filled(
                ncomp,
                c.extent(Axis::X3, IndexDomain::Entire),
                c.extent(Axis::X2, IndexDomain::Entire),
                c.extent(Axis::X1, IndexDomain::Entire),
                self.meta.default_value(),
            )
        });
        let flux = if self.meta.is_set(MetadataFlag::WithFluxes) {
            Some([
                self.flux_buffer(Axis::X1),
                self.flux_buffer(Axis::X2),
                self.flux_buffer(Axis::X3),
            ])
        } else {
            None
        };
        *state = Some(VarStorage { data, coarse, flux });
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.allocated.store(true, Ordering::Release);
    }

    fn flux_buffer(&self, axis: Axis) -> Buffer {
        let (mut n3, mut n2, mut n1) = self.buffer_extents();
        if self.layout.is_active(axis) {
            match axis {
                Axis::X1 => n1 += 1,
                Axis::X2 => n2 += 1,
                Axis::X3 => n3 += 1,
            }
        }
        Buffer::zeros(self.meta.ncomp(), n3, n2, n1)
    }

    /// Drop storage. The allocation mirror flips before the lock releases.
    pub fn deallocate(&self) {
        let mut state = self.state.write().unwrap();
        if state.is_none() {
            return;
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.allocated.store(false, Ordering::Release);
        *state = None;
    }

    /// Read access to the storage, or `None` while deallocated.
    pub fn read(&self) -> Option<VarRead<'_>> {
        let guard = self.state.read().unwrap();
        if guard.is_none() {
            return None;
        }
        Some(VarRead { guard })
    }

    /// Write access to the storage, or `None` while deallocated.
    pub fn write(&self) -> Option<VarWrite<'_>> {
        let guard = self.state.write().unwrap();
        if guard.is_none() {
            return None;
        }
        Some(VarWrite { guard })
    }

    /// A new variable with the same identity and a cloned copy of the data.
    pub fn deep_copy(&self) -> Self {
        let state = self.state.read().unwrap();
        Self {
            label: self.label.clone(),
            meta: self.meta.clone(),
            layout: self.layout,
            allocated: AtomicBool::new(state.is_some()),
            generation: AtomicU64::new(self.generation.load(Ordering::Acquire)),
            state: RwLock::new(state.clone()),
        }
    }
}

/// Shared read guard over an allocated variable's storage.
pub struct VarRead<'a> {
    guard: RwLockReadGuard<'a, Option<VarStorage>>,
}

impl VarRead<'_> {
    fn storage(&self) -> &VarStorage {
        self.guard.as_ref().expect("guard holds storage")
    }

    /// The cell-centered data.
    pub fn data(&self) -> &Buffer {
        &self.storage().data
    }

    /// The coarse mirror, present only on multilevel layouts.
    pub fn coarse(&self) -> Option<&Buffer> {
        self.storage().coarse.as_ref()
    }

    /// The flux buffer for faces normal to `axis`, if fluxes exist.
    pub fn flux(&self, axis: Axis) -> Option<&Buffer> {
        self.storage().flux.as_ref().map(|f| &f[axis.index()])
    }
}

/// Exclusive write guard over an allocated variable's storage.
pub struct VarWrite<'a> {
    guard: RwLockWriteGuard<'a, Option<VarStorage>>,
}

impl VarWrite<'_> {
    fn storage(&mut self) -> &mut VarStorage {
        self.guard.as_mut().expect("guard holds storage")
    }

    /// The cell-centered data.
    pub fn data(&mut self) -> &mut Buffer {
        &mut self.storage().data
    }

    /// The coarse mirror, present only on multilevel layouts.
    pub fn coarse(&mut self) -> Option<&mut Buffer> {
        self.storage().coarse.as_mut()
    }

    /// The flux buffer for faces normal to `axis`, if fluxes exist.
    pub fn flux(&mut self, axis: Axis) -> Option<&mut Buffer> {
        self.storage().flux.as_mut().map(|f| &mut f[axis.index()])
    }
}

/// A named, face-centered field variable on one block.
///
/// Face fields are always one-copy and always allocated; each active axis
/// gets one extra layer of faces along itself.
#[derive(Debug)]
pub struct FaceVariable {
    label: VarLabel,
    meta: Metadata,
    layout: BlockLayout,
    faces: RwLock<[Buffer; 3]>,
}

impl FaceVariable {
    /// Create the variable with all three face buffers allocated.
    pub fn new(label: VarLabel, meta: Metadata, layout: BlockLayout) -> Self {
        let make = |axis: Axis| {
            let extent = |a: Axis| {
                let mut n = layout.extent(a, IndexDomain::Entire);
                if a == axis && layout.is_active(a) {
                    n += 1;
                }
                n
            };
            Buffer::filled(
                meta.ncomp(),
                extent(Axis::X3),
                extent(Axis::X2),
                extent(Axis::X1),
                meta.default_value(),
            )
        };
        let faces = [make(Axis::X1), make(Axis::X2), make(Axis::X3)];
        Self {
            label,
            meta,
            layout,
            faces: RwLock::new(faces),
        }
    }

    /// The variable's identity.
    pub fn label(&self) -> &VarLabel {
        &self.label
    }

    /// The metadata the variable was registered with.
    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    /// The block layout the storage is sized for.
    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// Read access to the face buffers.
    pub fn read(&self) -> FaceRead<'_> {
        FaceRead {
            guard: self.faces.read().unwrap(),
        }
    }

    /// Write access to the face buffers.
    pub fn write(&self) -> FaceWrite<'_> {
        FaceWrite {
            guard: self.faces.write().unwrap(),
        }
    }
}

/// Shared read guard over a face variable's buffers.
pub struct FaceRead<'a> {
    guard: RwLockReadGuard<'a, [Buffer; 3]>,
}

impl FaceRead<'_> {
    /// The buffer of faces normal to `axis`.
    pub fn face(&self, axis: Axis) -> &Buffer {
        &self.guard[axis.index()]
    }
}

/// Exclusive write guard over a face variable's buffers.
pub struct FaceWrite<'a> {
    guard: RwLockWriteGuard<'a, [Buffer; 3]>,
}

impl FaceWrite<'_> {
    /// The buffer of faces normal to `axis`.
    pub fn face(&mut self, axis: Axis) -> &mut Buffer {
        &mut self.guard[axis.index()]
    }
}

const _: fn() = || {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<CellVariable>();
    assert_send_sync::<FaceVariable>();
};
