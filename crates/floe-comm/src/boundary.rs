//! The per-variable protocol driver.
//!
//! A [`BoundaryVariable`] bundles every channel one ghost-filled variable
//! needs — a ghost channel per neighbor, plus flux channels across
//! refinement interfaces when the variable carries fluxes — and drives
//! them through an exchange cycle: start, send, poll to completion,
//! clear. The block container owns one per ghost-filled variable and
//! fans the protocol operations out over them.
//!
//! Two cross-cutting rules live here:
//!
//! - **Allocation skips.** A local pair moves a message only when both
//!   ends are allocated; the sync-agreed neighbor mirror makes the two
//!   ends decide identically without negotiating. Remote senders cannot
//!   consult the receiver, so an unallocated remote sender ships a
//!   data-free message instead, and the receiver applies the same
//!   default-fill rule it uses for a skipped local sender.
//! - **Binding checks.** The storage generation recorded at the start of
//!   the cycle must still be live when data moves. A mismatch means the
//!   variable was reallocated mid-cycle without a rebind, and the
//!   operation fails rather than touch stale storage.

use crate::channel::BoundaryChannel;
use crate::slab::{
    flux_half_plane_slab, flux_plane_slab, flux_restriction, ghost_half_slab, ghost_restriction,
    ghost_slab, half_source_slab, interior_slab, restrict, restricted_source_slab,
};
use crate::topology::{Neighbor, Topology};
use crate::transport::{BoundaryMessage, ChannelKind, ChannelTag, Transport};
use floe_core::{BlockId, BoundaryError, MetadataFlag, RankId, StorageGeneration};
use floe_field::CellVariable;
use log::debug;
use std::sync::Arc;

/// Which channel subset an exchange cycle drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExchangePhase {
    /// Initial mesh construction: ghost channels only, no fluxes exist
    /// yet.
    MeshInit,
    /// Regular evolution: ghost and flux channels.
    All,
}

impl ExchangePhase {
    /// Whether flux channels take part in this phase's cycles.
    pub fn includes_flux(self) -> bool {
        matches!(self, Self::All)
    }
}

/// All exchange state for one ghost-filled variable on one block.
///
/// Ghost channels exist for every neighbor. Flux channels exist only for
/// variables flagged [`WithFluxes`](MetadataFlag::WithFluxes) and only
/// across refinement jumps: the finer block sends toward its coarser
/// neighbor, the coarser block receives from each finer one.
#[derive(Debug)]
pub struct BoundaryVariable {
    block: BlockId,
    var: Arc<CellVariable>,
    ghost: Vec<BoundaryChannel>,
    flux: Vec<BoundaryChannel>,
    bound_generation: StorageGeneration,
    ghost_complete: bool,
    flux_complete: bool,
}

impl BoundaryVariable {
    /// Build the channel set for `var` on `block` from its neighbor list.
    ///
    /// Tags are derived from (src, dst, label, kind), so the peer block
    /// building its own set arrives at the same tags without a handshake.
    /// The storage generation binds to the live one; [`start`](Self::start)
    /// rebinds at every cycle.
    pub fn new(
        block: BlockId,
        var: Arc<CellVariable>,
        neighbors: &[Neighbor],
        local_rank: RankId,
    ) -> Self {
        let label = var.label().clone();
        let with_fluxes = var.metadata().is_set(MetadataFlag::WithFluxes);
        let mut ghost = Vec::with_capacity(neighbors.len());
        let mut flux = Vec::new();
        for n in neighbors {
            let local = n.rank == local_rank;
            let send = ChannelTag {
                src: block,
                dst: n.block,
                var: label.clone(),
                kind: ChannelKind::Ghost,
            };
            let recv = ChannelTag {
                src: n.block,
                dst: block,
                var: label.clone(),
                kind: ChannelKind::Ghost,
            };
            ghost.push(BoundaryChannel::new(
                n.clone(),
                ChannelKind::Ghost,
                Some(send),
                Some(recv),
                local,
            ));
            if with_fluxes && n.is_coarser() {
                let tag = ChannelTag {
                    src: block,
                    dst: n.block,
                    var: label.clone(),
                    kind: ChannelKind::Flux,
                };
                flux.push(BoundaryChannel::new(
                    n.clone(),
                    ChannelKind::Flux,
                    Some(tag),
                    None,
                    local,
                ));
            }
            if with_fluxes && n.is_finer() {
                let tag = ChannelTag {
                    src: n.block,
                    dst: block,
                    var: label.clone(),
                    kind: ChannelKind::Flux,
                };
                flux.push(BoundaryChannel::new(
                    n.clone(),
                    ChannelKind::Flux,
                    None,
                    Some(tag),
                    local,
                ));
            }
        }
        let bound_generation = var.storage_generation();
        Self {
            block,
            var,
            ghost,
            flux,
            bound_generation,
            ghost_complete: false,
            flux_complete: false,
        }
    }

    /// Open every channel's tags on `transport`.
    ///
    /// # Errors
    ///
    /// [`BoundaryError::Transport`] if a route cannot be set up; fatal,
    /// not retried.
    pub fn open(&self, transport: &dyn Transport) -> Result<(), BoundaryError> {
        for ch in self.ghost.iter().chain(&self.flux) {
            ch.open(transport)?;
        }
        Ok(())
    }

    /// The block this end belongs to.
    pub fn block(&self) -> BlockId {
        self.block
    }

    /// The variable being exchanged.
    pub fn var(&self) -> &Arc<CellVariable> {
        &self.var
    }

    /// Ghost channels, one per neighbor, in the neighbor-list order the
    /// set was built from.
    pub fn ghost_channels(&self) -> &[BoundaryChannel] {
        &self.ghost
    }

    /// Flux channels across refinement jumps; empty for variables
    /// without fluxes.
    pub fn flux_channels(&self) -> &[BoundaryChannel] {
        &self.flux
    }

    /// The storage generation this cycle is bound to.
    pub fn bound_generation(&self) -> StorageGeneration {
        self.bound_generation
    }

    /// Whether every ghost channel finished the current cycle.
    pub fn ghost_complete(&self) -> bool {
        self.ghost_complete
    }

    /// Whether every flux-receive channel finished the current cycle.
    pub fn flux_complete(&self) -> bool {
        self.flux_complete
    }

    /// Re-record the live storage generation as the bound one.
    ///
    /// Required after an allocate or deallocate that happens inside an
    /// open cycle; without it the next exchange operation fails the
    /// binding check.
    pub fn rebind(&mut self) {
        self.bound_generation = self.var.storage_generation();
    }

    /// Refresh the neighbor-allocation mirror of every local channel
    /// from the topology's published snapshots.
    ///
    /// An unpublished local neighbor counts as having nothing allocated.
    /// Remote channels keep their mirrors untouched; the skip rule never
    /// consults them.
    pub fn sync_local_allocation(&mut self, topology: &dyn Topology) {
        for ch in self.ghost.iter_mut().chain(self.flux.iter_mut()) {
            if !ch.is_local() {
                continue;
            }
            let allocated = topology
                .allocation_snapshot(ch.neighbor().block)
                .is_some_and(|snap| snap.is_allocated(self.var.label()));
            ch.set_neighbor_allocated(allocated);
        }
    }

    /// Open the next cycle on the phase's channel subset: rebind the
    /// storage generation, advance every cycle counter, and drop the
    /// completion flags.
    ///
    /// # Errors
    ///
    /// [`BoundaryError::OutOfOrder`] if a channel is mid-cycle; the
    /// previous cycle must be cleared first.
    pub fn start(&mut self, phase: ExchangePhase) -> Result<(), BoundaryError> {
        self.bound_generation = self.var.storage_generation();
        let allocated = self.var.is_allocated();
        for ch in &mut self.ghost {
            let expecting = !ch.is_local() || (allocated && ch.neighbor_allocated());
            ch.start(expecting)?;
        }
        self.ghost_complete = false;
        if phase.includes_flux() {
            for ch in &mut self.flux {
                let expecting = !ch.is_local() || (allocated && ch.neighbor_allocated());
                ch.start(expecting)?;
            }
            self.flux_complete = false;
        }
        Ok(())
    }

    /// Post this cycle's ghost payload to every neighbor.
    ///
    /// Same-level neighbors get the interior border band; a coarser
    /// neighbor gets that band 2:1-restricted; a finer neighbor gets the
    /// half-face band at native resolution, destined for its coarse
    /// mirror. Local pairs with an unallocated end skip entirely; an
    /// unallocated sender on a remote pair posts a data-free message.
    /// Re-sending within a cycle is a no-op per channel.
    ///
    /// # Errors
    ///
    /// [`BoundaryError::StaleBinding`] on a generation mismatch,
    /// [`BoundaryError::OutOfOrder`] outside an open cycle, or
    /// [`BoundaryError::Transport`] if a post fails.
    pub fn send_ghost(&mut self, transport: &dyn Transport) -> Result<(), BoundaryError> {
        self.check_binding()?;
        let layout = self.var.layout();
        let ncomp = self.var.ncomp();
        let read = self.var.read();
        let allocated = read.is_some();
        for ch in &mut self.ghost {
            if ch.send_done() {
                continue;
            }
            if ch.is_local() && !(allocated && ch.neighbor_allocated()) {
                ch.skip_send()?;
                continue;
            }
            let Some(read) = &read else {
                ch.post_send(transport, false, Vec::new())?;
                continue;
            };
            let n = ch.neighbor().clone();
            let data = if n.is_coarser() {
                restrict(
                    read.data(),
                    &restricted_source_slab(layout, n.face, ncomp),
                    ghost_restriction(layout),
                )
            } else if n.is_finer() {
                read.data()
                    .extract(&half_source_slab(layout, n.face, n.offset, ncomp))
            } else {
                read.data().extract(&interior_slab(layout, n.face, ncomp))
            };
            ch.post_send(transport, true, data)?;
        }
        Ok(())
    }

    /// Poll every incomplete ghost channel once and apply what arrived.
    ///
    /// Returns whether the variable's ghost cycle is now complete.
    /// Payloads land in the ghost band (same level), the coarse mirror's
    /// ghost band (from a coarser neighbor), or the half ghost band at
    /// the neighbor's offset (from a finer one). A skipped or
    /// unallocated sender default-fills the same window when this end is
    /// allocated; an unallocated receiver discards payloads unread.
    ///
    /// # Errors
    ///
    /// [`BoundaryError::StaleBinding`] on a generation mismatch,
    /// [`BoundaryError::OutOfOrder`] outside an open cycle,
    /// [`BoundaryError::CoarseStorageMissing`] if a coarser neighbor
    /// exists without coarse storage, or [`BoundaryError::Transport`].
    pub fn receive_ghost(&mut self, transport: &dyn Transport) -> Result<bool, BoundaryError> {
        if self.ghost_complete {
            return Ok(true);
        }
        self.check_binding()?;
        let allocated = self.var.is_allocated();
        let mut all = true;
        for ch in &mut self.ghost {
            if ch.is_complete() {
                continue;
            }
            if ch.is_local() && !(allocated && ch.neighbor_allocated()) {
                if allocated {
                    default_fill(&self.var, ch.neighbor())?;
                }
                ch.mark_complete()?;
                continue;
            }
            match ch.poll(transport)? {
                None => all = false,
                Some(message) => {
                    apply_ghost(&self.var, ch.neighbor(), message)?;
                    ch.mark_complete()?;
                }
            }
        }
        self.ghost_complete = all;
        Ok(all)
    }

    /// Post the restricted flux plane toward every coarser neighbor.
    ///
    /// The plane of boundary faces shared with the coarser neighbor is
    /// restricted 2:1 across the transverse axes and posted; allocation
    /// skips work as for ghosts. No-op for variables without flux
    /// channels.
    ///
    /// # Errors
    ///
    /// As for [`send_ghost`](Self::send_ghost).
    pub fn send_flux(&mut self, transport: &dyn Transport) -> Result<(), BoundaryError> {
        self.check_binding()?;
        let layout = self.var.layout();
        let ncomp = self.var.ncomp();
        let read = self.var.read();
        let allocated = read.is_some();
        for ch in self.flux.iter_mut().filter(|c| c.sends()) {
            if ch.send_done() {
                continue;
            }
            if ch.is_local() && !(allocated && ch.neighbor_allocated()) {
                ch.skip_send()?;
                continue;
            }
            let flux = read.as_ref().and_then(|r| r.flux(ch.neighbor().face.axis()));
            let Some(flux) = flux else {
                ch.post_send(transport, false, Vec::new())?;
                continue;
            };
            let face = ch.neighbor().face;
            let data = restrict(
                flux,
                &flux_plane_slab(layout, face, ncomp),
                flux_restriction(layout, face),
            );
            ch.post_send(transport, true, data)?;
        }
        Ok(())
    }

    /// Poll every incomplete flux channel from finer neighbors once.
    ///
    /// Returns whether the variable's flux cycle is now complete. An
    /// arrived correction overwrites the half flux plane at the
    /// neighbor's offset. There is no default-fill for fluxes: when the
    /// finer side has nothing, this block's own fluxes stand.
    ///
    /// # Errors
    ///
    /// As for [`receive_ghost`](Self::receive_ghost), minus the coarse
    /// storage case.
    pub fn receive_flux(&mut self, transport: &dyn Transport) -> Result<bool, BoundaryError> {
        if self.flux_complete {
            return Ok(true);
        }
        self.check_binding()?;
        let allocated = self.var.is_allocated();
        let mut all = true;
        for ch in self.flux.iter_mut().filter(|c| c.receives()) {
            if ch.is_complete() {
                continue;
            }
            if ch.is_local() && !(allocated && ch.neighbor_allocated()) {
                ch.mark_complete()?;
                continue;
            }
            match ch.poll(transport)? {
                None => all = false,
                Some(message) => {
                    apply_flux(&self.var, ch.neighbor(), message);
                    ch.mark_complete()?;
                }
            }
        }
        self.flux_complete = all;
        Ok(all)
    }

    /// Close the cycle on the phase's channel subset: drain leftovers,
    /// keep ahead-of-cycle stashes, return channels to idle. Safe
    /// whether or not the cycle completed.
    ///
    /// # Errors
    ///
    /// [`BoundaryError::Transport`] if the transport fails while
    /// draining.
    pub fn clear(
        &mut self,
        phase: ExchangePhase,
        transport: &dyn Transport,
    ) -> Result<(), BoundaryError> {
        for ch in &mut self.ghost {
            ch.clear(transport)?;
        }
        if phase.includes_flux() {
            for ch in &mut self.flux {
                ch.clear(transport)?;
            }
        }
        Ok(())
    }

    fn check_binding(&self) -> Result<(), BoundaryError> {
        if self.var.storage_generation() != self.bound_generation {
            return Err(BoundaryError::StaleBinding {
                label: self.var.label().to_string(),
            });
        }
        Ok(())
    }
}

fn coarse_missing(var: &CellVariable) -> BoundaryError {
    BoundaryError::CoarseStorageMissing {
        label: var.label().to_string(),
    }
}

/// Fill the window `neighbor`'s data would have landed in with the
/// variable's default value. No-op while deallocated.
fn default_fill(var: &CellVariable, neighbor: &Neighbor) -> Result<(), BoundaryError> {
    let layout = var.layout();
    let ncomp = var.ncomp();
    let value = var.metadata().default_value();
    let Some(mut write) = var.write() else {
        return Ok(());
    };
    debug!(
        "{}: neighbor b{} unallocated, filling ghosts with default {value}",
        var.label(),
        neighbor.block
    );
    if neighbor.is_coarser() {
        let coarse_layout = layout.coarse().ok_or_else(|| coarse_missing(var))?;
        let slab = ghost_slab(&coarse_layout, neighbor.face, ncomp);
        let coarse = write.coarse().ok_or_else(|| coarse_missing(var))?;
        coarse.fill_slab(&slab, value);
    } else if neighbor.is_finer() {
        let slab = ghost_half_slab(layout, neighbor.face, neighbor.offset, ncomp);
        write.data().fill_slab(&slab, value);
    } else {
        let slab = ghost_slab(layout, neighbor.face, ncomp);
        write.data().fill_slab(&slab, value);
    }
    Ok(())
}

/// Land one arrived ghost payload in the window `neighbor` maps to.
fn apply_ghost(
    var: &CellVariable,
    neighbor: &Neighbor,
    message: BoundaryMessage,
) -> Result<(), BoundaryError> {
    if !var.is_allocated() {
        return Ok(());
    }
    if !message.allocated {
        return default_fill(var, neighbor);
    }
    let layout = var.layout();
    let ncomp = var.ncomp();
    let Some(mut write) = var.write() else {
        return Ok(());
    };
    if neighbor.is_coarser() {
        let coarse_layout = layout.coarse().ok_or_else(|| coarse_missing(var))?;
        let slab = ghost_slab(&coarse_layout, neighbor.face, ncomp);
        let coarse = write.coarse().ok_or_else(|| coarse_missing(var))?;
        coarse.insert(&slab, &message.data);
    } else if neighbor.is_finer() {
        let slab = ghost_half_slab(layout, neighbor.face, neighbor.offset, ncomp);
        write.data().insert(&slab, &message.data);
    } else {
        let slab = ghost_slab(layout, neighbor.face, ncomp);
        write.data().insert(&slab, &message.data);
    }
    Ok(())
}

/// Overwrite the half flux plane under `neighbor` with its restricted
/// correction. Discarded when either end is unallocated.
fn apply_flux(var: &CellVariable, neighbor: &Neighbor, message: BoundaryMessage) {
    if !message.allocated {
        return;
    }
    let slab = flux_half_plane_slab(var.layout(), neighbor.face, neighbor.offset, var.ncomp());
    let Some(mut write) = var.write() else {
        return;
    };
    if let Some(flux) = write.flux(neighbor.face.axis()) {
        flux.insert(&slab, &message.data);
    }
}
