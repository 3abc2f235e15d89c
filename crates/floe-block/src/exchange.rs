//! The container half of the boundary-exchange protocol.
//!
//! [`BlockData`] owns one [`BoundaryVariable`] per ghost-carrying cell
//! variable, built once against a [`Topology`] and reused every cycle.
//! The methods here are the task-granular surface a scheduler drives:
//! each returns [`TaskStatus`] so an incomplete receive parks the task
//! instead of blocking a thread, and the scheduler re-polls until every
//! channel reports complete. Fatal conditions come back as
//! [`BoundaryError`]s, never as `Incomplete`.
//!
//! The cycle is: `start_receiving`, `send_boundary_buffers`, poll
//! `receive_boundary_buffers` (with the flux pair in between when the
//! phase carries fluxes), then `clear_boundary`. Calls outside that
//! order fail with [`BoundaryError::OutOfOrder`] from the channel layer.

use std::sync::Arc;

use floe_comm::{AllocationSnapshot, BoundaryVariable, ExchangePhase, Face, Topology, Transport};
use floe_core::{BoundaryError, MetadataFlag, TaskStatus};
use floe_field::CellVariable;
use log::debug;

use crate::data::BlockData;

/// Fills ghost regions adjacent to coarser neighbors by interpolating
/// from the coarse-mirror buffer, after a receive cycle has landed the
/// restricted coarse data there.
///
/// Interpolation stencils are a discretization choice, so the container
/// only drives the seam; implementations live with the numerics.
pub trait Prolongator {
    /// Interpolate the ghost region behind `face` of `var` from its
    /// coarse mirror.
    ///
    /// # Errors
    ///
    /// [`BoundaryError::Prolongation`] on a stencil failure, or
    /// [`BoundaryError::CoarseStorageMissing`] when the variable has no
    /// coarse mirror to interpolate from.
    fn prolongate(&self, var: &CellVariable, face: Face) -> Result<(), BoundaryError>;
}

impl BlockData {
    /// Labels of every currently allocated cell variable, for publishing
    /// to a [`Topology`] so local neighbors can agree on skips.
    pub fn allocation_snapshot(&self) -> AllocationSnapshot {
        AllocationSnapshot::from_labels(
            self.cell_variables()
                .filter(|var| var.is_allocated())
                .map(|var| var.label().clone()),
        )
    }

    /// Build and open persistent channels for every ghost-carrying cell
    /// variable, replacing any previous setup.
    ///
    /// Runs once per topology change, not per cycle. Channel tags are
    /// derived from `(block, neighbor, variable, kind)` on both ends, so
    /// no handshake crosses the transport.
    ///
    /// # Errors
    ///
    /// [`BoundaryError::Transport`] when the transport cannot open a
    /// queue. That leaves the container without usable channels, so the
    /// caller should treat it as fatal rather than retry.
    pub fn setup_persistent_channels(
        &mut self,
        topology: &dyn Topology,
        transport: Arc<dyn Transport>,
    ) -> Result<TaskStatus, BoundaryError> {
        let neighbors = topology.neighbors(self.block());
        let local_rank = topology.local_rank();
        self.boundaries.clear();
        self.transport = None;

        let ghost_vars: Vec<Arc<CellVariable>> = self
            .cell_variables()
            .filter(|var| var.metadata().is_set(MetadataFlag::FillGhost))
            .cloned()
            .collect();
        for var in ghost_vars {
            let boundary =
                BoundaryVariable::new(self.block(), Arc::clone(&var), &neighbors, local_rank);
            boundary.open(transport.as_ref())?;
            self.boundaries.insert(var.label().clone(), boundary);
        }
        debug!(
            "block b{}: opened channels for {} ghost variables across {} neighbors",
            self.block(),
            self.boundaries.len(),
            neighbors.len()
        );
        self.transport = Some(transport);
        Ok(TaskStatus::Complete)
    }

    /// Refresh every local channel's view of what its neighbor has
    /// allocated, from the topology's published snapshots.
    ///
    /// Local pairs skip messages entirely unless both ends are
    /// allocated, and both ends must make that call from the same data.
    /// Runs inside [`start_receiving`](Self::start_receiving); exposed
    /// for drivers that re-publish snapshots mid-cycle setup.
    pub fn sync_local_neighbor_allocation(&mut self, topology: &dyn Topology) {
        for boundary in self.boundaries.values_mut() {
            boundary.sync_local_allocation(topology);
        }
    }

    /// Open a new exchange cycle on the phase's channel subset.
    ///
    /// Re-binds each variable's storage generation and syncs local
    /// allocation views first, so the decisions of this cycle are made
    /// against current state.
    ///
    /// # Errors
    ///
    /// [`BoundaryError::SetupMissing`] when a ghost-carrying variable has
    /// no channels, [`BoundaryError::OutOfOrder`] when the previous
    /// cycle was never cleared.
    pub fn start_receiving(
        &mut self,
        phase: ExchangePhase,
        topology: &dyn Topology,
    ) -> Result<TaskStatus, BoundaryError> {
        self.check_setup()?;
        self.sync_local_neighbor_allocation(topology);
        for boundary in self.boundaries.values_mut() {
            boundary.start(phase)?;
        }
        Ok(TaskStatus::Complete)
    }

    /// Post this block's ghost data to every neighbor. Never blocks and
    /// never waits for receivers; posting is complete when the loop ends.
    ///
    /// Unallocated senders post allocation notices instead of data, and
    /// local pairs with an unallocated end post nothing at all.
    ///
    /// # Errors
    ///
    /// Setup, ordering, stale-binding, or transport failures.
    pub fn send_boundary_buffers(&mut self) -> Result<TaskStatus, BoundaryError> {
        self.check_setup()?;
        let Some(transport) = &self.transport else {
            return Ok(TaskStatus::Complete);
        };
        for boundary in self.boundaries.values_mut() {
            boundary.send_ghost(transport.as_ref())?;
        }
        Ok(TaskStatus::Complete)
    }

    /// Poll for ghost data from every neighbor and apply what arrived.
    ///
    /// `Complete` only when every channel of every variable has taken
    /// its message this cycle; otherwise `Incomplete`, and the caller
    /// polls again later. Progress is kept per channel, so re-polling
    /// only touches what is still missing.
    ///
    /// # Errors
    ///
    /// Setup, ordering, stale-binding, or transport failures.
    pub fn receive_boundary_buffers(&mut self) -> Result<TaskStatus, BoundaryError> {
        self.check_setup()?;
        let Some(transport) = &self.transport else {
            return Ok(TaskStatus::Complete);
        };
        let mut done = true;
        for boundary in self.boundaries.values_mut() {
            done &= boundary.receive_ghost(transport.as_ref())?;
        }
        Ok(TaskStatus::complete_if(done))
    }

    /// Post restricted flux-plane data toward coarser neighbors.
    ///
    /// Only variables carrying both `WithFluxes` and `FillGhost` have
    /// flux channels; for everything else this is a no-op that still
    /// reports `Complete`.
    ///
    /// # Errors
    ///
    /// Setup, ordering, stale-binding, or transport failures. Calling
    /// this in a [`ExchangePhase::MeshInit`] cycle is an ordering error.
    pub fn send_flux_correction(&mut self) -> Result<TaskStatus, BoundaryError> {
        self.check_setup()?;
        let Some(transport) = &self.transport else {
            return Ok(TaskStatus::Complete);
        };
        for boundary in self.boundaries.values_mut() {
            boundary.send_flux(transport.as_ref())?;
        }
        Ok(TaskStatus::Complete)
    }

    /// Poll for flux corrections from finer neighbors and overwrite the
    /// matching flux planes. Unallocated partners contribute nothing;
    /// this block then keeps its own coarse fluxes.
    ///
    /// # Errors
    ///
    /// Setup, ordering, stale-binding, or transport failures.
    pub fn receive_flux_correction(&mut self) -> Result<TaskStatus, BoundaryError> {
        self.check_setup()?;
        let Some(transport) = &self.transport else {
            return Ok(TaskStatus::Complete);
        };
        let mut done = true;
        for boundary in self.boundaries.values_mut() {
            done &= boundary.receive_flux(transport.as_ref())?;
        }
        Ok(TaskStatus::complete_if(done))
    }

    /// Close the cycle on the phase's channel subset and return the
    /// channels to idle. Safe whether or not the cycle completed, and
    /// messages for future cycles are kept.
    ///
    /// # Errors
    ///
    /// [`BoundaryError::Transport`] if draining leftovers fails.
    pub fn clear_boundary(&mut self, phase: ExchangePhase) -> Result<TaskStatus, BoundaryError> {
        let Some(transport) = &self.transport else {
            return Ok(TaskStatus::Complete);
        };
        for boundary in self.boundaries.values_mut() {
            boundary.clear(phase, transport.as_ref())?;
        }
        Ok(TaskStatus::Complete)
    }

    /// Re-bind every boundary variable to its variable's current storage
    /// generation.
    ///
    /// Required after allocation changes between cycles; without it the
    /// next cycle fails with [`BoundaryError::StaleBinding`] rather than
    /// touching buffers the channels never saw.
    pub fn reset_boundary_cell_variables(&mut self) -> Result<TaskStatus, BoundaryError> {
        for boundary in self.boundaries.values_mut() {
            boundary.rebind();
        }
        Ok(TaskStatus::Complete)
    }

    /// Interpolate ghost regions adjacent to coarser neighbors from the
    /// restricted data a receive cycle left in the coarse mirrors.
    ///
    /// Runs once per allocated variable and coarser-neighbor face;
    /// variables without coarser neighbors are untouched.
    ///
    /// # Errors
    ///
    /// Whatever the prolongator reports, wrapped per variable and face.
    pub fn prolongate_boundaries(
        &self,
        prolongator: &dyn Prolongator,
    ) -> Result<TaskStatus, BoundaryError> {
        for boundary in self.boundaries.values() {
            if !boundary.var().is_allocated() {
                continue;
            }
            for channel in boundary.ghost_channels() {
                if channel.neighbor().is_coarser() {
                    prolongator.prolongate(boundary.var(), channel.neighbor().face)?;
                }
            }
        }
        Ok(TaskStatus::Complete)
    }

    fn check_setup(&self) -> Result<(), BoundaryError> {
        for var in self.cell_variables() {
            if var.metadata().is_set(MetadataFlag::FillGhost)
                && !self.boundaries.contains_key(var.label())
            {
                return Err(BoundaryError::SetupMissing {
                    label: var.label().to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::SparseConfig;
    use floe_comm::MemoryTransport;
    use floe_core::{
        BlockId, Metadata, Placement, Real, SchemaBuilder, SparseId, TaskStatus, VarLabel,
    };
    use floe_field::BlockLayout;
    use floe_test_utils::FixtureTopology;

    // ── Fixtures ────────────────────────────────────────────────────────

    fn layout() -> BlockLayout {
        BlockLayout::new(4, 1, 1, 2, false).unwrap()
    }

    fn ghost_meta() -> Metadata {
        Metadata::new(
            Placement::Cell,
            &[MetadataFlag::Independent, MetadataFlag::FillGhost],
        )
        .with_default_value(-1.0)
    }

    fn sparse_ghost_meta() -> Metadata {
        Metadata::new(
            Placement::Cell,
            &[
                MetadataFlag::Independent,
                MetadataFlag::FillGhost,
                MetadataFlag::Sparse,
            ],
        )
        .with_default_value(-1.0)
    }

    fn container(block: BlockId) -> BlockData {
        let mut schema = SchemaBuilder::new();
        schema.add_field("rho", ghost_meta()).unwrap();
        schema
            .add_field(
                "tmp",
                Metadata::new(Placement::Cell, &[MetadataFlag::Derived]),
            )
            .unwrap();
        schema
            .add_sparse_pool("q", sparse_ghost_meta(), &[SparseId(2)])
            .unwrap();
        let mut data = BlockData::new(block, layout(), SparseConfig { enabled: true });
        data.initialize(&Arc::new(schema.build())).unwrap();
        data
    }

    fn pair() -> (BlockData, BlockData, FixtureTopology, Arc<MemoryTransport>) {
        let a = container(BlockId(1));
        let b = container(BlockId(2));
        let topology = FixtureTopology::same_rank_pair(BlockId(1), BlockId(2));
        let transport = Arc::new(MemoryTransport::new());
        (a, b, topology, transport)
    }

    fn publish(topology: &FixtureTopology, data: &BlockData) {
        topology.publish(data.block(), data.allocation_snapshot());
    }

    fn cell_value(data: &BlockData, name: &str, i: usize) -> Real {
        let var = data.get(name).unwrap();
        let read = var.read().unwrap();
        read.data().as_slice()[i]
    }

    // ── Setup ───────────────────────────────────────────────────────────

    #[test]
    fn setup_covers_ghost_variables_only() {
        let (mut a, _, topology, transport) = pair();
        a.setup_persistent_channels(&topology, transport).unwrap();
        assert!(a.boundaries.contains_key(&VarLabel::dense("rho")));
        assert!(a
            .boundaries
            .contains_key(&VarLabel::sparse("q", SparseId(2))));
        assert!(!a.boundaries.contains_key(&VarLabel::dense("tmp")));
    }

    #[test]
    fn exchange_without_setup_is_a_setup_error() {
        let (mut a, _, topology, _) = pair();
        let err = a
            .start_receiving(ExchangePhase::MeshInit, &topology)
            .unwrap_err();
        assert!(matches!(err, BoundaryError::SetupMissing { .. }));
        assert!(matches!(
            a.send_boundary_buffers().unwrap_err(),
            BoundaryError::SetupMissing { .. }
        ));
    }

    #[test]
    fn containers_without_ghost_variables_complete_trivially() {
        let mut schema = SchemaBuilder::new();
        schema
            .add_field(
                "tmp",
                Metadata::new(Placement::Cell, &[MetadataFlag::Derived]),
            )
            .unwrap();
        let mut data = BlockData::new(BlockId(5), layout(), SparseConfig::default());
        data.initialize(&Arc::new(schema.build())).unwrap();

        let topology = FixtureTopology::same_rank_pair(BlockId(5), BlockId(6));
        assert_eq!(
            data.start_receiving(ExchangePhase::All, &topology).unwrap(),
            TaskStatus::Complete
        );
        assert_eq!(data.send_boundary_buffers().unwrap(), TaskStatus::Complete);
        assert_eq!(
            data.receive_boundary_buffers().unwrap(),
            TaskStatus::Complete
        );
        assert_eq!(
            data.clear_boundary(ExchangePhase::All).unwrap(),
            TaskStatus::Complete
        );
    }

    // ── Ghost cycle ─────────────────────────────────────────────────────

    #[test]
    fn a_full_cycle_fills_both_blocks_ghosts() {
        let (mut a, mut b, topology, transport) = pair();
        a.setup_persistent_channels(&topology, transport.clone())
            .unwrap();
        b.setup_persistent_channels(&topology, transport.clone())
            .unwrap();
        a.get("rho").unwrap().write().unwrap().data().fill(3.0);
        b.get("rho").unwrap().write().unwrap().data().fill(8.0);
        publish(&topology, &a);
        publish(&topology, &b);

        a.start_receiving(ExchangePhase::MeshInit, &topology)
            .unwrap();
        b.start_receiving(ExchangePhase::MeshInit, &topology)
            .unwrap();
        a.send_boundary_buffers().unwrap();
        assert_eq!(
            a.receive_boundary_buffers().unwrap(),
            TaskStatus::Incomplete
        );
        b.send_boundary_buffers().unwrap();
        assert_eq!(a.receive_boundary_buffers().unwrap(), TaskStatus::Complete);
        assert_eq!(b.receive_boundary_buffers().unwrap(), TaskStatus::Complete);

        // a's upper ghosts mirror b's interior and vice versa.
        assert_eq!(cell_value(&a, "rho", 6), 8.0);
        assert_eq!(cell_value(&b, "rho", 1), 3.0);

        a.clear_boundary(ExchangePhase::MeshInit).unwrap();
        b.clear_boundary(ExchangePhase::MeshInit).unwrap();
    }

    #[test]
    fn unallocated_local_pairs_exchange_nothing() {
        let (mut a, mut b, topology, transport) = pair();
        a.setup_persistent_channels(&topology, transport.clone())
            .unwrap();
        b.setup_persistent_channels(&topology, transport.clone())
            .unwrap();
        a.allocate_sparse("q", SparseId(2)).unwrap();
        publish(&topology, &a);
        publish(&topology, &b);

        for data in [&mut a, &mut b] {
            data.start_receiving(ExchangePhase::MeshInit, &topology)
                .unwrap();
            data.send_boundary_buffers().unwrap();
        }
        assert_eq!(a.receive_boundary_buffers().unwrap(), TaskStatus::Complete);
        assert_eq!(b.receive_boundary_buffers().unwrap(), TaskStatus::Complete);

        // The allocated end default-fills its ghosts; the other stays empty.
        let q = a.get_sparse("q", SparseId(2)).unwrap();
        let read = q.read().unwrap();
        assert_eq!(read.data().as_slice()[6], -1.0);
        assert!(b.get_sparse("q", SparseId(2)).unwrap().read().is_none());
    }

    #[test]
    fn reallocation_between_cycles_needs_a_reset() {
        let (mut a, mut b, topology, transport) = pair();
        a.setup_persistent_channels(&topology, transport.clone())
            .unwrap();
        b.setup_persistent_channels(&topology, transport.clone())
            .unwrap();
        publish(&topology, &a);
        publish(&topology, &b);
        a.start_receiving(ExchangePhase::MeshInit, &topology)
            .unwrap();

        a.allocate_sparse("q", SparseId(2)).unwrap();
        let err = a.send_boundary_buffers().unwrap_err();
        assert!(matches!(err, BoundaryError::StaleBinding { .. }));

        a.reset_boundary_cell_variables().unwrap();
        a.send_boundary_buffers().unwrap();
    }

    // ── Prolongation ────────────────────────────────────────────────────

    struct CountingProlongator(std::sync::atomic::AtomicUsize);

    impl Prolongator for CountingProlongator {
        fn prolongate(&self, _var: &CellVariable, _face: Face) -> Result<(), BoundaryError> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn prolongation_visits_coarser_neighbor_faces_only() {
        let mut schema = SchemaBuilder::new();
        schema.add_field("rho", ghost_meta()).unwrap();
        let layout = BlockLayout::new(4, 1, 1, 2, true).unwrap();

        let topology = FixtureTopology::refined_pair(BlockId(1), BlockId(2), [0, 0]);
        let transport = Arc::new(MemoryTransport::new());

        let mut coarse = BlockData::new(BlockId(1), layout, SparseConfig::default());
        coarse.initialize(&Arc::new(schema.build())).unwrap();
        let mut schema = SchemaBuilder::new();
        schema.add_field("rho", ghost_meta()).unwrap();
        let mut fine = BlockData::new(BlockId(2), layout, SparseConfig::default());
        fine.initialize(&Arc::new(schema.build())).unwrap();

        coarse
            .setup_persistent_channels(&topology, transport.clone())
            .unwrap();
        fine.setup_persistent_channels(&topology, transport.clone())
            .unwrap();

        let counter = CountingProlongator(std::sync::atomic::AtomicUsize::new(0));
        coarse.prolongate_boundaries(&counter).unwrap();
        assert_eq!(counter.0.load(std::sync::atomic::Ordering::SeqCst), 0);
        fine.prolongate_boundaries(&counter).unwrap();
        assert_eq!(counter.0.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
