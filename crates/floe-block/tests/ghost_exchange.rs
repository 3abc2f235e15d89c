//! Ghost exchange driven through the container API.
//!
//! These tests run whole cycles over [`BlockData`] rather than poking
//! channels directly: same-rank pairs deciding skips from published
//! snapshots, cross-rank pairs moving real messages over a shared
//! in-memory transport, persistent channels reused across cycles, and
//! the coarse-fine path that lands restricted data in the coarse mirror
//! ahead of prolongation.

use std::sync::Arc;

use floe_block::{BlockData, Prolongator, SparseConfig};
use floe_comm::{ExchangePhase, Face, MemoryTransport};
use floe_core::{BlockId, BoundaryError, Real, SchemaBuilder, SparseId, TaskStatus};
use floe_field::{BlockLayout, CellVariable};
use floe_test_utils::{exchange_layout, ghost_meta, sparse_ghost_meta, FixtureTopology};

fn dense_container(block: BlockId) -> BlockData {
    let mut schema = SchemaBuilder::new();
    schema.add_field("rho", ghost_meta()).unwrap();
    schema.add_field("eng", ghost_meta()).unwrap();
    let mut data = BlockData::new(block, exchange_layout(), SparseConfig::default());
    data.initialize(&Arc::new(schema.build())).unwrap();
    data
}

fn fill(data: &BlockData, name: &str, value: Real) {
    data.get(name).unwrap().write().unwrap().data().fill(value);
}

fn cell(data: &BlockData, name: &str, i: usize) -> Real {
    data.get(name).unwrap().read().unwrap().data().as_slice()[i]
}

/// Drive one complete cycle for all blocks: publish, start, send, poll
/// receives to completion, clear.
fn run_cycle(phase: ExchangePhase, topology: &FixtureTopology, blocks: &mut [&mut BlockData]) {
    for data in blocks.iter_mut() {
        topology.publish(data.block(), data.allocation_snapshot());
    }
    for data in blocks.iter_mut() {
        data.start_receiving(phase, topology).unwrap();
    }
    for data in blocks.iter_mut() {
        data.send_boundary_buffers().unwrap();
    }
    if phase.includes_flux() {
        for data in blocks.iter_mut() {
            data.send_flux_correction().unwrap();
        }
    }
    let mut spins = 0;
    loop {
        let mut done = TaskStatus::Complete;
        for data in blocks.iter_mut() {
            done = done.and(data.receive_boundary_buffers().unwrap());
            if phase.includes_flux() {
                done = done.and(data.receive_flux_correction().unwrap());
            }
        }
        if done == TaskStatus::Complete {
            break;
        }
        spins += 1;
        assert!(spins < 16, "exchange failed to make progress");
    }
    for data in blocks.iter_mut() {
        data.clear_boundary(phase).unwrap();
    }
}

#[test]
fn two_blocks_swap_interiors_and_reuse_channels() {
    let transport = Arc::new(MemoryTransport::new());
    let topology = FixtureTopology::same_rank_pair(BlockId(1), BlockId(2));
    let mut a = dense_container(BlockId(1));
    let mut b = dense_container(BlockId(2));
    a.setup_persistent_channels(&topology, transport.clone())
        .unwrap();
    b.setup_persistent_channels(&topology, transport.clone())
        .unwrap();

    fill(&a, "rho", 3.0);
    fill(&b, "rho", 8.0);
    fill(&a, "eng", 30.0);
    fill(&b, "eng", 80.0);
    run_cycle(ExchangePhase::MeshInit, &topology, &mut [&mut a, &mut b]);

    // Upper ghosts of a mirror b's interior and vice versa.
    assert_eq!(cell(&a, "rho", 6), 8.0);
    assert_eq!(cell(&a, "rho", 7), 8.0);
    assert_eq!(cell(&b, "rho", 0), 3.0);
    assert_eq!(cell(&a, "eng", 6), 80.0);
    assert_eq!(cell(&b, "eng", 1), 30.0);

    // Same channels, next cycle, fresh values.
    fill(&a, "rho", 4.0);
    fill(&b, "rho", 9.0);
    run_cycle(ExchangePhase::All, &topology, &mut [&mut a, &mut b]);
    assert_eq!(cell(&a, "rho", 6), 9.0);
    assert_eq!(cell(&b, "rho", 1), 4.0);

    // Two variables, two directions, reused both cycles.
    assert_eq!(transport.route_count(), 4);
    assert_eq!(transport.messages_sent(), 8);
    assert_eq!(transport.messages_received(), 8);
}

#[test]
fn cross_rank_blocks_move_real_messages() {
    let transport = Arc::new(MemoryTransport::new());
    let (topo_a, topo_b) = FixtureTopology::cross_rank_pair(BlockId(1), BlockId(2));
    let mut a = dense_container(BlockId(1));
    let mut b = dense_container(BlockId(2));
    a.setup_persistent_channels(&topo_a, transport.clone())
        .unwrap();
    b.setup_persistent_channels(&topo_b, transport.clone())
        .unwrap();
    fill(&a, "rho", 5.0);
    fill(&b, "rho", 6.0);

    a.start_receiving(ExchangePhase::MeshInit, &topo_a).unwrap();
    b.start_receiving(ExchangePhase::MeshInit, &topo_b).unwrap();
    a.send_boundary_buffers().unwrap();
    assert_eq!(
        b.receive_boundary_buffers().unwrap(),
        TaskStatus::Incomplete
    );
    b.send_boundary_buffers().unwrap();
    assert_eq!(a.receive_boundary_buffers().unwrap(), TaskStatus::Complete);
    assert_eq!(b.receive_boundary_buffers().unwrap(), TaskStatus::Complete);

    assert_eq!(cell(&a, "rho", 7), 6.0);
    assert_eq!(cell(&b, "rho", 0), 5.0);
    a.clear_boundary(ExchangePhase::MeshInit).unwrap();
    b.clear_boundary(ExchangePhase::MeshInit).unwrap();
}

#[test]
fn remote_unallocated_peers_default_fill_instead_of_blocking() {
    let transport = Arc::new(MemoryTransport::new());
    let (topo_a, topo_b) = FixtureTopology::cross_rank_pair(BlockId(1), BlockId(2));

    let mut schema = SchemaBuilder::new();
    schema
        .add_sparse_pool("q", sparse_ghost_meta(), &[SparseId(0)])
        .unwrap();
    let schema = Arc::new(schema.build());
    let mut a = BlockData::new(BlockId(1), exchange_layout(), SparseConfig { enabled: true });
    a.initialize(&schema).unwrap();
    let mut b = BlockData::new(BlockId(2), exchange_layout(), SparseConfig { enabled: true });
    b.initialize(&schema).unwrap();

    a.setup_persistent_channels(&topo_a, transport.clone())
        .unwrap();
    b.setup_persistent_channels(&topo_b, transport.clone())
        .unwrap();
    a.allocate_sparse("q", SparseId(0)).unwrap();
    let q = a.get_sparse("q", SparseId(0)).unwrap();
    q.write().unwrap().data().fill(2.0);

    a.start_receiving(ExchangePhase::MeshInit, &topo_a).unwrap();
    b.start_receiving(ExchangePhase::MeshInit, &topo_b).unwrap();
    a.send_boundary_buffers().unwrap();
    b.send_boundary_buffers().unwrap();
    assert_eq!(a.receive_boundary_buffers().unwrap(), TaskStatus::Complete);
    assert_eq!(b.receive_boundary_buffers().unwrap(), TaskStatus::Complete);

    // b's notice carried no cells; a's ghosts fell back to the default.
    {
        let q = a.get_sparse("q", SparseId(0)).unwrap();
        let read = q.read().unwrap();
        assert_eq!(read.data().as_slice()[6], -1.0);
        assert_eq!(read.data().as_slice()[7], -1.0);
    }
    // a's payload was discarded unread on the unallocated side.
    assert!(b.get_sparse("q", SparseId(0)).unwrap().read().is_none());
    assert_eq!(transport.messages_sent(), 2);
}

#[test]
fn calls_outside_the_cycle_order_fail() {
    let transport = Arc::new(MemoryTransport::new());
    let topology = FixtureTopology::same_rank_pair(BlockId(1), BlockId(2));
    let mut a = dense_container(BlockId(1));
    a.setup_persistent_channels(&topology, transport.clone())
        .unwrap();
    topology.publish(BlockId(1), a.allocation_snapshot());

    // Send before any cycle is open.
    let err = a.send_boundary_buffers().unwrap_err();
    assert!(matches!(err, BoundaryError::OutOfOrder { .. }));

    // Receive before any cycle is open.
    let err = a.receive_boundary_buffers().unwrap_err();
    assert!(matches!(err, BoundaryError::OutOfOrder { .. }));

    // Re-opening an uncleared cycle.
    a.start_receiving(ExchangePhase::MeshInit, &topology)
        .unwrap();
    let err = a
        .start_receiving(ExchangePhase::MeshInit, &topology)
        .unwrap_err();
    assert!(matches!(err, BoundaryError::OutOfOrder { .. }));

    // Clearing is always legal and reopens the way.
    a.clear_boundary(ExchangePhase::MeshInit).unwrap();
    a.start_receiving(ExchangePhase::MeshInit, &topology)
        .unwrap();
}

// ── Coarse-fine ghosts ──────────────────────────────────────────────────

/// Piecewise-constant injection from the coarse mirror, just enough to
/// watch the container drive the seam.
struct InjectProlongator;

impl Prolongator for InjectProlongator {
    fn prolongate(&self, var: &CellVariable, face: Face) -> Result<(), BoundaryError> {
        assert_eq!(face, Face::X1Minus);
        let mut write = var.write().expect("prolongating an unallocated variable");
        let parent = write.coarse().expect("no coarse mirror").as_slice()[1];
        write.data().as_mut_slice()[0] = parent;
        write.data().as_mut_slice()[1] = parent;
        Ok(())
    }
}

#[test]
fn refined_pairs_route_through_the_coarse_mirror() {
    let transport = Arc::new(MemoryTransport::new());
    let topology = FixtureTopology::refined_pair(BlockId(1), BlockId(2), [0, 0]);
    let layout = BlockLayout::new(4, 1, 1, 2, true).unwrap();

    let container = |block| {
        let mut schema = SchemaBuilder::new();
        schema.add_field("rho", ghost_meta()).unwrap();
        let mut data = BlockData::new(block, layout, SparseConfig::default());
        data.initialize(&Arc::new(schema.build())).unwrap();
        data
    };
    let mut coarse = container(BlockId(1));
    let mut fine = container(BlockId(2));
    coarse
        .setup_persistent_channels(&topology, transport.clone())
        .unwrap();
    fine.setup_persistent_channels(&topology, transport.clone())
        .unwrap();

    {
        let var = coarse.get("rho").unwrap();
        let mut write = var.write().unwrap();
        let cells = write.data().as_mut_slice();
        cells[2] = 1.0;
        cells[3] = 2.0;
        cells[4] = 3.0;
        cells[5] = 4.0;
    }
    {
        let var = fine.get("rho").unwrap();
        let mut write = var.write().unwrap();
        let cells = write.data().as_mut_slice();
        cells[2] = 10.0;
        cells[3] = 20.0;
        cells[4] = 30.0;
        cells[5] = 40.0;
    }

    run_cycle(
        ExchangePhase::MeshInit,
        &topology,
        &mut [&mut coarse, &mut fine],
    );

    // The fine interior arrives box-averaged in the coarse ghosts.
    assert_eq!(cell(&coarse, "rho", 6), 15.0);
    assert_eq!(cell(&coarse, "rho", 7), 35.0);

    // The coarse interior arrives 1:1 in the fine block's coarse mirror.
    {
        let var = fine.get("rho").unwrap();
        let read = var.read().unwrap();
        let mirror = read.coarse().unwrap().as_slice();
        assert_eq!(mirror[0], 3.0);
        assert_eq!(mirror[1], 4.0);
    }

    // Prolongation then fills the fine ghosts from the mirror.
    fine.prolongate_boundaries(&InjectProlongator).unwrap();
    assert_eq!(cell(&fine, "rho", 0), 4.0);
    assert_eq!(cell(&fine, "rho", 1), 4.0);
    coarse.prolongate_boundaries(&InjectProlongator).unwrap();
}
