//! Sparse variables across their whole life.
//!
//! One dense ghost variable `a` and one sparse pool member `b_0` travel
//! together through selection, pack retrieval, allocation changes, and
//! exchange cycles. Pack identity must be stable while allocation state
//! holds and change the moment it does not; local exchange must skip
//! `b_0` entirely until both blocks have allocated it.

use std::sync::Arc;

use floe_block::{BlockData, SparseConfig};
use floe_comm::{ExchangePhase, MemoryTransport};
use floe_core::{BlockId, SchemaBuilder, SparseId, TaskStatus, VarLabel};
use floe_test_utils::{exchange_layout, ghost_meta, sparse_ghost_meta, FixtureTopology};

fn container(block: BlockId) -> BlockData {
    let mut schema = SchemaBuilder::new();
    schema.add_field("a", ghost_meta()).unwrap();
    schema
        .add_sparse_pool("b", sparse_ghost_meta(), &[SparseId(0)])
        .unwrap();
    let mut data = BlockData::new(block, exchange_layout(), SparseConfig { enabled: true });
    data.initialize(&Arc::new(schema.build())).unwrap();
    data
}

fn run_cycle(topology: &FixtureTopology, blocks: &mut [&mut BlockData]) {
    for data in blocks.iter_mut() {
        topology.publish(data.block(), data.allocation_snapshot());
    }
    for data in blocks.iter_mut() {
        data.start_receiving(ExchangePhase::MeshInit, topology).unwrap();
    }
    for data in blocks.iter_mut() {
        data.send_boundary_buffers().unwrap();
    }
    let mut spins = 0;
    loop {
        let mut done = TaskStatus::Complete;
        for data in blocks.iter_mut() {
            done = done.and(data.receive_boundary_buffers().unwrap());
        }
        if done == TaskStatus::Complete {
            break;
        }
        spins += 1;
        assert!(spins < 16, "exchange failed to make progress");
    }
    for data in blocks.iter_mut() {
        data.clear_boundary(ExchangePhase::MeshInit).unwrap();
    }
}

#[test]
fn pack_identity_tracks_allocation_state() {
    let mut data = container(BlockId(1));

    let list = data.select_by_name(&["a", "b"], None).unwrap();
    assert_eq!(
        list.labels(),
        vec![VarLabel::dense("a"), VarLabel::sparse("b", SparseId(0))]
    );
    let bits: Vec<bool> = list.fingerprint().iter().collect();
    assert_eq!(bits, vec![true, false]);

    let first = data
        .pack_variables_by_name(&["a", "b"], None, false)
        .unwrap()
        .id();
    let second = data
        .pack_variables_by_name(&["a", "b"], None, false)
        .unwrap()
        .id();
    assert_eq!(first, second, "no state change, no rebuild");

    data.allocate_sparse("b", SparseId(0)).unwrap();
    let rebuilt = data
        .pack_variables_by_name(&["a", "b"], None, false)
        .unwrap();
    assert_ne!(rebuilt.id(), first, "allocation change invalidates the pack");
    assert_eq!(rebuilt.fingerprint().count_allocated(), 2);

    data.deallocate_sparse("b", SparseId(0)).unwrap();
    let again = data
        .pack_variables_by_name(&["a", "b"], None, false)
        .unwrap();
    assert_eq!(again.fingerprint().count_allocated(), 1);
}

#[test]
fn deferred_members_hold_no_storage_until_allocated() {
    let mut data = container(BlockId(1));
    {
        let b = data.get_sparse("b", SparseId(0)).unwrap();
        assert!(b.read().is_none());
        assert!(b.write().is_none());
    }

    data.allocate_sparse("b", SparseId(0)).unwrap();
    let b = data.get_sparse("b", SparseId(0)).unwrap();
    let read = b.read().unwrap();
    assert!(read.data().as_slice().iter().all(|&v| v == -1.0));
}

#[test]
fn local_exchange_skips_half_allocated_members() {
    let transport = Arc::new(MemoryTransport::new());
    let topology = FixtureTopology::same_rank_pair(BlockId(1), BlockId(2));
    let mut one = container(BlockId(1));
    let mut two = container(BlockId(2));
    one.setup_persistent_channels(&topology, transport.clone())
        .unwrap();
    two.setup_persistent_channels(&topology, transport.clone())
        .unwrap();

    // Cycle 1: b_0 unallocated everywhere, only `a` moves.
    run_cycle(&topology, &mut [&mut one, &mut two]);
    assert_eq!(transport.messages_sent(), 2);
    // Two ghost cells per `a` message; the skipped b_0 channels moved none.
    assert_eq!(transport.cells_sent(), 4);

    // Cycle 2: allocated on one side only. Still no b_0 messages, but the
    // allocated side re-defaults its ghosts.
    one.allocate_sparse("b", SparseId(0)).unwrap();
    {
        let b = one.get_sparse("b", SparseId(0)).unwrap();
        let mut write = b.write().unwrap();
        write.data().as_mut_slice()[6] = 9.0;
        write.data().as_mut_slice()[7] = 9.0;
    }
    run_cycle(&topology, &mut [&mut one, &mut two]);
    assert_eq!(transport.messages_sent(), 4);
    {
        let b = one.get_sparse("b", SparseId(0)).unwrap();
        let read = b.read().unwrap();
        assert_eq!(read.data().as_slice()[6], -1.0);
        assert_eq!(read.data().as_slice()[7], -1.0);
    }
    assert!(two.get_sparse("b", SparseId(0)).unwrap().read().is_none());

    // Cycle 3: allocated on both sides, b_0 finally moves data.
    two.allocate_sparse("b", SparseId(0)).unwrap();
    {
        let b = two.get_sparse("b", SparseId(0)).unwrap();
        b.write().unwrap().data().fill(7.0);
    }
    run_cycle(&topology, &mut [&mut one, &mut two]);
    assert_eq!(transport.messages_sent(), 8);
    let b = one.get_sparse("b", SparseId(0)).unwrap();
    let read = b.read().unwrap();
    assert_eq!(read.data().as_slice()[6], 7.0);
    assert_eq!(read.data().as_slice()[7], 7.0);
}

#[test]
fn snapshots_capture_exactly_the_allocated_labels() {
    let mut data = container(BlockId(1));
    let snap = data.allocation_snapshot();
    assert!(snap.is_allocated(&VarLabel::dense("a")));
    assert!(!snap.is_allocated(&VarLabel::sparse("b", SparseId(0))));

    data.allocate_sparse("b", SparseId(0)).unwrap();
    let snap = data.allocation_snapshot();
    assert!(snap.is_allocated(&VarLabel::sparse("b", SparseId(0))));
    assert_eq!(snap.len(), 2);
}
