//! Test fixtures for floe development.
//!
//! Provides [`FixtureTopology`], an in-memory [`Topology`] with published
//! allocation snapshots, plus canned metadata and layouts for the block
//! arrangements the exchange tests keep reaching for.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::collections::HashMap;
use std::sync::Mutex;

use floe_comm::{AllocationSnapshot, Face, Neighbor, Topology};
use floe_core::{BlockId, Metadata, MetadataFlag, Placement, RankId};
use floe_field::BlockLayout;

/// A hand-assembled topology over a handful of blocks.
///
/// Neighbor records are whatever the test inserts; allocation snapshots
/// are published by the test between cycles, the way a mesh driver would
/// after allocation changes. An unpublished block reads as having nothing
/// allocated.
pub struct FixtureTopology {
    rank: RankId,
    neighbors: HashMap<BlockId, Vec<Neighbor>>,
    snapshots: Mutex<HashMap<BlockId, AllocationSnapshot>>,
}

impl FixtureTopology {
    pub fn new(rank: RankId) -> Self {
        Self {
            rank,
            neighbors: HashMap::new(),
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    /// Record that `of` sees `neighbor` across one face.
    pub fn add_neighbor(&mut self, of: BlockId, neighbor: Neighbor) {
        self.neighbors.entry(of).or_default().push(neighbor);
    }

    /// Two same-level blocks side by side along x1, `a` below `b`, both
    /// on rank 0.
    pub fn same_rank_pair(a: BlockId, b: BlockId) -> Self {
        let mut topo = Self::new(RankId(0));
        topo.add_neighbor(a, same_level(b, RankId(0), Face::X1Plus));
        topo.add_neighbor(b, same_level(a, RankId(0), Face::X1Minus));
        topo
    }

    /// The same arrangement split across two ranks: returns the topology
    /// as seen from rank 0 (owning `a`) and from rank 1 (owning `b`).
    pub fn cross_rank_pair(a: BlockId, b: BlockId) -> (Self, Self) {
        let mut rank0 = Self::new(RankId(0));
        rank0.add_neighbor(a, same_level(b, RankId(1), Face::X1Plus));
        let mut rank1 = Self::new(RankId(1));
        rank1.add_neighbor(b, same_level(a, RankId(0), Face::X1Minus));
        (rank0, rank1)
    }

    /// A refinement jump along x1: `fine` sits one level below `coarse`,
    /// located at `offset` within the coarse face. Both on rank 0.
    pub fn refined_pair(coarse: BlockId, fine: BlockId, offset: [usize; 2]) -> Self {
        let mut topo = Self::new(RankId(0));
        topo.add_neighbor(
            coarse,
            Neighbor {
                block: fine,
                rank: RankId(0),
                face: Face::X1Plus,
                level_delta: 1,
                offset,
            },
        );
        topo.add_neighbor(
            fine,
            Neighbor {
                block: coarse,
                rank: RankId(0),
                face: Face::X1Minus,
                level_delta: -1,
                offset,
            },
        );
        topo
    }

    /// Publish what `block` currently has allocated. Overwrites the
    /// previous snapshot.
    pub fn publish(&self, block: BlockId, snapshot: AllocationSnapshot) {
        self.snapshots.lock().unwrap().insert(block, snapshot);
    }
}

impl Topology for FixtureTopology {
    fn local_rank(&self) -> RankId {
        self.rank
    }

    fn neighbors(&self, block: BlockId) -> Vec<Neighbor> {
        self.neighbors.get(&block).cloned().unwrap_or_default()
    }

    fn allocation_snapshot(&self, block: BlockId) -> Option<AllocationSnapshot> {
        self.snapshots.lock().unwrap().get(&block).cloned()
    }
}

fn same_level(block: BlockId, rank: RankId, face: Face) -> Neighbor {
    Neighbor {
        block,
        rank,
        face,
        level_delta: 0,
        offset: [0, 0],
    }
}

/// A ghost-carrying dense cell field defaulting to `-1.0`.
pub fn ghost_meta() -> Metadata {
    Metadata::new(
        Placement::Cell,
        &[MetadataFlag::Independent, MetadataFlag::FillGhost],
    )
    .with_default_value(-1.0)
}

/// A ghost-carrying flux field defaulting to `-1.0`.
pub fn flux_ghost_meta() -> Metadata {
    Metadata::new(
        Placement::Cell,
        &[
            MetadataFlag::Independent,
            MetadataFlag::FillGhost,
            MetadataFlag::WithFluxes,
        ],
    )
    .with_default_value(-1.0)
}

/// A ghost-carrying sparse field defaulting to `-1.0`.
pub fn sparse_ghost_meta() -> Metadata {
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

/// The smallest single-level layout the exchange geometry accepts:
/// 4 interior cells on x1, ghost width 2.
pub fn exchange_layout() -> BlockLayout {
    BlockLayout::new(4, 1, 1, 2, false).unwrap()
}

/// A two-level-capable 2D layout: 8x8 interior, ghost width 2, with
/// coarse mirrors.
pub fn multilevel_layout() -> BlockLayout {
    BlockLayout::new(8, 8, 1, 2, true).unwrap()
}
