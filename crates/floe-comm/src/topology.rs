//! Neighbor topology as seen by one block.
//!
//! The data layer never walks the mesh tree itself. A [`Topology`]
//! implementation — the mesh driver in production, a fixture in tests —
//! answers two questions: who borders this block, and what does a
//! bordering local block currently have allocated.

use floe_core::{BlockId, RankId, VarLabel};
use floe_field::Axis;
use std::collections::BTreeSet;
use std::fmt;

/// One of the six faces of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    /// Lower face along x1.
    X1Minus,
    /// Upper face along x1.
    X1Plus,
    /// Lower face along x2.
    X2Minus,
    /// Upper face along x2.
    X2Plus,
    /// Lower face along x3.
    X3Minus,
    /// Upper face along x3.
    X3Plus,
}

impl Face {
    /// All six faces, lower before upper, x1 before x2 before x3.
    pub const ALL: [Face; 6] = [
        Self::X1Minus,
        Self::X1Plus,
        Self::X2Minus,
        Self::X2Plus,
        Self::X3Minus,
        Self::X3Plus,
    ];

    /// The axis this face is normal to.
    pub fn axis(self) -> Axis {
        match self {
            Self::X1Minus | Self::X1Plus => Axis::X1,
            Self::X2Minus | Self::X2Plus => Axis::X2,
            Self::X3Minus | Self::X3Plus => Axis::X3,
        }
    }

    /// Whether this is the upper face along its axis.
    pub fn is_upper(self) -> bool {
        matches!(self, Self::X1Plus | Self::X2Plus | Self::X3Plus)
    }

    /// The same axis, other side. A neighbor at my `f` sees me at
    /// `f.opposite()`.
    pub fn opposite(self) -> Face {
        match self {
            Self::X1Minus => Self::X1Plus,
            Self::X1Plus => Self::X1Minus,
            Self::X2Minus => Self::X2Plus,
            Self::X2Plus => Self::X2Minus,
            Self::X3Minus => Self::X3Plus,
            Self::X3Plus => Self::X3Minus,
        }
    }

    /// The two axes spanning the face, in axis order. The face axis is
    /// excluded; for collapsed axes the caller consults the layout.
    pub fn transverse(self) -> [Axis; 2] {
        match self.axis() {
            Axis::X1 => [Axis::X2, Axis::X3],
            Axis::X2 => [Axis::X1, Axis::X3],
            Axis::X3 => [Axis::X1, Axis::X2],
        }
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::X1Minus => "x1-",
            Self::X1Plus => "x1+",
            Self::X2Minus => "x2-",
            Self::X2Plus => "x2+",
            Self::X3Minus => "x3-",
            Self::X3Plus => "x3+",
        };
        write!(f, "{s}")
    }
}

/// One neighbor relationship, as recorded on one of its two ends.
///
/// `level_delta` is the neighbor's refinement level minus this block's:
/// `+1` means the neighbor is finer, `-1` coarser, `0` same level.
///
/// `offset` locates the **finer** block of the pair within the coarse
/// face, one entry per transverse axis of [`face`](Self::face) in axis
/// order, each `0` (lower half) or `1` (upper half). Both ends of a
/// refined pair record the same offset, so the sender's extraction window
/// and the receiver's insertion window agree. Same-level pairs leave it
/// `[0, 0]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Neighbor {
    /// The neighboring block.
    pub block: BlockId,
    /// The rank that owns the neighboring block.
    pub rank: RankId,
    /// The face of **this** block the neighbor sits behind.
    pub face: Face,
    /// Neighbor level minus own level.
    pub level_delta: i8,
    /// Position of the finer block within the coarse face.
    pub offset: [usize; 2],
}

impl Neighbor {
    /// Whether the neighbor is one level finer than this block.
    pub fn is_finer(&self) -> bool {
        self.level_delta > 0
    }

    /// Whether the neighbor is one level coarser than this block.
    pub fn is_coarser(&self) -> bool {
        self.level_delta < 0
    }

    /// Whether the neighbor shares this block's level.
    pub fn is_same_level(&self) -> bool {
        self.level_delta == 0
    }
}

/// Which variables a block currently has allocated.
///
/// Published by the owning container and consulted by its local neighbors
/// when they decide whether a local exchange pair will carry a message.
/// Snapshots are value types: they describe the moment they were taken,
/// and the protocol only trusts them between a sync point and the end of
/// the cycle that follows it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllocationSnapshot {
    allocated: BTreeSet<VarLabel>,
}

impl AllocationSnapshot {
    /// An empty snapshot (nothing allocated).
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot from the labels of the allocated variables.
    pub fn from_labels<I: IntoIterator<Item = VarLabel>>(labels: I) -> Self {
        Self {
            allocated: labels.into_iter().collect(),
        }
    }

    /// Record `label` as allocated.
    pub fn insert(&mut self, label: VarLabel) {
        self.allocated.insert(label);
    }

    /// Whether `label` was allocated when the snapshot was taken.
    pub fn is_allocated(&self, label: &VarLabel) -> bool {
        self.allocated.contains(label)
    }

    /// Number of allocated variables in the snapshot.
    pub fn len(&self) -> usize {
        self.allocated.len()
    }

    /// Whether nothing was allocated.
    pub fn is_empty(&self) -> bool {
        self.allocated.is_empty()
    }
}

/// The mesh driver's answers about block adjacency and peer allocation.
///
/// Implementations must be consistent across ranks: both ends of a pair
/// must report the relationship with mirrored faces, equal `level_delta`
/// magnitude, and the same `offset`.
pub trait Topology {
    /// The rank this process runs as.
    fn local_rank(&self) -> RankId;

    /// All face neighbors of `block`.
    fn neighbors(&self, block: BlockId) -> Vec<Neighbor>;

    /// The last published allocation snapshot of a **local** block, or
    /// `None` for remote blocks and blocks that never published.
    ///
    /// An unpublished local block counts as having nothing allocated;
    /// both ends of a local pair resolve the skip rule from this same
    /// answer, so the pair always agrees.
    fn allocation_snapshot(&self, block: BlockId) -> Option<AllocationSnapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_is_an_involution() {
        for face in Face::ALL {
            assert_ne!(face, face.opposite());
            assert_eq!(face, face.opposite().opposite());
            assert_eq!(face.axis(), face.opposite().axis());
        }
    }

    #[test]
    fn transverse_excludes_the_face_axis() {
        for face in Face::ALL {
            let [a, b] = face.transverse();
            assert_ne!(a, face.axis());
            assert_ne!(b, face.axis());
            assert_ne!(a, b);
        }
    }

    #[test]
    fn level_delta_predicates() {
        let mut n = Neighbor {
            block: BlockId(1),
            rank: RankId(0),
            face: Face::X1Plus,
            level_delta: 0,
            offset: [0, 0],
        };
        assert!(n.is_same_level());
        n.level_delta = 1;
        assert!(n.is_finer() && !n.is_coarser());
        n.level_delta = -1;
        assert!(n.is_coarser() && !n.is_finer());
    }

    #[test]
    fn snapshot_membership() {
        let mut snap = AllocationSnapshot::new();
        assert!(snap.is_empty());
        snap.insert(VarLabel::dense("rho"));
        assert!(snap.is_allocated(&VarLabel::dense("rho")));
        assert!(!snap.is_allocated(&VarLabel::dense("eng")));
        assert_eq!(snap.len(), 1);
    }
}
