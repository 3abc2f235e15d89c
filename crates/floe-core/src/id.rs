//! Strongly-typed identifiers and the [`VarLabel`] variable identity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies a mesh block within the simulation.
///
/// Block IDs are assigned by the mesh layer and are globally unique across
/// ranks; the data layer treats them as opaque routing keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BlockId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Identifies a process rank within the distributed run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RankId(pub u32);

impl fmt::Display for RankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for RankId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies one member of a sparse variable pool.
///
/// Sparse IDs are non-negative and chosen by the component that declares
/// the pool (for example, one ID per tracked species). Dense variables
/// carry no sparse ID at all — their identity is the base name alone —
/// so there is no reserved sentinel value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SparseId(pub i32);

impl fmt::Display for SparseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for SparseId {
    fn from(v: i32) -> Self {
        Self(v)
    }
}

/// Counter for unique [`PackId`] allocation.
static PACK_INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique per-instance identifier for a built variable pack.
///
/// Allocated from a monotonic atomic counter via [`PackId::next`]. Two
/// distinct pack builds always have different IDs, even when they cover
/// the same variables, so cache hits are observable: an unchanged ID
/// across two lookups proves the cached pack was reused rather than
/// rebuilt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackId(u64);

impl PackId {
    /// Allocate a fresh, unique pack ID.
    ///
    /// Each call returns an ID never returned before within this process.
    /// Thread-safe.
    pub fn next() -> Self {
        Self(PACK_INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version counter for one variable's backing storage.
///
/// Bumped on every allocate and deallocate. The boundary layer records the
/// generation it bound against and refuses to move data through a binding
/// whose variable has since been reallocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageGeneration(pub u64);

impl fmt::Display for StorageGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StorageGeneration {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// The identity of one concrete variable: base name plus optional sparse ID.
///
/// Dense variables are identified by base name alone; each member of a
/// sparse pool is a distinct variable identified by `(base, id)`. Labels
/// order by base name first and sparse ID second, which makes name-sorted
/// registry iteration and ascending pool expansion fall out of the same
/// comparison.
///
/// The base name is an `Arc<str>`, so labels clone cheaply — they are used
/// as cache keys and copied into selection lists on every query.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarLabel {
    base: Arc<str>,
    sparse: Option<SparseId>,
}

impl VarLabel {
    /// Label for a dense variable.
    pub fn dense(base: &str) -> Self {
        Self {
            base: Arc::from(base),
            sparse: None,
        }
    }

    /// Label for one member of a sparse pool.
    pub fn sparse(base: &str, id: SparseId) -> Self {
        Self {
            base: Arc::from(base),
            sparse: Some(id),
        }
    }

    /// Label with an optional sparse ID (`None` means dense).
    pub fn new(base: &str, sparse: Option<SparseId>) -> Self {
        Self {
            base: Arc::from(base),
            sparse,
        }
    }

    /// The base name shared by all members of a pool.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The sparse ID, or `None` for dense variables.
    pub fn sparse_id(&self) -> Option<SparseId> {
        self.sparse
    }

    /// Whether this label names a sparse pool member.
    pub fn is_sparse(&self) -> bool {
        self.sparse.is_some()
    }
}

impl fmt::Display for VarLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sparse {
            Some(id) => write!(f, "{}_{}", self.base, id),
            None => write!(f, "{}", self.base),
        }
    }
}
