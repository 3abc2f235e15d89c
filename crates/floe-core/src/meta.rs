//! Variable metadata: placement, behavior flags, and per-cell shape.

use crate::error::ConfigError;
use crate::Real;
use smallvec::SmallVec;
use std::fmt;

/// Where a variable's values live relative to the cells of a block.
///
/// This is a closed set: adding a new placement is a breaking change that
/// every `match` in the workspace must acknowledge. Only [`Cell`] and
/// [`Face`](Placement::Face) placements can currently be constructed into
/// variables; `Edge` and `Node` are named so that schemas can be rejected
/// with a precise error instead of a silent fallthrough.
///
/// [`Cell`]: Placement::Cell
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Placement {
    /// One value (per component) at each cell center.
    Cell,
    /// One value per cell face, stored as three face-normal arrays.
    Face,
    /// Edge-centered storage. Declared but not supported.
    Edge,
    /// Node-centered storage. Declared but not supported.
    Node,
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cell => "cell",
            Self::Face => "face",
            Self::Edge => "edge",
            Self::Node => "node",
        };
        write!(f, "{s}")
    }
}

/// Behavior flags attached to a variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetadataFlag {
    /// Evolved state: owned by the integrator, persisted across stages.
    Independent,
    /// Computed from independent state; cheap to rebuild.
    Derived,
    /// Participates in ghost-cell exchange with neighboring blocks.
    FillGhost,
    /// Carries face-flux storage and takes part in flux correction.
    WithFluxes,
    /// Member of a sparse pool; may be unallocated on blocks where the
    /// associated feature is absent.
    Sparse,
    /// A single shared copy serves every container of the block; stage
    /// copies alias it rather than duplicating storage.
    OneCopy,
}

impl MetadataFlag {
    const ALL: [MetadataFlag; 6] = [
        Self::Independent,
        Self::Derived,
        Self::FillGhost,
        Self::WithFluxes,
        Self::Sparse,
        Self::OneCopy,
    ];

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for MetadataFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Independent => "independent",
            Self::Derived => "derived",
            Self::FillGhost => "fill_ghost",
            Self::WithFluxes => "with_fluxes",
            Self::Sparse => "sparse",
            Self::OneCopy => "one_copy",
        };
        write!(f, "{s}")
    }
}

/// A set of [`MetadataFlag`]s packed into one word.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FlagSet {
    bits: u32,
}

impl FlagSet {
    /// Create an empty flag set.
    pub fn empty() -> Self {
        Self { bits: 0 }
    }

    /// Create a set holding the given flags.
    pub fn of(flags: &[MetadataFlag]) -> Self {
        let mut set = Self::empty();
        for &flag in flags {
            set.insert(flag);
        }
        set
    }

    /// Insert a flag.
    pub fn insert(&mut self, flag: MetadataFlag) {
        self.bits |= flag.bit();
    }

    /// Remove a flag.
    pub fn remove(&mut self, flag: MetadataFlag) {
        self.bits &= !flag.bit();
    }

    /// Whether the set contains `flag`.
    pub fn contains(self, flag: MetadataFlag) -> bool {
        self.bits & flag.bit() != 0
    }

    /// Whether the set contains every flag in `flags`.
    pub fn contains_all(self, flags: &[MetadataFlag]) -> bool {
        flags.iter().all(|&f| self.contains(f))
    }

    /// Whether the set contains at least one flag in `flags`.
    pub fn contains_any(self, flags: &[MetadataFlag]) -> bool {
        flags.iter().any(|&f| self.contains(f))
    }

    /// Whether the set is empty.
    pub fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// Number of flags in the set.
    pub fn len(self) -> usize {
        self.bits.count_ones() as usize
    }

    /// Iterate over the flags in the set in declaration order.
    pub fn iter(self) -> impl Iterator<Item = MetadataFlag> {
        MetadataFlag::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl fmt::Debug for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<MetadataFlag> for FlagSet {
    fn from_iter<I: IntoIterator<Item = MetadataFlag>>(iter: I) -> Self {
        let mut set = Self::empty();
        for flag in iter {
            set.insert(flag);
        }
        set
    }
}

/// Per-cell component shape, e.g. `[3]` for a velocity vector.
///
/// Up to three component axes fit inline; an empty shape means scalar.
pub type Shape = SmallVec<[usize; 3]>;

/// Full description of one variable: placement, flags, shape, default.
///
/// Built with a consuming builder:
///
/// ```
/// use floe_core::{Metadata, MetadataFlag, Placement};
///
/// let meta = Metadata::new(Placement::Cell, &[
///     MetadataFlag::Independent,
///     MetadataFlag::FillGhost,
/// ])
/// .with_shape(&[3]);
/// assert_eq!(meta.ncomp(), 3);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Metadata {
    placement: Placement,
    flags: FlagSet,
    shape: Shape,
    default_value: Real,
}

impl Metadata {
    /// Create metadata with the given placement and flags, scalar shape,
    /// and a default value of zero.
    pub fn new(placement: Placement, flags: &[MetadataFlag]) -> Self {
        Self {
            placement,
            flags: FlagSet::of(flags),
            shape: Shape::new(),
            default_value: 0.0,
        }
    }

    /// Set the per-cell component shape.
    #[must_use]
    pub fn with_shape(mut self, shape: &[usize]) -> Self {
        self.shape = Shape::from_slice(shape);
        self
    }

    /// Set the value used to fill freshly allocated storage and ghost
    /// regions received from unallocated neighbors.
    #[must_use]
    pub fn with_default_value(mut self, value: Real) -> Self {
        self.default_value = value;
        self
    }

    /// Storage placement of the variable.
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// The flag set.
    pub fn flags(&self) -> FlagSet {
        self.flags
    }

    /// Whether `flag` is set.
    pub fn is_set(&self, flag: MetadataFlag) -> bool {
        self.flags.contains(flag)
    }

    /// The per-cell component shape (empty for scalars).
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Flattened number of components per cell (1 for scalars).
    pub fn ncomp(&self) -> usize {
        self.shape.iter().product::<usize>().max(1)
    }

    /// The fill value for fresh storage and default-filled ghost regions.
    pub fn default_value(&self) -> Real {
        self.default_value
    }

    /// Check internal coherence of the flag combination.
    ///
    /// `name` is only used to label the error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidMetadata`] when:
    /// - neither or both of `Independent`/`Derived` are set,
    /// - `Sparse` and `OneCopy` are combined,
    /// - `Face` placement lacks `OneCopy` or carries `FillGhost`,
    /// - any shape extent is zero.
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| {
            Err(ConfigError::InvalidMetadata {
                name: name.to_string(),
                reason: reason.to_string(),
            })
        };

        let independent = self.is_set(MetadataFlag::Independent);
        let derived = self.is_set(MetadataFlag::Derived);
        if independent == derived {
            return invalid("exactly one of Independent/Derived must be set");
        }
        if self.is_set(MetadataFlag::Sparse) && self.is_set(MetadataFlag::OneCopy) {
            return invalid("Sparse and OneCopy are mutually exclusive");
        }
        if self.placement == Placement::Face {
            if !self.is_set(MetadataFlag::OneCopy) {
                return invalid("face variables require OneCopy");
            }
            if self.is_set(MetadataFlag::FillGhost) {
                return invalid("face variables cannot FillGhost");
            }
        }
        if self.shape.iter().any(|&n| n == 0) {
            return invalid("shape extents must be nonzero");
        }
        Ok(())
    }
}
