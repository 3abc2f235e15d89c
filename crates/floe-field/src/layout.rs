//! Per-block cell geometry: interior extents, ghost width, coarse mirrors.

use floe_core::ConfigError;
use std::ops::Range;

/// The three logical axes of a block, innermost first.
///
/// Storage is row-major with `X1` fastest, so a loop nest reads
/// `for k in x3 { for j in x2 { for i in x1 { .. } } }`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Innermost (fastest-varying) axis.
    X1,
    /// Middle axis.
    X2,
    /// Outermost axis.
    X3,
}

impl Axis {
    /// All axes, innermost first.
    pub const ALL: [Axis; 3] = [Axis::X1, Axis::X2, Axis::X3];

    /// Index of this axis into `[x1, x2, x3]`-ordered arrays.
    pub fn index(self) -> usize {
        match self {
            Axis::X1 => 0,
            Axis::X2 => 1,
            Axis::X3 => 2,
        }
    }
}

/// Which cells of an axis a range should cover.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexDomain {
    /// Only the block-owned cells, excluding ghosts.
    Interior,
    /// Owned cells plus the ghost layers on both sides.
    Entire,
}

/// The cell geometry shared by every variable on one mesh block.
///
/// Interior extents of 1 collapse an axis: a 2D block is `(nx1, nx2, 1)`
/// and a 1D block `(nx1, 1, 1)`. Collapsed axes carry no ghost layers and
/// never appear in exchange geometry. All blocks of a mesh share one
/// layout; refinement changes a block's physical cell size, not its cell
/// counts.
///
/// When `multilevel` is set, every cell variable additionally carries a
/// coarse mirror buffer (half resolution plus ghosts) that receives data
/// from coarser neighbors ahead of prolongation; this requires the active
/// interior extents to be even and at least twice the ghost width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockLayout {
    nx: [usize; 3],
    ng: usize,
    multilevel: bool,
}

impl BlockLayout {
    /// Validate and build a layout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidLayout`] when the ghost width is
    /// zero, `nx1` is collapsed, a collapsed axis precedes an active one,
    /// an active extent is smaller than the ghost width, or (multilevel
    /// only) an active extent is odd or smaller than twice the ghost
    /// width.
    pub fn new(
        nx1: usize,
        nx2: usize,
        nx3: usize,
        ng: usize,
        multilevel: bool,
    ) -> Result<Self, ConfigError> {
        let invalid = |reason: String| Err(ConfigError::InvalidLayout { reason });

        if ng == 0 {
            return invalid("ghost width must be at least 1".to_string());
        }
        if nx1 < 2 {
            return invalid(format!("nx1 = {nx1}; the first axis must be active"));
        }
        if nx2 == 1 && nx3 > 1 {
            return invalid("x3 cannot be active while x2 is collapsed".to_string());
        }
        for (axis, &nx) in ["nx1", "nx2", "nx3"].iter().zip(&[nx1, nx2, nx3]) {
            if nx == 0 {
                return invalid(format!("{axis} must be at least 1"));
            }
            if nx == 1 {
                continue;
            }
            if multilevel {
                if nx % 2 != 0 {
                    return invalid(format!("{axis} = {nx} must be even on a multilevel mesh"));
                }
                if nx < 2 * ng {
                    return invalid(format!(
                        "{axis} = {nx} is below 2*ng = {} required for restriction",
                        2 * ng
                    ));
                }
            } else if nx < ng {
                return invalid(format!("{axis} = {nx} is below the ghost width {ng}"));
            }
        }
        Ok(Self {
            nx: [nx1, nx2, nx3],
            ng,
            multilevel,
        })
    }

    /// Ghost width on active axes.
    pub fn nghost(&self) -> usize {
        self.ng
    }

    /// Whether coarse mirror buffers exist on this mesh.
    pub fn multilevel(&self) -> bool {
        self.multilevel
    }

    /// Whether `axis` has more than one interior cell.
    pub fn is_active(&self, axis: Axis) -> bool {
        self.nx[axis.index()] > 1
    }

    /// Interior extent of `axis` (1 on collapsed axes).
    pub fn interior_extent(&self, axis: Axis) -> usize {
        self.nx[axis.index()]
    }

    /// Cell-index range of `axis` over the given domain.
    ///
    /// Collapsed axes always yield `0..1`.
    pub fn range(&self, axis: Axis, domain: IndexDomain) -> Range<usize> {
        let nx = self.nx[axis.index()];
        if nx == 1 {
            return 0..1;
        }
        match domain {
            IndexDomain::Interior => self.ng..self.ng + nx,
            IndexDomain::Entire => 0..nx + 2 * self.ng,
        }
    }

    /// Extent of `axis` over the given domain.
    pub fn extent(&self, axis: Axis, domain: IndexDomain) -> usize {
        self.range(axis, domain).len()
    }

    /// Total cell count over the given domain.
    pub fn cell_count(&self, domain: IndexDomain) -> usize {
        Axis::ALL.iter().map(|&a| self.extent(a, domain)).product()
    }

    /// The half-resolution layout of the coarse mirror buffers, or `None`
    /// on a single-level mesh.
    ///
    /// The coarse layout keeps the ghost width and halves active interior
    /// extents; it is itself single-level.
    pub fn coarse(&self) -> Option<BlockLayout> {
        if !self.multilevel {
            return None;
        }
        let halve = |nx: usize| if nx > 1 { nx / 2 } else { 1 };
        Some(Self {
            nx: [halve(self.nx[0]), halve(self.nx[1]), halve(self.nx[2])],
            ng: self.ng,
            multilevel: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_ghost_width() {
        assert!(BlockLayout::new(4, 4, 1, 0, false).is_err());
    }

    #[test]
    fn rejects_collapsed_first_axis() {
        assert!(BlockLayout::new(1, 4, 1, 2, false).is_err());
    }

    #[test]
    fn rejects_gap_in_active_axes() {
        assert!(BlockLayout::new(4, 1, 4, 2, false).is_err());
    }

    #[test]
    fn rejects_odd_extents_on_multilevel() {
        assert!(BlockLayout::new(6, 5, 1, 2, true).is_err());
        assert!(BlockLayout::new(6, 4, 1, 2, true).is_ok());
    }

    #[test]
    fn rejects_extent_below_restriction_depth() {
        // multilevel needs nx >= 2*ng so a 2*ng-deep slab can be restricted.
        assert!(BlockLayout::new(2, 1, 1, 2, true).is_err());
        assert!(BlockLayout::new(4, 1, 1, 2, true).is_ok());
    }

    #[test]
    fn ranges_cover_interior_and_entire() {
        let layout = BlockLayout::new(4, 6, 1, 2, false).unwrap();
        assert_eq!(layout.range(Axis::X1, IndexDomain::Interior), 2..6);
        assert_eq!(layout.range(Axis::X1, IndexDomain::Entire), 0..8);
        assert_eq!(layout.range(Axis::X2, IndexDomain::Interior), 2..8);
        assert_eq!(layout.range(Axis::X3, IndexDomain::Interior), 0..1);
        assert_eq!(layout.range(Axis::X3, IndexDomain::Entire), 0..1);
        assert_eq!(layout.cell_count(IndexDomain::Entire), 8 * 10);
    }

    #[test]
    fn coarse_layout_halves_active_extents() {
        let layout = BlockLayout::new(8, 4, 1, 2, true).unwrap();
        let coarse = layout.coarse().unwrap();
        assert_eq!(coarse.interior_extent(Axis::X1), 4);
        assert_eq!(coarse.interior_extent(Axis::X2), 2);
        assert_eq!(coarse.interior_extent(Axis::X3), 1);
        assert_eq!(coarse.nghost(), 2);
        assert!(!coarse.multilevel());

        let flat = BlockLayout::new(8, 4, 1, 2, false).unwrap();
        assert!(flat.coarse().is_none());
    }
}
