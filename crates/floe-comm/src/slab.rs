//! Exchange windows: which cells a neighbor relationship covers.
//!
//! Every function here maps a block layout and a face to a [`Slab`] in
//! entire-domain indexing (ghosts included, x1 fastest). The sender
//! extracts its window, the receiver inserts into its own, and the two
//! windows always cover the same number of values:
//!
//! - same level: interior band of depth `ng` ↔ ghost band of depth `ng`;
//! - fine → coarse: a `2*ng`-deep interior band restricted 2:1 ↔ half of
//!   the coarse ghost band, selected by the neighbor offset;
//! - coarse → fine: half of the coarse interior band ↔ the full ghost
//!   band of the fine block's coarse mirror;
//! - flux correction: the boundary face plane of the fine flux buffer,
//!   restricted transversely ↔ half of the coarse face plane.
//!
//! Size agreement relies on every block sharing one interior extent and
//! ghost width per axis, which the mesh guarantees by construction.

use crate::topology::Face;
use floe_core::Real;
use floe_field::{Axis, BlockLayout, Buffer, IndexDomain, Slab};
use std::ops::Range;

fn transverse_range(layout: &BlockLayout, axis: Axis, half: Option<usize>) -> Range<usize> {
    if !layout.is_active(axis) {
        return 0..1;
    }
    let interior = layout.range(axis, IndexDomain::Interior);
    match half {
        None => interior,
        Some(o) => {
            let width = interior.len() / 2;
            interior.start + o * width..interior.start + (o + 1) * width
        }
    }
}

fn band(layout: &BlockLayout, face: Face, depth: usize, ghost: bool) -> Range<usize> {
    debug_assert!(layout.is_active(face.axis()), "face {face} on a collapsed axis");
    let interior = layout.range(face.axis(), IndexDomain::Interior);
    match (face.is_upper(), ghost) {
        (false, false) => interior.start..interior.start + depth,
        (false, true) => interior.start - depth..interior.start,
        (true, false) => interior.end - depth..interior.end,
        (true, true) => interior.end..interior.end + depth,
    }
}

fn plane(layout: &BlockLayout, face: Face) -> Range<usize> {
    debug_assert!(layout.is_active(face.axis()), "face {face} on a collapsed axis");
    let interior = layout.range(face.axis(), IndexDomain::Interior);
    if face.is_upper() {
        interior.end..interior.end + 1
    } else {
        interior.start..interior.start + 1
    }
}

fn face_slab(
    layout: &BlockLayout,
    face: Face,
    ncomp: usize,
    normal: Range<usize>,
    halves: [Option<usize>; 2],
) -> Slab {
    let [ta, tb] = face.transverse();
    let mut ranges = [0..1, 0..1, 0..1];
    ranges[face.axis().index()] = normal;
    ranges[ta.index()] = transverse_range(layout, ta, halves[0]);
    ranges[tb.index()] = transverse_range(layout, tb, halves[1]);
    let [x1, x2, x3] = ranges;
    Slab {
        c: 0..ncomp,
        x3,
        x2,
        x1,
    }
}

/// Interior band of depth `ng` adjacent to `face` — what a same-level
/// sender extracts.
pub fn interior_slab(layout: &BlockLayout, face: Face, ncomp: usize) -> Slab {
    let band = band(layout, face, layout.nghost(), false);
    face_slab(layout, face, ncomp, band, [None, None])
}

/// Ghost band of depth `ng` beyond `face` — where a receiver inserts
/// same-level data, and what gets default-filled for an unallocated peer.
pub fn ghost_slab(layout: &BlockLayout, face: Face, ncomp: usize) -> Slab {
    let band = band(layout, face, layout.nghost(), true);
    face_slab(layout, face, ncomp, band, [None, None])
}

/// Interior band of depth `2*ng` adjacent to `face` — the fine-side
/// source that a 2:1 restriction turns into `ng` coarse layers.
pub fn restricted_source_slab(layout: &BlockLayout, face: Face, ncomp: usize) -> Slab {
    let band = band(layout, face, 2 * layout.nghost(), false);
    face_slab(layout, face, ncomp, band, [None, None])
}

/// Interior band of depth `ng` adjacent to `face`, restricted to the
/// transverse halves under a finer neighbor at `offset` — what a coarse
/// sender extracts for that neighbor's coarse mirror.
pub fn half_source_slab(
    layout: &BlockLayout,
    face: Face,
    offset: [usize; 2],
    ncomp: usize,
) -> Slab {
    let band = band(layout, face, layout.nghost(), false);
    face_slab(layout, face, ncomp, band, [Some(offset[0]), Some(offset[1])])
}

/// Ghost band beyond `face`, restricted to the transverse halves under a
/// finer neighbor at `offset` — where a coarse receiver inserts that
/// neighbor's restricted data.
pub fn ghost_half_slab(
    layout: &BlockLayout,
    face: Face,
    offset: [usize; 2],
    ncomp: usize,
) -> Slab {
    let band = band(layout, face, layout.nghost(), true);
    face_slab(layout, face, ncomp, band, [Some(offset[0]), Some(offset[1])])
}

/// The single plane of boundary faces at `face` in a flux buffer.
///
/// Face `i` sits between cells `i-1` and `i`, so the lower boundary plane
/// is at the interior start and the upper one at the interior end.
pub fn flux_plane_slab(layout: &BlockLayout, face: Face, ncomp: usize) -> Slab {
    face_slab(layout, face, ncomp, plane(layout, face), [None, None])
}

/// The boundary face plane at `face`, restricted to the transverse halves
/// under a finer neighbor at `offset` — where a coarse receiver overwrites
/// its fluxes with restricted fine fluxes.
pub fn flux_half_plane_slab(
    layout: &BlockLayout,
    face: Face,
    offset: [usize; 2],
    ncomp: usize,
) -> Slab {
    let plane = plane(layout, face);
    face_slab(layout, face, ncomp, plane, [Some(offset[0]), Some(offset[1])])
}

/// Per-axis 2:1 factors for restricting cell data: 2 on active axes, 1 on
/// collapsed ones. Indexed like [`Axis::index`].
pub fn ghost_restriction(layout: &BlockLayout) -> [usize; 3] {
    let f = |axis: Axis| if layout.is_active(axis) { 2 } else { 1 };
    [f(Axis::X1), f(Axis::X2), f(Axis::X3)]
}

/// Per-axis factors for restricting a flux plane: 2 on active transverse
/// axes, 1 along the face normal and on collapsed axes.
pub fn flux_restriction(layout: &BlockLayout, face: Face) -> [usize; 3] {
    let mut factor = ghost_restriction(layout);
    factor[face.axis().index()] = 1;
    factor
}

/// Average `factor`-sized boxes of `source` down to one value each.
///
/// The output is row-major over the coarsened extents, matching what the
/// coarse receiver's insertion window expects. Every range length must be
/// divisible by its factor.
pub fn restrict(buffer: &Buffer, source: &Slab, factor: [usize; 3]) -> Vec<Real> {
    let [f1, f2, f3] = factor;
    debug_assert_eq!(source.x1.len() % f1, 0);
    debug_assert_eq!(source.x2.len() % f2, 0);
    debug_assert_eq!(source.x3.len() % f3, 0);
    let n1 = source.x1.len() / f1;
    let n2 = source.x2.len() / f2;
    let n3 = source.x3.len() / f3;
    let weight = 1.0 / (f1 * f2 * f3) as Real;

    let mut out = Vec::with_capacity(source.c.len() * n3 * n2 * n1);
    for c in source.c.clone() {
        for kc in 0..n3 {
            for jc in 0..n2 {
                for ic in 0..n1 {
                    let mut sum = 0.0;
                    for dk in 0..f3 {
                        for dj in 0..f2 {
                            for di in 0..f1 {
                                sum += buffer.at(
                                    c,
                                    source.x3.start + kc * f3 + dk,
                                    source.x2.start + jc * f2 + dj,
                                    source.x1.start + ic * f1 + di,
                                );
                            }
                        }
                    }
                    out.push(sum * weight);
                }
            }
        }
    }
    out
}
