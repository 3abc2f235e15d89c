//! Dense row-major storage for field data.

use floe_core::Real;
use std::ops::Range;

/// A rectangular window into a [`Buffer`], as half-open ranges per axis.
///
/// Extraction and insertion traverse the window row-major in the same
/// `(c, k, j, i)` order the buffer itself uses, so a slab extracted on one
/// block lands in the matching orientation when inserted on a neighbor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slab {
    /// Component range.
    pub c: Range<usize>,
    /// Range along the outermost axis.
    pub x3: Range<usize>,
    /// Range along the middle axis.
    pub x2: Range<usize>,
    /// Range along the innermost axis.
    pub x1: Range<usize>,
}

impl Slab {
    /// Number of values the window covers.
    pub fn len(&self) -> usize {
        self.c.len() * self.x3.len() * self.x2.len() * self.x1.len()
    }

    /// Whether the window covers no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-axis extents as `(c, x3, x2, x1)`.
    pub fn extents(&self) -> (usize, usize, usize, usize) {
        (self.c.len(), self.x3.len(), self.x2.len(), self.x1.len())
    }
}

/// Dense row-major `[ncomp][n3][n2][n1]` storage of [`Real`] values.
///
/// This is the host realization of field storage. The innermost axis is
/// contiguous; [`comp`](Buffer::comp) hands out one component's cells as
/// a flat slice for kernel-style iteration.
#[derive(Clone, Debug, PartialEq)]
pub struct Buffer {
    ncomp: usize,
    n3: usize,
    n2: usize,
    n1: usize,
    data: Vec<Real>,
}

impl Buffer {
    /// Allocate a buffer filled with `value`.
    pub fn filled(ncomp: usize, n3: usize, n2: usize, n1: usize, value: Real) -> Self {
        Self {
            ncomp,
            n3,
            n2,
            n1,
            data: vec![value; ncomp * n3 * n2 * n1],
        }
    }

    /// Allocate a zero-filled buffer.
    pub fn zeros(ncomp: usize, n3: usize, n2: usize, n1: usize) -> Self {
        Self::filled(ncomp, n3, n2, n1, 0.0)
    }

    /// Extents as `(ncomp, n3, n2, n1)`.
    pub fn extents(&self) -> (usize, usize, usize, usize) {
        (self.ncomp, self.n3, self.n2, self.n1)
    }

    /// Total number of stored values.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer stores no values.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn index(&self, c: usize, k: usize, j: usize, i: usize) -> usize {
        ((c * self.n3 + k) * self.n2 + j) * self.n1 + i
    }

    /// Value at `(c, k, j, i)`.
    pub fn at(&self, c: usize, k: usize, j: usize, i: usize) -> Real {
        self.data[self.index(c, k, j, i)]
    }

    /// Mutable value at `(c, k, j, i)`.
    pub fn at_mut(&mut self, c: usize, k: usize, j: usize, i: usize) -> &mut Real {
        let idx = self.index(c, k, j, i);
        &mut self.data[idx]
    }

    /// All values of component `c` as a flat `[n3][n2][n1]` slice.
    pub fn comp(&self, c: usize) -> &[Real] {
        let cells = self.n3 * self.n2 * self.n1;
        &self.data[c * cells..(c + 1) * cells]
    }

    /// Mutable view of component `c`.
    pub fn comp_mut(&mut self, c: usize) -> &mut [Real] {
        let cells = self.n3 * self.n2 * self.n1;
        &mut self.data[c * cells..(c + 1) * cells]
    }

    /// The whole buffer as a flat slice.
    pub fn as_slice(&self) -> &[Real] {
        &self.data
    }

    /// The whole buffer as a mutable flat slice.
    pub fn as_mut_slice(&mut self) -> &mut [Real] {
        &mut self.data
    }

    /// Overwrite every value with `value`.
    pub fn fill(&mut self, value: Real) {
        self.data.fill(value);
    }

    /// Copy the window `slab` out into a fresh row-major vector.
    pub fn extract(&self, slab: &Slab) -> Vec<Real> {
        let mut out = Vec::with_capacity(slab.len());
        for c in slab.c.clone() {
            for k in slab.x3.clone() {
                for j in slab.x2.clone() {
                    let row = self.index(c, k, j, slab.x1.start);
                    out.extend_from_slice(&self.data[row..row + slab.x1.len()]);
                }
            }
        }
        out
    }

    /// Copy `src` (row-major, matching `slab`'s extents) into the window.
    pub fn insert(&mut self, slab: &Slab, src: &[Real]) {
        debug_assert_eq!(src.len(), slab.len());
        let width = slab.x1.len();
        let mut offset = 0;
        for c in slab.c.clone() {
            for k in slab.x3.clone() {
                for j in slab.x2.clone() {
                    let row = self.index(c, k, j, slab.x1.start);
                    self.data[row..row + width].copy_from_slice(&src[offset..offset + width]);
                    offset += width;
                }
            }
        }
    }

    /// Overwrite the window with `value`.
    pub fn fill_slab(&mut self, slab: &Slab, value: Real) {
        let width = slab.x1.len();
        for c in slab.c.clone() {
            for k in slab.x3.clone() {
                for j in slab.x2.clone() {
                    let row = self.index(c, k, j, slab.x1.start);
                    self.data[row..row + width].fill(value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_buffer(ncomp: usize, n3: usize, n2: usize, n1: usize) -> Buffer {
        let mut b = Buffer::zeros(ncomp, n3, n2, n1);
        for (idx, v) in b.as_mut_slice().iter_mut().enumerate() {
            *v = idx as Real;
        }
        b
    }

    #[test]
    fn indexing_is_row_major_x1_fastest() {
        let b = counting_buffer(2, 2, 3, 4);
        assert_eq!(b.at(0, 0, 0, 0), 0.0);
        assert_eq!(b.at(0, 0, 0, 1), 1.0);
        assert_eq!(b.at(0, 0, 1, 0), 4.0);
        assert_eq!(b.at(0, 1, 0, 0), 12.0);
        assert_eq!(b.at(1, 0, 0, 0), 24.0);
    }

    #[test]
    fn comp_slices_partition_the_data() {
        let b = counting_buffer(2, 1, 2, 2);
        assert_eq!(b.comp(0), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(b.comp(1), &[4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn extract_insert_roundtrip_at_offset() {
        let src = counting_buffer(1, 1, 4, 4);
        let window = Slab {
            c: 0..1,
            x3: 0..1,
            x2: 1..3,
            x1: 2..4,
        };
        let slab = src.extract(&window);
        assert_eq!(slab, vec![6.0, 7.0, 10.0, 11.0]);

        let mut dst = Buffer::zeros(1, 1, 4, 4);
        let target = Slab {
            c: 0..1,
            x3: 0..1,
            x2: 0..2,
            x1: 0..2,
        };
        dst.insert(&target, &slab);
        assert_eq!(dst.at(0, 0, 0, 0), 6.0);
        assert_eq!(dst.at(0, 0, 0, 1), 7.0);
        assert_eq!(dst.at(0, 0, 1, 0), 10.0);
        assert_eq!(dst.at(0, 0, 1, 1), 11.0);
        assert_eq!(dst.at(0, 0, 2, 2), 0.0);
    }

    #[test]
    fn fill_slab_touches_only_the_window() {
        let mut b = Buffer::zeros(1, 1, 3, 3);
        let window = Slab {
            c: 0..1,
            x3: 0..1,
            x2: 0..3,
            x1: 0..1,
        };
        b.fill_slab(&window, 9.0);
        assert_eq!(b.at(0, 0, 0, 0), 9.0);
        assert_eq!(b.at(0, 0, 1, 0), 9.0);
        assert_eq!(b.at(0, 0, 2, 0), 9.0);
        assert_eq!(b.at(0, 0, 0, 1), 0.0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_dims() -> impl Strategy<Value = (usize, usize, usize, usize)> {
            (1usize..3, 1usize..3, 1usize..6, 1usize..6)
        }

        proptest! {
            #[test]
            fn extract_len_matches_window(
                (ncomp, n3, n2, n1) in arb_dims(),
                seed in 0u32..1000,
            ) {
                let b = counting_buffer(ncomp, n3, n2, n1);
                // Derive a window deterministically from the seed.
                let pick = |extent: usize, s: u32| {
                    let start = (s as usize) % extent;
                    let end = start + 1 + ((s as usize / 7) % (extent - start));
                    start..end.min(extent)
                };
                let window = Slab {
                    c: pick(ncomp, seed),
                    x3: pick(n3, seed / 3),
                    x2: pick(n2, seed / 5),
                    x1: pick(n1, seed / 11),
                };
                prop_assert_eq!(b.extract(&window).len(), window.len());
            }

            #[test]
            fn insert_then_extract_is_identity(
                (ncomp, n3, n2, n1) in arb_dims(),
                value in -1e6f64..1e6,
            ) {
                let window = Slab { c: 0..ncomp, x3: 0..n3, x2: 0..n2, x1: 0..n1 };
                let src = vec![value; window.len()];
                let mut b = Buffer::zeros(ncomp, n3, n2, n1);
                b.insert(&window, &src);
                prop_assert_eq!(b.extract(&window), src);
            }
        }
    }
}
