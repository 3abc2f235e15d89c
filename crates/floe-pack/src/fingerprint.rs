//! Allocation fingerprints for pack invalidation.

use smallvec::SmallVec;

/// Snapshot of a selection's allocation state, one bit per variable.
///
/// Bits are pushed in selection order, so two fingerprints of the same
/// selection compare equal exactly when every member had the same
/// allocation state both times. The fingerprint is owned and compared by
/// equality; it stays valid after the variables it was taken from change,
/// which is what lets a cache detect that they changed.
///
/// Up to 64 variables fit inline without a heap allocation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct AllocFingerprint {
    len: usize,
    words: SmallVec<[u64; 1]>,
}

impl AllocFingerprint {
    /// An empty fingerprint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one variable's allocation bit.
    pub fn push(&mut self, allocated: bool) {
        let word = self.len / 64;
        let bit = self.len % 64;
        if word == self.words.len() {
            self.words.push(0);
        }
        if allocated {
            self.words[word] |= 1 << bit;
        }
        self.len += 1;
    }

    /// The bit at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<bool> {
        if index >= self.len {
            return None;
        }
        Some(self.words[index / 64] & (1 << (index % 64)) != 0)
    }

    /// Number of bits recorded.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no bits have been recorded.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate the bits in push order.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.words[i / 64] & (1 << (i % 64)) != 0)
    }

    /// Number of set bits.
    pub fn count_allocated(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

impl FromIterator<bool> for AllocFingerprint {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut fp = Self::new();
        for bit in iter {
            fp.push(bit);
        }
        fp
    }
}
