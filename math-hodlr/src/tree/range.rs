//! Contiguous index ranges and the bisection rule

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Half-open interval `[start, start + len)` of tree-ordered indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IndexRange {
    /// First index
    pub start: usize,
    /// Number of indices
    pub len: usize,
}

impl IndexRange {
    /// Create a range
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// One past the last index
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Whether the range holds no index
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `index` lies inside the range
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end()
    }

    /// Split into (left, right) with `len / 2` indices on the left
    ///
    /// The right half takes the extra index when `len` is odd. The k-d
    /// reordering uses the same rule.
    pub fn split(&self) -> (IndexRange, IndexRange) {
        let left = self.len / 2;
        (
            IndexRange::new(self.start, left),
            IndexRange::new(self.start + left, self.len - left),
        )
    }
}

impl std::fmt::Display for IndexRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end())
    }
}
