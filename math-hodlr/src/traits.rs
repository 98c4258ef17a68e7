//! Core traits
//!
//! - [`EntrySource`]: the matrix being approximated, queried entry by entry
//!   or block by block. The tree only ever borrows it.

use ndarray::{Array2, s};

/// Read-only access to the entries of an N x N matrix.
///
/// Implementations must be deterministic and free of side effects: parallel
/// subtree construction queries the same source from several threads at once,
/// hence the `Sync` bound.
///
/// Any reordering of the underlying points must already be applied; the tree
/// treats index `i` as the i-th row / column as given.
pub trait EntrySource: Sync {
    /// Matrix dimension N
    fn size(&self) -> usize;

    /// Entry A[i, j]
    fn entry(&self, i: usize, j: usize) -> f64;

    /// Dense block A[row_start.., col_start..] of shape `num_rows x num_cols`
    ///
    /// The default assembles the block from [`EntrySource::entry`]; override
    /// it when a bulk evaluation is cheaper.
    fn block(
        &self,
        row_start: usize,
        col_start: usize,
        num_rows: usize,
        num_cols: usize,
    ) -> Array2<f64> {
        Array2::from_shape_fn((num_rows, num_cols), |(i, j)| {
            self.entry(row_start + i, col_start + j)
        })
    }

    /// Fully materialized matrix, O(N^2). Meant for validation only.
    fn dense(&self) -> Array2<f64> {
        let n = self.size();
        self.block(0, 0, n, n)
    }
}

impl EntrySource for Array2<f64> {
    fn size(&self) -> usize {
        self.nrows()
    }

    #[inline]
    fn entry(&self, i: usize, j: usize) -> f64 {
        self[[i, j]]
    }

    fn block(
        &self,
        row_start: usize,
        col_start: usize,
        num_rows: usize,
        num_cols: usize,
    ) -> Array2<f64> {
        self.slice(s![
            row_start..row_start + num_rows,
            col_start..col_start + num_cols
        ])
        .to_owned()
    }
}
