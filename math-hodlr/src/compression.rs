//! Low-rank compression of off-diagonal blocks
//!
//! A [`LowRankCompressor`] turns a block A[rows, cols] of an [`EntrySource`]
//! into thin factors U (m x r), V (n x r) with A ≈ U V^T. The shipped
//! compressor is adaptive cross approximation with partial pivoting
//! ([`AcaCompressor`]): it samples one row and one column of the residual per
//! rank step and never reads the full block.

use crate::blas_helpers::norm_sqr;
use crate::error::{HodlrError, Result};
use crate::traits::EntrySource;
use crate::tree::IndexRange;
use ndarray::{Array1, Array2, ArrayView2};

/// Thin factor pair with A[rows, cols] ≈ U V^T
#[derive(Debug, Clone)]
pub struct LowRankBlock {
    /// Left factor, one row per block row
    pub u: Array2<f64>,
    /// Right factor, one row per block column
    pub v: Array2<f64>,
}

impl LowRankBlock {
    /// Rank-zero block of the given shape
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            u: Array2::zeros((rows, 0)),
            v: Array2::zeros((cols, 0)),
        }
    }

    /// Assemble from rank-one terms u_k v_k^T
    pub fn from_terms(rows: usize, cols: usize, us: &[Array1<f64>], vs: &[Array1<f64>]) -> Self {
        let rank = us.len();
        Self {
            u: Array2::from_shape_fn((rows, rank), |(i, k)| us[k][i]),
            v: Array2::from_shape_fn((cols, rank), |(j, k)| vs[k][j]),
        }
    }

    /// Number of rank-one terms
    pub fn rank(&self) -> usize {
        self.u.ncols()
    }

    /// Block shape (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.u.nrows(), self.v.nrows())
    }

    /// The transposed block, V U^T
    pub fn transposed(&self) -> Self {
        Self {
            u: self.v.clone(),
            v: self.u.clone(),
        }
    }

    /// U (V^T x) for a block of columns x
    pub fn apply(&self, x: ArrayView2<f64>) -> Array2<f64> {
        self.u.dot(&self.v.t().dot(&x))
    }

    /// Dense U V^T. Only meant for inspection and tests.
    pub fn to_dense(&self) -> Array2<f64> {
        self.u.dot(&self.v.t())
    }

    /// Number of stored scalars
    pub fn stored_entries(&self) -> usize {
        self.u.len() + self.v.len()
    }
}

/// The newest term underestimates the residual, so terms are compared one
/// decade below the requested tolerance
const TERM_SAFETY: f64 = 0.1;

/// Residual rows and columns sampled before a block is accepted
const CHECK_SAMPLES: usize = 8;

/// Strategy for approximating an off-diagonal block within a tolerance
pub trait LowRankCompressor: Sync {
    /// Approximate `source[rows, cols]` to relative accuracy `tolerance`
    fn compress<S: EntrySource + ?Sized>(
        &self,
        source: &S,
        rows: IndexRange,
        cols: IndexRange,
        tolerance: f64,
    ) -> Result<LowRankBlock>;
}

/// Adaptive cross approximation with partial pivoting
///
/// Each step takes the residual row at the current pivot row, picks the
/// largest unused column in it, takes that residual column, and adds the
/// resulting rank-one cross. The cross phase ends once two consecutive terms
/// fall below `tolerance / 10` times the running Frobenius-norm estimate of
/// the approximation, or when the residual row it lands on vanishes.
///
/// Before a block is accepted, up to eight residual rows and eight residual
/// columns spread over the block (first and last included) are checked
/// against `tolerance`. A sample that fails supplies the next pivot and the
/// cross phase resumes. Blocks whose only entries sit away from the first
/// rows, such as the corner coupling of a banded matrix, are found this way.
#[derive(Debug, Clone, Default)]
pub struct AcaCompressor {
    /// Rank ceiling; `None` means min(m, n)
    pub max_rank: Option<usize>,
}

impl AcaCompressor {
    /// ACA without rank ceiling
    pub fn new() -> Self {
        Self::default()
    }

    /// ACA that gives up after `max_rank` terms
    pub fn with_max_rank(max_rank: usize) -> Self {
        Self {
            max_rank: Some(max_rank),
        }
    }
}

impl LowRankCompressor for AcaCompressor {
    fn compress<S: EntrySource + ?Sized>(
        &self,
        source: &S,
        rows: IndexRange,
        cols: IndexRange,
        tolerance: f64,
    ) -> Result<LowRankBlock> {
        let (m, n) = (rows.len, cols.len);
        if m == 0 || n == 0 {
            return Ok(LowRankBlock::zeros(m, n));
        }
        let full_rank = m.min(n);
        let max_rank = self.max_rank.map_or(full_rank, |r| r.min(full_rank));
        let term_tol_sqr = (TERM_SAFETY * tolerance).powi(2);

        let mut cross = Cross::new(source, rows, cols, tolerance, max_rank);
        let mut unused_rows = vec![true; m];
        let mut unused_cols = vec![true; n];
        let mut next_row = Some(0);
        let mut small_terms = 0;

        // Using all rows (or all columns) reproduces the block exactly
        while cross.rank() < full_rank {
            let pivot_row = match next_row {
                Some(i) => i,
                None => match cross.unresolved_row(&unused_rows, &unused_cols)? {
                    Some(i) => i,
                    None => break,
                },
            };
            unused_rows[pivot_row] = false;

            let row = cross.residual_row(pivot_row)?;
            let Some(pivot_col) = argmax_masked(&row, &unused_cols) else {
                // Row already reproduced
                next_row = None;
                continue;
            };
            if cross.rank() == max_rank {
                if cross.row_within_tolerance(&row) {
                    next_row = None;
                    continue;
                }
                return Err(cross.unattainable());
            }
            unused_cols[pivot_col] = false;

            let v_new = &row / row[pivot_col];
            let term_sqr = cross.push(v_new, pivot_col)?;
            if term_sqr <= term_tol_sqr * cross.norm_sqr {
                small_terms += 1;
            } else {
                small_terms = 0;
            }
            next_row = if small_terms >= 2 {
                None
            } else {
                cross.last_column().and_then(|u| argmax_masked(u, &unused_rows))
            };
        }

        log::trace!(
            "ACA {}x{} block at ({}, {}): rank {}",
            m,
            n,
            rows.start,
            cols.start,
            cross.rank()
        );
        Ok(LowRankBlock::from_terms(m, n, &cross.us, &cross.vs))
    }
}

/// Rank-one terms accumulated so far, with residual access to the block
struct Cross<'a, S: ?Sized> {
    source: &'a S,
    rows: IndexRange,
    cols: IndexRange,
    tolerance: f64,
    max_rank: usize,
    us: Vec<Array1<f64>>,
    vs: Vec<Array1<f64>>,
    /// Running estimate of ||U V^T||_F^2
    norm_sqr: f64,
}

impl<'a, S: EntrySource + ?Sized> Cross<'a, S> {
    fn new(
        source: &'a S,
        rows: IndexRange,
        cols: IndexRange,
        tolerance: f64,
        max_rank: usize,
    ) -> Self {
        Self {
            source,
            rows,
            cols,
            tolerance,
            max_rank,
            us: Vec::new(),
            vs: Vec::new(),
            norm_sqr: 0.0,
        }
    }

    fn rank(&self) -> usize {
        self.us.len()
    }

    fn last_column(&self) -> Option<&Array1<f64>> {
        self.us.last()
    }

    /// Row i of A[rows, cols] - U V^T
    fn residual_row(&self, i: usize) -> Result<Array1<f64>> {
        let mut row = self
            .source
            .block(self.rows.start + i, self.cols.start, 1, self.cols.len)
            .row(0)
            .to_owned();
        for (u, v) in self.us.iter().zip(&self.vs) {
            row.scaled_add(-u[i], v);
        }
        self.finite(row)
    }

    /// Column j of A[rows, cols] - U V^T
    fn residual_column(&self, j: usize) -> Result<Array1<f64>> {
        let mut column = self
            .source
            .block(self.rows.start, self.cols.start + j, self.rows.len, 1)
            .column(0)
            .to_owned();
        for (u, v) in self.us.iter().zip(&self.vs) {
            column.scaled_add(-v[j], u);
        }
        self.finite(column)
    }

    fn finite(&self, data: Array1<f64>) -> Result<Array1<f64>> {
        if data.iter().all(|x| x.is_finite()) {
            Ok(data)
        } else {
            Err(self.unattainable())
        }
    }

    fn unattainable(&self) -> HodlrError {
        HodlrError::ToleranceUnattainable {
            rows: self.rows.len,
            cols: self.cols.len,
            max_rank: self.max_rank,
            tolerance: self.tolerance,
        }
    }

    /// Add the cross through `pivot_col` with scaled row `v_new`; returns the
    /// squared norm of the new term
    fn push(&mut self, v_new: Array1<f64>, pivot_col: usize) -> Result<f64> {
        let u_new = self.residual_column(pivot_col)?;

        // ||A_k||_F^2 = ||A_{k-1}||_F^2 + 2 sum <u_l, u_k><v_l, v_k> + ||u_k||^2 ||v_k||^2
        let term_sqr = norm_sqr(&u_new) * norm_sqr(&v_new);
        let cross: f64 = self
            .us
            .iter()
            .zip(&self.vs)
            .map(|(u, v)| u.dot(&u_new) * v.dot(&v_new))
            .sum();
        self.norm_sqr += term_sqr + 2.0 * cross;

        self.us.push(u_new);
        self.vs.push(v_new);
        Ok(term_sqr)
    }

    /// A residual row of an m-row block stands for 1/m of the residual's
    /// squared Frobenius norm
    fn row_within_tolerance(&self, row: &Array1<f64>) -> bool {
        self.rows.len as f64 * norm_sqr(row) <= self.tolerance.powi(2) * self.norm_sqr
    }

    fn column_within_tolerance(&self, column: &Array1<f64>) -> bool {
        self.cols.len as f64 * norm_sqr(column) <= self.tolerance.powi(2) * self.norm_sqr
    }

    /// Sample residual rows, then columns, and return a row to pivot on if
    /// any sample is too large for the tolerance
    fn unresolved_row(&self, unused_rows: &[bool], unused_cols: &[bool]) -> Result<Option<usize>> {
        for i in spread(self.rows.len, CHECK_SAMPLES).filter(|&i| unused_rows[i]) {
            let row = self.residual_row(i)?;
            if !self.row_within_tolerance(&row) && argmax_masked(&row, unused_cols).is_some() {
                return Ok(Some(i));
            }
        }
        for j in spread(self.cols.len, CHECK_SAMPLES).filter(|&j| unused_cols[j]) {
            let column = self.residual_column(j)?;
            if !self.column_within_tolerance(&column) {
                if let Some(i) = argmax_masked(&column, unused_rows) {
                    return Ok(Some(i));
                }
            }
        }
        Ok(None)
    }
}

/// Up to `count` indices spread evenly over 0..len, both ends included
fn spread(len: usize, count: usize) -> impl Iterator<Item = usize> {
    let count = count.min(len);
    (0..count).map(move |k| {
        if count == 1 {
            0
        } else {
            k * (len - 1) / (count - 1)
        }
    })
}

/// Index of the largest |data[i]| among entries with `mask[i]` set, or `None`
/// when all of them vanish
fn argmax_masked(data: &Array1<f64>, mask: &[bool]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, (&value, &free)) in data.iter().zip(mask).enumerate() {
        if !free {
            continue;
        }
        let magnitude = value.abs();
        if magnitude < f64::MIN_POSITIVE {
            continue;
        }
        match best {
            Some((_, m)) if m >= magnitude => {}
            _ => best = Some((i, magnitude)),
        }
    }
    best.map(|(i, _)| i)
}
