//! Cholesky decomposition
//!
//! A = L L^T for symmetric positive definite blocks. Besides solves, the
//! factor can be applied directly (`L x`, `L^T x`), which is what the
//! symmetric factor of a HODLR tree is built from.

use super::{DenseError, PIVOT_EPS};
use ndarray::{Array2, ArrayViewMut2, Axis};

#[cfg(feature = "ndarray-linalg")]
use ndarray_linalg::{Cholesky, UPLO};

/// Lower triangular Cholesky factor
#[derive(Debug, Clone)]
pub struct CholeskyFactorization {
    /// L, with zeros above the diagonal
    pub l: Array2<f64>,
    /// Matrix dimension
    pub n: usize,
}

impl CholeskyFactorization {
    /// Overwrite `b` with L^-1 b
    pub fn solve_lower_in_place(&self, b: &mut ArrayViewMut2<f64>) {
        for i in 0..self.n {
            for j in 0..i {
                let l_ij = self.l[[i, j]];
                if l_ij != 0.0 {
                    let (head, mut tail) = b.view_mut().split_at(Axis(0), i);
                    tail.row_mut(0).scaled_add(-l_ij, &head.row(j));
                }
            }
            let inv = 1.0 / self.l[[i, i]];
            b.row_mut(i).mapv_inplace(|v| v * inv);
        }
    }

    /// Overwrite `b` with L^-T b
    pub fn solve_upper_in_place(&self, b: &mut ArrayViewMut2<f64>) {
        for i in (0..self.n).rev() {
            for j in (i + 1)..self.n {
                // (L^T)[i, j] = L[j, i]
                let l_ji = self.l[[j, i]];
                if l_ji != 0.0 {
                    let (mut head, tail) = b.view_mut().split_at(Axis(0), j);
                    head.row_mut(i).scaled_add(-l_ji, &tail.row(0));
                }
            }
            let inv = 1.0 / self.l[[i, i]];
            b.row_mut(i).mapv_inplace(|v| v * inv);
        }
    }

    /// Overwrite `b` with A^-1 b
    pub fn solve_in_place(&self, b: &mut ArrayViewMut2<f64>) {
        self.solve_lower_in_place(b);
        self.solve_upper_in_place(b);
    }

    /// Overwrite `b` with L b
    pub fn mul_lower_in_place(&self, b: &mut ArrayViewMut2<f64>) {
        let product = self.l.dot(&*b);
        b.assign(&product);
    }

    /// Overwrite `b` with L^T b
    pub fn mul_upper_in_place(&self, b: &mut ArrayViewMut2<f64>) {
        let product = self.l.t().dot(&*b);
        b.assign(&product);
    }

    /// log det A = 2 * sum(log L_ii)
    pub fn log_det(&self) -> f64 {
        2.0 * self.l.diag().iter().map(|d| d.ln()).sum::<f64>()
    }
}

/// Compute the Cholesky factorization of a symmetric positive definite matrix
///
/// Only the lower triangle of `a` is read.
pub fn cholesky_factorize(a: &Array2<f64>) -> Result<CholeskyFactorization, DenseError> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(DenseError::DimensionMismatch {
            expected: n,
            got: a.ncols(),
        });
    }

    #[cfg(feature = "ndarray-linalg")]
    if n > 0 {
        if let Ok(l) = a.cholesky(UPLO::Lower) {
            if l.diag().iter().all(|d| *d > PIVOT_EPS) {
                return Ok(CholeskyFactorization { l, n });
            }
        }
    }

    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut diag = a[[j, j]];
        for k in 0..j {
            diag -= l[[j, k]] * l[[j, k]];
        }
        if !(diag > PIVOT_EPS) {
            return Err(DenseError::NotPositiveDefinite {
                index: j,
                value: diag,
            });
        }
        let l_jj = diag.sqrt();
        l[[j, j]] = l_jj;

        for i in (j + 1)..n {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = sum / l_jj;
        }
    }

    Ok(CholeskyFactorization { l, n })
}
