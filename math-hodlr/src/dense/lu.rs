//! LU decomposition solver
//!
//! LU factorization with partial pivoting for dense square blocks. Solves act
//! in place on any number of right-hand-side columns.

use super::{DenseError, PIVOT_EPS};
use ndarray::{Array1, Array2, ArrayViewMut2, Axis};

#[cfg(feature = "ndarray-linalg")]
use ndarray::ShapeBuilder;
#[cfg(feature = "ndarray-linalg")]
use ndarray_linalg::FactorizeInto;

/// LU factorization result
///
/// Stores L and U factors along with pivot information
#[derive(Debug, Clone)]
pub struct LuFactorization {
    /// Combined L and U matrices (L is unit lower triangular, stored below diagonal)
    pub lu: Array2<f64>,
    /// Row i of PA is row `perm[i]` of A
    pub perm: Vec<usize>,
    /// Parity of the row permutation (+1 or -1)
    pub parity: f64,
    /// Matrix dimension
    pub n: usize,
}

impl LuFactorization {
    /// Overwrite `b` with A^-1 b
    pub fn solve_in_place(&self, b: &mut ArrayViewMut2<f64>) {
        debug_assert_eq!(b.nrows(), self.n);
        if self.n == 0 {
            return;
        }

        // Apply row permutation
        let permuted = b.select(Axis(0), &self.perm);
        b.assign(&permuted);

        // Forward substitution: Ly = Pb
        for i in 0..self.n {
            for j in 0..i {
                let l_ij = self.lu[[i, j]];
                if l_ij != 0.0 {
                    let (head, mut tail) = b.view_mut().split_at(Axis(0), i);
                    tail.row_mut(0).scaled_add(-l_ij, &head.row(j));
                }
            }
        }

        // Backward substitution: Ux = y
        for i in (0..self.n).rev() {
            for j in (i + 1)..self.n {
                let u_ij = self.lu[[i, j]];
                if u_ij != 0.0 {
                    let (mut head, tail) = b.view_mut().split_at(Axis(0), j);
                    head.row_mut(i).scaled_add(-u_ij, &tail.row(0));
                }
            }
            let inv = 1.0 / self.lu[[i, i]];
            b.row_mut(i).mapv_inplace(|v| v * inv);
        }
    }

    /// Solve AX = B for a block of right-hand sides
    pub fn solve(&self, b: &Array2<f64>) -> Result<Array2<f64>, DenseError> {
        if b.nrows() != self.n {
            return Err(DenseError::DimensionMismatch {
                expected: self.n,
                got: b.nrows(),
            });
        }
        let mut x = b.clone();
        self.solve_in_place(&mut x.view_mut());
        Ok(x)
    }

    /// Solve Ax = b for a single vector
    pub fn solve_vec(&self, b: &Array1<f64>) -> Result<Array1<f64>, DenseError> {
        let x = self.solve(&b.clone().insert_axis(Axis(1)))?;
        Ok(x.column(0).to_owned())
    }

    /// log |det A|
    pub fn log_abs_det(&self) -> f64 {
        self.lu.diag().iter().map(|d| d.abs().ln()).sum()
    }

    /// Sign of det A
    pub fn det_sign(&self) -> f64 {
        self.lu
            .diag()
            .iter()
            .fold(self.parity, |s, d| if *d < 0.0 { -s } else { s })
    }
}

/// Compute LU factorization with partial pivoting
pub fn lu_factorize(a: &Array2<f64>) -> Result<LuFactorization, DenseError> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(DenseError::DimensionMismatch {
            expected: n,
            got: a.ncols(),
        });
    }

    #[cfg(feature = "ndarray-linalg")]
    if let Some(factorization) = lapack_lu(a) {
        return Ok(factorization);
    }

    partial_pivoting(a)
}

/// LAPACK getrf on a column-major copy
///
/// `None` when LAPACK fails or a pivot is below `PIVOT_EPS`; the Rust kernel
/// then reports which pivot broke down.
#[cfg(feature = "ndarray-linalg")]
fn lapack_lu(a: &Array2<f64>) -> Option<LuFactorization> {
    let n = a.nrows();
    if n == 0 {
        return None;
    }
    let mut work = Array2::<f64>::zeros((n, n).f());
    work.assign(a);
    let factors = work.factorize_into().ok()?;
    if factors.a.diag().iter().any(|d| !(d.abs() > PIVOT_EPS)) {
        return None;
    }

    // ipiv holds 1-based sequential row swaps
    let mut perm: Vec<usize> = (0..n).collect();
    let mut parity = 1.0;
    for (k, &p) in factors.ipiv.iter().enumerate() {
        let p = usize::try_from(p).ok()?.checked_sub(1)?;
        if p != k {
            perm.swap(k, p);
            parity = -parity;
        }
    }

    Some(LuFactorization {
        lu: factors.a,
        perm,
        parity,
        n,
    })
}

fn partial_pivoting(a: &Array2<f64>) -> Result<LuFactorization, DenseError> {
    let n = a.nrows();
    let mut lu = a.clone();
    let mut perm: Vec<usize> = (0..n).collect();
    let mut parity = 1.0;

    for k in 0..n {
        // Find pivot
        let mut max_val = lu[[k, k]].abs();
        let mut max_row = k;

        for i in (k + 1)..n {
            let val = lu[[i, k]].abs();
            if val > max_val {
                max_val = val;
                max_row = i;
            }
        }

        // Check for singularity
        if !(max_val > PIVOT_EPS) {
            return Err(DenseError::SingularMatrix { index: k });
        }

        // Swap rows if needed
        if max_row != k {
            for j in 0..n {
                lu.swap([k, j], [max_row, j]);
            }
            perm.swap(k, max_row);
            parity = -parity;
        }

        // Compute multipliers and eliminate
        let pivot_inv = 1.0 / lu[[k, k]];
        for i in (k + 1)..n {
            let mult = lu[[i, k]] * pivot_inv;
            lu[[i, k]] = mult; // Store multiplier in L part

            if mult != 0.0 {
                for j in (k + 1)..n {
                    let update = mult * lu[[k, j]];
                    lu[[i, j]] -= update;
                }
            }
        }
    }

    Ok(LuFactorization {
        lu,
        perm,
        parity,
        n,
    })
}

/// Solve Ax = b using LU decomposition
///
/// This is a convenience function that combines factorization and solve.
pub fn lu_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>, DenseError> {
    let factorization = lu_factorize(a)?;
    factorization.solve_vec(b)
}
