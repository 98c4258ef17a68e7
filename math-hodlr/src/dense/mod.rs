//! Dense factorizations used at the leaves and for reduced systems
//!
//! - [`lu_factorize`]: LU decomposition with partial pivoting
//! - [`cholesky_factorize`]: LL^T decomposition for SPD blocks
//! - [`thin_qr`]: Householder QR returning the thin factors
//!
//! With the `ndarray-linalg` feature the factorizations run through LAPACK;
//! the Rust kernels remain the fallback when the feature is off or LAPACK
//! rejects the input.

mod cholesky;
mod lu;
mod qr;

pub use cholesky::{CholeskyFactorization, cholesky_factorize};
pub use lu::{LuFactorization, lu_factorize, lu_solve};
pub use qr::thin_qr;

use thiserror::Error;

/// Errors that can occur during dense factorizations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DenseError {
    #[error("Matrix is singular or nearly singular (pivot {index})")]
    SingularMatrix { index: usize },
    #[error("Matrix is not positive definite: pivot {value:e} at {index}")]
    NotPositiveDefinite { index: usize, value: f64 },
    #[error("Matrix dimensions mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Pivots below this magnitude are treated as zero
pub(crate) const PIVOT_EPS: f64 = 1e-300;
