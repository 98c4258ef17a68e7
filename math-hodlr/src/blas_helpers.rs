//! Norms and error measures on dense blocks
//!
//! Used by the compressor to estimate block scales and by validation code to
//! compare fast HODLR results against dense references.

use ndarray::{ArrayBase, Data, Dimension};

/// Sum of squares of all entries: ||x||_F^2
#[inline]
pub fn norm_sqr<S, D>(x: &ArrayBase<S, D>) -> f64
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    x.iter().map(|v| v * v).sum()
}

/// Frobenius (or vector 2-) norm: ||x||_F
#[inline]
pub fn frobenius_norm<S, D>(x: &ArrayBase<S, D>) -> f64
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    norm_sqr(x).sqrt()
}

/// Relative error ||approx - exact|| / ||exact||
///
/// Falls back to the absolute error when `exact` is zero.
pub fn relative_error<S1, S2, D>(approx: &ArrayBase<S1, D>, exact: &ArrayBase<S2, D>) -> f64
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    assert_eq!(
        approx.shape(),
        exact.shape(),
        "Shapes must match for relative error"
    );
    let diff: f64 = approx
        .iter()
        .zip(exact.iter())
        .map(|(a, e)| (a - e) * (a - e))
        .sum::<f64>()
        .sqrt();
    let scale = frobenius_norm(exact);
    if scale > 0.0 { diff / scale } else { diff }
}

/// Largest absolute entry-wise difference
pub fn max_abs_diff<S1, S2, D>(a: &ArrayBase<S1, D>, b: &ArrayBase<S2, D>) -> f64
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    assert_eq!(a.shape(), b.shape(), "Shapes must match");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}
