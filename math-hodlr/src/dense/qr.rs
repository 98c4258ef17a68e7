//! Thin QR
//!
//! Householder (or LAPACK geqrf) QR of a tall matrix: A (m x k, m >= k) = Q R with Q having
//! orthonormal columns and R upper triangular. Rank-deficient input is fine;
//! Q stays orthonormal and R picks up zeros on its diagonal.

use ndarray::{Array1, Array2, Axis, s};

#[cfg(feature = "ndarray-linalg")]
use ndarray_linalg::QR;

/// Compute the thin QR factorization of `a`
///
/// Returns `(Q, R)` with Q of shape m x k and R of shape k x k.
/// Panics in debug builds if `a` has more columns than rows.
pub fn thin_qr(a: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
    let (m, k) = a.dim();
    debug_assert!(m >= k, "thin QR needs a tall matrix");

    #[cfg(feature = "ndarray-linalg")]
    if k > 0 {
        if let Ok((q, r)) = a.qr() {
            if q.dim() == (m, k) && r.dim() == (k, k) {
                return (q, r);
            }
        }
    }

    householder(a)
}

fn householder(a: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
    let (m, k) = a.dim();
    let mut work = a.clone();
    let mut reflectors: Vec<Option<Array1<f64>>> = Vec::with_capacity(k);

    for col in 0..k {
        let x = work.slice(s![col.., col]);
        let norm = x.dot(&x).sqrt();
        if norm == 0.0 {
            reflectors.push(None);
            continue;
        }
        let alpha = if x[0] >= 0.0 { -norm } else { norm };
        let mut v = x.to_owned();
        v[0] -= alpha;
        let v_norm = v.dot(&v).sqrt();
        if v_norm == 0.0 {
            reflectors.push(None);
            continue;
        }
        v /= v_norm;

        // work[col.., col..] -= 2 v (v^T work[col.., col..])
        let mut sub = work.slice_mut(s![col.., col..]);
        let proj = v.dot(&sub);
        for (mut row, vi) in sub.axis_iter_mut(Axis(0)).zip(v.iter()) {
            row.scaled_add(-2.0 * vi, &proj);
        }
        reflectors.push(Some(v));
    }

    let mut r = work.slice(s![..k, ..k]).to_owned();
    for i in 0..k {
        for j in 0..i {
            r[[i, j]] = 0.0;
        }
    }

    // Q = H_0 H_1 ... H_{k-1} applied to the first k columns of the identity
    let mut q = Array2::<f64>::zeros((m, k));
    for i in 0..k {
        q[[i, i]] = 1.0;
    }
    for (col, reflector) in reflectors.iter().enumerate().rev() {
        if let Some(v) = reflector {
            let mut sub = q.slice_mut(s![col.., ..]);
            let proj = v.dot(&sub);
            for (mut row, vi) in sub.axis_iter_mut(Axis(0)).zip(v.iter()) {
                row.scaled_add(-2.0 * vi, &proj);
            }
        }
    }

    (q, r)
}
