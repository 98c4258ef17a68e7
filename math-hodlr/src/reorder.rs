//! Spatial reordering of point sets
//!
//! Off-diagonal blocks of a kernel matrix only have low rank when the row and
//! column index ranges correspond to well-separated point clusters. This
//! module computes a k-d ordering: the point set is split at the median of
//! its widest bounding-box axis, recursively, using the same floor/ceil split
//! as the HODLR tree so that every tree node covers one compact cluster.

use ndarray::{Array2, Axis};

/// Axis-aligned bounding box of a subset of points
#[derive(Debug, Clone)]
pub struct BoundingBox {
    /// Minimum corner coordinates
    pub min: Vec<f64>,
    /// Maximum corner coordinates
    pub max: Vec<f64>,
}

impl BoundingBox {
    /// Bounding box of the rows of `points` listed in `indices`
    pub fn of(points: &Array2<f64>, indices: &[usize]) -> Self {
        let dim = points.ncols();
        let mut min = vec![f64::INFINITY; dim];
        let mut max = vec![f64::NEG_INFINITY; dim];
        for &i in indices {
            for (d, &x) in points.row(i).iter().enumerate() {
                if x < min[d] {
                    min[d] = x;
                }
                if x > max[d] {
                    max[d] = x;
                }
            }
        }
        Self { min, max }
    }

    /// Axis with the largest extent (0 when empty)
    pub fn widest_axis(&self) -> usize {
        let mut best = 0;
        let mut best_extent = f64::NEG_INFINITY;
        for (d, (lo, hi)) in self.min.iter().zip(&self.max).enumerate() {
            let extent = hi - lo;
            if extent > best_extent {
                best_extent = extent;
                best = d;
            }
        }
        best
    }
}

/// Compute a k-d tree ordering of the rows of `points`
///
/// Returns `order` such that `order[k]` is the original index of the point
/// placed at position `k`.
pub fn kd_tree_order(points: &Array2<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..points.nrows()).collect();
    if points.ncols() > 0 {
        bisect(points, &mut order);
    }
    order
}

fn bisect(points: &Array2<f64>, indices: &mut [usize]) {
    if indices.len() <= 1 {
        return;
    }
    let axis = BoundingBox::of(points, indices).widest_axis();
    indices.sort_by(|&a, &b| points[[a, axis]].total_cmp(&points[[b, axis]]));

    // Floor for the left half, matching the tree split
    let mid = indices.len() / 2;
    let (left, right) = indices.split_at_mut(mid);
    bisect(points, left);
    bisect(points, right);
}

/// Reorder rows: row k of the result is row `order[k]` of `a`
pub fn permute_rows(a: &Array2<f64>, order: &[usize]) -> Array2<f64> {
    a.select(Axis(0), order)
}

/// Inverse of a permutation
pub fn inverse_permutation(order: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0; order.len()];
    for (k, &i) in order.iter().enumerate() {
        inverse[i] = k;
    }
    inverse
}

/// Whether `order` is a permutation of 0..n
pub fn is_permutation(order: &[usize], n: usize) -> bool {
    if order.len() != n {
        return false;
    }
    let mut seen = vec![false; n];
    for &i in order {
        if i >= n || seen[i] {
            return false;
        }
        seen[i] = true;
    }
    true
}
