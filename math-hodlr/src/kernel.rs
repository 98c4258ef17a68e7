//! Pairwise-kernel matrices over point sets
//!
//! [`KernelMatrix`] is an [`EntrySource`] whose entries are `k(x_i, x_j)` for
//! a point set `x`, optionally with a constant diagonal. Constructing it with
//! [`KernelMatrix::new`] applies the k-d reordering once, up front, and keeps
//! the permutation so callers can map their own vectors.

use crate::parallel::parallel_map_indexed;
use crate::reorder::{kd_tree_order, permute_rows};
use crate::traits::EntrySource;
use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Plain function pointer kernel
pub type PairKernel = fn(ArrayView1<f64>, ArrayView1<f64>) -> f64;

/// Gaussian kernel exp(-||x - y||^2)
pub fn gaussian(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
    let r2: f64 = x.iter().zip(y.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
    (-r2).exp()
}

/// Kernel matrix A[i, j] = k(x_i, x_j) over (reordered) points
#[derive(Debug, Clone)]
pub struct KernelMatrix<K> {
    points: Array2<f64>,
    permutation: Vec<usize>,
    kernel: K,
    diagonal: Option<f64>,
}

impl<K> KernelMatrix<K>
where
    K: Fn(ArrayView1<f64>, ArrayView1<f64>) -> f64 + Sync,
{
    /// Build from points (one per row), reordering them with a k-d split
    pub fn new(points: Array2<f64>, kernel: K) -> Self {
        let permutation = kd_tree_order(&points);
        let points = permute_rows(&points, &permutation);
        Self {
            points,
            permutation,
            kernel,
            diagonal: None,
        }
    }

    /// Build from points in the given order
    pub fn without_reordering(points: Array2<f64>, kernel: K) -> Self {
        let permutation = (0..points.nrows()).collect();
        Self {
            points,
            permutation,
            kernel,
            diagonal: None,
        }
    }

    /// Use a constant value on the diagonal instead of k(x_i, x_i)
    pub fn with_diagonal(self, value: f64) -> Self {
        Self {
            diagonal: Some(value),
            ..self
        }
    }

    /// Points in matrix order
    pub fn points(&self) -> &Array2<f64> {
        &self.points
    }

    /// `permutation()[k]` is the caller's index of the point at position k
    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }
}

impl KernelMatrix<PairKernel> {
    /// Gaussian kernel matrix with a constant diagonal
    pub fn gaussian(points: Array2<f64>, diagonal: f64) -> Self {
        Self::new(points, gaussian as PairKernel).with_diagonal(diagonal)
    }
}

impl<K> EntrySource for KernelMatrix<K>
where
    K: Fn(ArrayView1<f64>, ArrayView1<f64>) -> f64 + Sync,
{
    fn size(&self) -> usize {
        self.points.nrows()
    }

    #[inline]
    fn entry(&self, i: usize, j: usize) -> f64 {
        match self.diagonal {
            Some(d) if i == j => d,
            _ => (self.kernel)(self.points.row(i), self.points.row(j)),
        }
    }

    fn block(
        &self,
        row_start: usize,
        col_start: usize,
        num_rows: usize,
        num_cols: usize,
    ) -> Array2<f64> {
        // Rows are independent; worth spreading only for large blocks
        if num_rows * num_cols < 64 * 64 {
            return Array2::from_shape_fn((num_rows, num_cols), |(i, j)| {
                self.entry(row_start + i, col_start + j)
            });
        }
        let rows = parallel_map_indexed(num_rows, |i| {
            (0..num_cols)
                .map(|j| self.entry(row_start + i, col_start + j))
                .collect::<Vec<f64>>()
        });
        Array2::from_shape_fn((num_rows, num_cols), |(i, j)| rows[i][j])
    }
}

/// `n` points drawn uniformly from [-1, 1]^dim with a fixed seed
pub fn random_points(n: usize, dim: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((n, dim), |_| rng.random_range(-1.0..1.0))
}
