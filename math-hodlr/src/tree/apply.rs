//! Fast products with the assembled tree

use super::node::Node;
use super::{HodlrTree, TreeState};
use crate::error::Result;
use crate::parallel::join;
use ndarray::{Array1, Array2, ArrayView2, ArrayViewMut2, Axis};

impl HodlrTree {
    /// Y ≈ A X for a block of right-hand sides (N rows, any number of columns)
    ///
    /// Available on Assembled and Factorized trees; factorization keeps the
    /// compressed blocks.
    pub fn matmat_product(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let root = self.require(
            "matmat_product",
            &[TreeState::Assembled, TreeState::Factorized],
        )?;
        self.check_rows(x.nrows())?;
        let mut y = Array2::zeros(x.raw_dim());
        apply_node(root, x.view(), y.view_mut());
        Ok(y)
    }

    /// y ≈ A x for a single vector
    pub fn matvec(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        let y = self.matmat_product(&x.clone().insert_axis(Axis(1)))?;
        Ok(y.remove_axis(Axis(1)))
    }
}

/// y += A[node, node] x, with x and y restricted to the node's rows
fn apply_node(node: &Node, x: ArrayView2<f64>, mut y: ArrayViewMut2<f64>) {
    match node {
        Node::Leaf(leaf) => {
            y += &leaf.block.dot(&x);
        }
        Node::Internal(internal) => {
            let mid = internal.split();
            let (x_left, x_right) = x.split_at(Axis(0), mid);
            let (mut y_left, mut y_right) = y.split_at(Axis(0), mid);

            y_left += &internal.upper.apply(x_right);
            let (u2, v2) = internal.lower_factors();
            y_right += &u2.dot(&v2.t().dot(&x_left));

            join(
                || apply_node(&internal.left, x_left, y_left),
                || apply_node(&internal.right, x_right, y_right),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blas_helpers::relative_error;
    use crate::config::HodlrConfig;
    use crate::kernel::{KernelMatrix, random_points};
    use crate::traits::EntrySource;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_exact_for_block_diagonal() {
        // Zero coupling: the tree reproduces A exactly
        let a = array![
            [4.0, 1.0, 0.0, 0.0],
            [2.0, 5.0, 0.0, 0.0],
            [0.0, 0.0, 3.0, -1.0],
            [0.0, 0.0, 1.0, 6.0]
        ];
        let mut tree = HodlrTree::new(4, HodlrConfig::new(1, 1e-12)).unwrap();
        tree.assemble(&a, false, false).unwrap();
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = tree.matmat_product(&x).unwrap();
        assert_eq!(y, a.dot(&x));
    }

    #[test]
    fn test_matches_dense_product() {
        let kernel = KernelMatrix::gaussian(random_points(200, 2, 21), 10.0);
        let mut tree = HodlrTree::new(200, HodlrConfig::for_leaf_size(200, 16, 1e-10)).unwrap();
        tree.assemble(&kernel, true, false).unwrap();

        let x = random_points(200, 3, 22);
        let y = tree.matmat_product(&x).unwrap();
        let exact = kernel.dense().dot(&x);
        assert!(relative_error(&y, &exact) < 1e-9);
    }

    #[test]
    fn test_matvec_matches_matmat() {
        let kernel = KernelMatrix::gaussian(random_points(64, 2, 4), 10.0);
        let mut tree = HodlrTree::new(64, HodlrConfig::new(2, 1e-10)).unwrap();
        tree.assemble(&kernel, false, false).unwrap();

        let x = Array1::from_shape_fn(64, |i| (i as f64).sin());
        let y = tree.matvec(&x).unwrap();
        let y2 = tree.matmat_product(&x.clone().insert_axis(Axis(1))).unwrap();
        for i in 0..64 {
            assert_relative_eq!(y[i], y2[[i, 0]], epsilon = 1e-14);
        }
    }

    #[test]
    fn test_rejects_wrong_rows() {
        let a = Array2::<f64>::eye(8);
        let mut tree = HodlrTree::new(8, HodlrConfig::new(1, 1e-8)).unwrap();
        tree.assemble(&a, true, false).unwrap();
        let err = tree.matmat_product(&Array2::zeros((7, 1))).unwrap_err();
        assert!(matches!(
            err,
            crate::error::HodlrError::DimensionMismatch {
                expected: 8,
                got: 7
            }
        ));
    }

    #[test]
    fn test_requires_assembly() {
        let tree = HodlrTree::new(8, HodlrConfig::new(1, 1e-8)).unwrap();
        let err = tree.matmat_product(&Array2::zeros((8, 1))).unwrap_err();
        assert!(err.is_sequencing_error());
    }
}
