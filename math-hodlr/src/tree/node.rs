//! Tree nodes and the factor data attached to them

use super::range::IndexRange;
use crate::compression::LowRankBlock;
use crate::dense::{CholeskyFactorization, LuFactorization};
use ndarray::Array2;

/// A node owns its children, its blocks and, once factorized, its factors
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

/// Dense diagonal block at the bottom of the recursion
#[derive(Debug, Clone)]
pub(crate) struct LeafNode {
    pub range: IndexRange,
    pub level: usize,
    pub block: Array2<f64>,
    pub factor: Option<LeafFactor>,
}

/// Two children coupled through low-rank off-diagonal blocks
///
/// `upper` approximates A[left, right]. `lower` approximates A[right, left];
/// it is `None` for symmetric trees, where that block is `upper` transposed.
#[derive(Debug, Clone)]
pub(crate) struct InternalNode {
    pub range: IndexRange,
    pub level: usize,
    pub left: Box<Node>,
    pub right: Box<Node>,
    pub upper: LowRankBlock,
    pub lower: Option<LowRankBlock>,
    pub factor: Option<InternalFactor>,
}

#[derive(Debug, Clone)]
pub(crate) enum LeafFactor {
    Lu(LuFactorization),
    Cholesky(CholeskyFactorization),
}

#[derive(Debug, Clone)]
pub(crate) enum InternalFactor {
    /// K = diag(K_L, K_R) + U V^T handled through the capacitance matrix
    /// S = I + V^T diag(K_L, K_R)^-1 U
    Woodbury {
        /// K_L^-1 U1
        left_basis: Array2<f64>,
        /// K_R^-1 U2
        right_basis: Array2<f64>,
        reduced: LuFactorization,
    },
    /// W = diag(W_L, W_R) (I + Q (L_p - I) Q^T) with Q = diag(left_q, right_q)
    Symmetric {
        left_q: Array2<f64>,
        right_q: Array2<f64>,
        reduced: CholeskyFactorization,
    },
}

impl Node {
    pub fn range(&self) -> IndexRange {
        match self {
            Node::Leaf(leaf) => leaf.range,
            Node::Internal(internal) => internal.range,
        }
    }

    pub fn level(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.level,
            Node::Internal(internal) => internal.level,
        }
    }

    /// Pre-order walk over every node
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        f(self);
        if let Node::Internal(internal) = self {
            internal.left.visit(f);
            internal.right.visit(f);
        }
    }
}

impl InternalNode {
    /// Rows of the left child, where the right block starts
    #[inline]
    pub fn split(&self) -> usize {
        self.left.range().len
    }

    /// Factors (U2, V2) with A[right, left] ≈ U2 V2^T
    pub fn lower_factors(&self) -> (&Array2<f64>, &Array2<f64>) {
        match &self.lower {
            Some(lower) => (&lower.u, &lower.v),
            None => (&self.upper.v, &self.upper.u),
        }
    }

    /// Rank of each coupling block (upper, lower)
    pub fn ranks(&self) -> (usize, usize) {
        (
            self.upper.rank(),
            self.lower.as_ref().map_or(self.upper.rank(), |b| b.rank()),
        )
    }
}

impl LeafFactor {
    pub fn log_abs_det(&self) -> f64 {
        match self {
            LeafFactor::Lu(lu) => lu.log_abs_det(),
            LeafFactor::Cholesky(chol) => chol.log_det(),
        }
    }

    pub fn det_sign(&self) -> f64 {
        match self {
            LeafFactor::Lu(lu) => lu.det_sign(),
            LeafFactor::Cholesky(_) => 1.0,
        }
    }
}

impl InternalFactor {
    pub fn log_abs_det(&self) -> f64 {
        match self {
            InternalFactor::Woodbury { reduced, .. } => reduced.log_abs_det(),
            // det(I + Q X Q^T) = det(L_p), counted twice for W W^T
            InternalFactor::Symmetric { reduced, .. } => reduced.log_det(),
        }
    }

    pub fn det_sign(&self) -> f64 {
        match self {
            InternalFactor::Woodbury { reduced, .. } => reduced.det_sign(),
            InternalFactor::Symmetric { .. } => 1.0,
        }
    }
}
