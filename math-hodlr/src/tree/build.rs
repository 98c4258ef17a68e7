//! Top-down assembly of the tree

use super::node::{InternalNode, LeafNode, Node};
use super::{HodlrTree, IndexRange, TreeState, collect_stats};
use crate::compression::{AcaCompressor, LowRankCompressor};
use crate::config::TreeMode;
use crate::error::{HodlrError, Result};
use crate::parallel::join;
use crate::traits::EntrySource;

/// Read-only parameters shared by every recursive call
struct BuildContext<'a, S: ?Sized, C> {
    source: &'a S,
    compressor: &'a C,
    levels: usize,
    tolerance: f64,
    symmetric: bool,
}

impl HodlrTree {
    /// Compress `source` into the tree using adaptive cross approximation
    ///
    /// `symmetric` reuses the transpose of each upper block for the lower
    /// one. `positive_definite` selects the Cholesky path at factorization
    /// and requires `symmetric`.
    pub fn assemble<S>(&mut self, source: &S, symmetric: bool, positive_definite: bool) -> Result<()>
    where
        S: EntrySource + ?Sized,
    {
        let compressor = AcaCompressor {
            max_rank: self.config.max_rank,
        };
        let mode = TreeMode {
            symmetric,
            positive_definite,
        };
        self.assemble_with(source, &compressor, mode)
    }

    /// Compress `source` into the tree with a custom compressor
    pub fn assemble_with<S, C>(&mut self, source: &S, compressor: &C, mode: TreeMode) -> Result<()>
    where
        S: EntrySource + ?Sized,
        C: LowRankCompressor,
    {
        if self.state != TreeState::Empty {
            return Err(HodlrError::Sequencing {
                operation: "assemble",
                state: self.state,
            });
        }
        let result = self.build(source, compressor, mode);
        if result.is_err() {
            self.state = TreeState::Failed;
        }
        result
    }

    fn build<S, C>(&mut self, source: &S, compressor: &C, mode: TreeMode) -> Result<()>
    where
        S: EntrySource + ?Sized,
        C: LowRankCompressor,
    {
        if mode.positive_definite && !mode.symmetric {
            return Err(HodlrError::construction(
                "positive-definite mode requires symmetric mode",
            ));
        }
        if source.size() != self.n {
            return Err(HodlrError::construction(format!(
                "entry source has size {}, tree expects {}",
                source.size(),
                self.n
            )));
        }

        let ctx = BuildContext {
            source,
            compressor,
            levels: self.config.levels,
            tolerance: self.config.tolerance,
            symmetric: mode.symmetric,
        };
        let root = build_node(&ctx, IndexRange::new(0, self.n), 0)?;

        let stats = collect_stats(&root, self.n, self.config.levels);
        log::info!(
            "Assembled HODLR tree: n={}, levels={}, leaves={}, max rank {}, mean rank {:.1}, {:.1}% of dense storage",
            self.n,
            stats.levels,
            stats.leaves,
            stats.max_rank,
            stats.mean_rank,
            100.0 * stats.compression_ratio()
        );

        self.mode = mode;
        self.root = Some(root);
        self.state = TreeState::Assembled;
        Ok(())
    }
}

fn build_node<S, C>(ctx: &BuildContext<'_, S, C>, range: IndexRange, level: usize) -> Result<Node>
where
    S: EntrySource + ?Sized,
    C: LowRankCompressor,
{
    if level == ctx.levels {
        let block = ctx
            .source
            .block(range.start, range.start, range.len, range.len);
        return Ok(Node::Leaf(LeafNode {
            range,
            level,
            block,
            factor: None,
        }));
    }

    let (left_range, right_range) = range.split();
    let ((left, right), (upper, lower)) = join(
        || {
            join(
                || build_node(ctx, left_range, level + 1),
                || build_node(ctx, right_range, level + 1),
            )
        },
        || {
            let upper = ctx
                .compressor
                .compress(ctx.source, left_range, right_range, ctx.tolerance);
            let lower = if ctx.symmetric {
                Ok(None)
            } else {
                ctx.compressor
                    .compress(ctx.source, right_range, left_range, ctx.tolerance)
                    .map(Some)
            };
            (upper, lower)
        },
    );
    let (upper, lower) = (upper?, lower?);

    log::debug!(
        "level {} node {}: upper rank {}, lower rank {}",
        level,
        range,
        upper.rank(),
        lower.as_ref().map_or(upper.rank(), |b| b.rank())
    );

    Ok(Node::Internal(InternalNode {
        range,
        level,
        left: Box::new(left?),
        right: Box::new(right?),
        upper,
        lower,
        factor: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blas_helpers::relative_error;
    use crate::config::HodlrConfig;
    use crate::kernel::{KernelMatrix, random_points};
    use ndarray::{Array2, s};

    #[test]
    fn test_leaves_hold_exact_blocks() {
        let kernel = KernelMatrix::gaussian(random_points(64, 2, 5), 10.0);
        let mut tree = HodlrTree::new(64, HodlrConfig::new(2, 1e-10)).unwrap();
        tree.assemble(&kernel, true, false).unwrap();

        let dense = kernel.dense();
        let Some(root) = tree.root.as_ref() else {
            panic!("assembled tree has a root");
        };
        root.visit(&mut |node| {
            if let Node::Leaf(leaf) = node {
                let r = leaf.range;
                assert_eq!(leaf.block, dense.slice(s![r.start..r.end(), r.start..r.end()]));
                assert_eq!(leaf.level, 2);
            }
        });
    }

    #[test]
    fn test_upper_blocks_within_tolerance() {
        let kernel = KernelMatrix::gaussian(random_points(128, 2, 8), 10.0);
        let mut tree = HodlrTree::new(128, HodlrConfig::new(2, 1e-8)).unwrap();
        tree.assemble(&kernel, false, false).unwrap();

        let dense = kernel.dense();
        let Some(root) = tree.root.as_ref() else {
            panic!("assembled tree has a root");
        };
        root.visit(&mut |node| {
            if let Node::Internal(internal) = node {
                let (l, r) = internal.range.split();
                let exact_upper = dense.slice(s![l.start..l.end(), r.start..r.end()]);
                assert!(relative_error(&internal.upper.to_dense(), &exact_upper) < 1e-6);
                let Some(lower) = &internal.lower else {
                    panic!("nonsymmetric tree stores the lower block");
                };
                let exact_lower = dense.slice(s![r.start..r.end(), l.start..l.end()]);
                assert!(relative_error(&lower.to_dense(), &exact_lower) < 1e-6);
            }
        });
    }

    #[test]
    fn test_single_leaf_tree() {
        let a = Array2::from_shape_fn((5, 5), |(i, j)| if i == j { 2.0 } else { 0.1 });
        let mut tree = HodlrTree::new(5, HodlrConfig::new(0, 1e-8)).unwrap();
        tree.assemble(&a, false, false).unwrap();
        let stats = tree.stats().unwrap();
        assert_eq!(stats.leaves, 1);
        assert_eq!(stats.low_rank_blocks, 0);
        assert_eq!(stats.stored_entries, 25);
    }

    #[test]
    fn test_assemble_twice_is_sequencing_error() {
        let a = Array2::<f64>::eye(8);
        let mut tree = HodlrTree::new(8, HodlrConfig::new(1, 1e-8)).unwrap();
        tree.assemble(&a, true, false).unwrap();
        let err = tree.assemble(&a, true, false).unwrap_err();
        assert!(err.is_sequencing_error());
        assert_eq!(tree.state(), TreeState::Assembled);
    }

    #[test]
    fn test_positive_definite_requires_symmetric() {
        let a = Array2::<f64>::eye(8);
        let mut tree = HodlrTree::new(8, HodlrConfig::new(1, 1e-8)).unwrap();
        let err = tree.assemble(&a, false, true).unwrap_err();
        assert!(err.is_construction_error());
        assert_eq!(tree.state(), TreeState::Failed);
    }

    #[test]
    fn test_size_mismatch_fails_tree() {
        let a = Array2::<f64>::eye(6);
        let mut tree = HodlrTree::new(8, HodlrConfig::new(1, 1e-8)).unwrap();
        assert!(tree.assemble(&a, true, false).unwrap_err().is_construction_error());
        assert_eq!(tree.state(), TreeState::Failed);
        assert!(tree.assemble(&a, true, false).unwrap_err().is_sequencing_error());
    }
}
