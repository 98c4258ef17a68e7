//! Benchmark: HODLR solver scaling
//!
//! Measures how the four stages scale with the matrix size N on a Gaussian
//! kernel over 2D random points (leaf size 64, tolerance 1e-10):
//! 1. Assembly (ACA compression of the off-diagonal blocks)
//! 2. Product A x
//! 3. Factorization (Woodbury LU and symmetric Cholesky)
//! 4. Solve
//!
//! Run with:
//!   cargo bench -p math-audio-hodlr --bench hodlr_scaling
//!
//! Thread scaling:
//!   RAYON_NUM_THREADS=1 cargo bench -p math-audio-hodlr --bench hodlr_scaling
//!   RAYON_NUM_THREADS=4 cargo bench -p math-audio-hodlr --bench hodlr_scaling

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use math_audio_hodlr::{HodlrConfig, HodlrTree, KernelMatrix, PairKernel, random_points};
use std::time::Duration;

const SIZES: [usize; 4] = [1024, 2048, 4096, 8192];
const LEAF_SIZE: usize = 64;
const TOLERANCE: f64 = 1e-10;

fn kernel(n: usize) -> KernelMatrix<PairKernel> {
    KernelMatrix::gaussian(random_points(n, 2, 2024), 10.0)
}

fn assembled(kernel: &KernelMatrix<PairKernel>, n: usize, spd: bool) -> HodlrTree {
    let config = HodlrConfig::for_leaf_size(n, LEAF_SIZE, TOLERANCE);
    let mut tree = HodlrTree::new(n, config).expect("valid configuration");
    tree.assemble(kernel, true, spd).expect("assembly");
    tree
}

/// Benchmark assembly (compression of every off-diagonal block)
fn bench_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("hodlr_assembly");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(10);

    for &n in &SIZES {
        let kernel = kernel(n);
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("aca", n), &kernel, |b, kernel| {
            b.iter(|| black_box(assembled(kernel, n, false)));
        });
    }

    group.finish();
}

/// Benchmark the fast product against a single right-hand side
fn bench_product(c: &mut Criterion) {
    let mut group = c.benchmark_group("hodlr_product");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(5));

    for &n in &SIZES {
        let tree = assembled(&kernel(n), n, false);
        let x = random_points(n, 1, 7);
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("matmat", n), &x, |b, x| {
            b.iter(|| black_box(tree.matmat_product(x).expect("product")));
        });
    }

    group.finish();
}

/// Benchmark both factorization modes
fn bench_factorization(c: &mut Criterion) {
    let mut group = c.benchmark_group("hodlr_factorization");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(10);

    for &n in &SIZES {
        let kernel = kernel(n);
        group.throughput(Throughput::Elements(n as u64));

        for (name, spd) in [("woodbury", false), ("symmetric", true)] {
            group.bench_with_input(BenchmarkId::new(name, n), &kernel, |b, kernel| {
                b.iter_batched(
                    || assembled(kernel, n, spd),
                    |mut tree| {
                        tree.factorize().expect("factorization");
                        black_box(tree)
                    },
                    criterion::BatchSize::LargeInput,
                );
            });
        }
    }

    group.finish();
}

/// Benchmark solves on a factorized tree
fn bench_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("hodlr_solve");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(5));

    for &n in &SIZES {
        let kernel = kernel(n);
        let b_vec = random_points(n, 1, 11);
        group.throughput(Throughput::Elements(n as u64));

        for (name, spd) in [("woodbury", false), ("symmetric", true)] {
            let mut tree = assembled(&kernel, n, spd);
            tree.factorize().expect("factorization");

            group.bench_with_input(BenchmarkId::new(name, n), &b_vec, |b, rhs| {
                b.iter(|| black_box(tree.solve(rhs).expect("solve")));
            });
        }
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_assembly,
    bench_product,
    bench_factorization,
    bench_solve
);
criterion_main!(benches);
