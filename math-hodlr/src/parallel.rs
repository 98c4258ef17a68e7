//! Parallel utilities with feature-gated implementations
//!
//! The tree recursion is fork-join: the two subtrees of an internal node are
//! independent until their parent combines them. With the `parallel` feature
//! this maps onto `rayon::join`; without it both halves run in order.

/// Check if parallel processing is available
#[inline]
pub fn is_parallel_available() -> bool {
    cfg!(feature = "parallel")
}

/// Run two closures, potentially in parallel, and return both results
#[cfg(feature = "parallel")]
#[inline]
pub fn join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    rayon::join(a, b)
}

/// Sequential join (fallback)
#[cfg(not(feature = "parallel"))]
#[inline]
pub fn join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA,
    B: FnOnce() -> RB,
{
    (a(), b())
}

/// Parallel map over a range of indices
#[cfg(feature = "parallel")]
pub fn parallel_map_indexed<U, F>(count: usize, f: F) -> Vec<U>
where
    U: Send,
    F: Fn(usize) -> U + Sync + Send,
{
    use rayon::prelude::*;
    (0..count).into_par_iter().map(f).collect()
}

/// Sequential map with index (fallback)
#[cfg(not(feature = "parallel"))]
pub fn parallel_map_indexed<U, F>(count: usize, f: F) -> Vec<U>
where
    F: Fn(usize) -> U,
{
    (0..count).map(f).collect()
}
