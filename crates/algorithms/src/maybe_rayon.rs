//! Parallel iteration that degrades to sequential builds.
//!
//! The index kernels are written once as
//! `(0..rows).into_par_iter().flat_map(...)`. With the `parallel` feature
//! that fans rows out across the rayon pool; without it, the shim below
//! resolves the identical chain through the plain `Iterator` methods.

#[cfg(feature = "parallel")]
pub use rayon::prelude::*;

/// Sequential stand-in for rayon's `IntoParallelIterator`, covering the
/// row ranges the kernels iterate.
#[cfg(not(feature = "parallel"))]
pub trait IntoParallelIterator {
    type Iter;
    type Item;
    fn into_par_iter(self) -> Self::Iter;
}

#[cfg(not(feature = "parallel"))]
impl IntoParallelIterator for std::ops::Range<usize> {
    type Iter = std::ops::Range<usize>;
    type Item = usize;

    fn into_par_iter(self) -> Self::Iter {
        self
    }
}
