//! Laplacian-pyramid blending over tile-cached levels.
//!
//! Each view is decomposed into band-pass levels on the fly and accumulated,
//! weighted, into a stack of cached images at halving resolutions; the
//! coarsest level carries the Gaussian residual. `rebuild` normalizes the
//! accumulators and collapses them coarse-to-fine in bounded windows, so a
//! panorama far larger than memory still reconstructs under the tile budget.

pub mod laplacian;

pub use self::laplacian::LaplacianPyramid;
