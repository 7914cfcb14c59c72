#![doc = include_str!("../README.md")]

// Public surface
pub mod bbox;
pub mod cached;
pub mod compositer;
pub mod config;
pub mod error;
pub mod image;
pub mod store;

// Blending internals; public for tooling and tests, unstable.
pub mod kernels;
pub mod pyramid;

// --- High-level re-exports -------------------------------------------------

pub use crate::bbox::BoundingBox;
pub use crate::cached::CachedImage;
pub use crate::compositer::{suggested_levels, MultiBandCompositer};
pub use crate::config::{load_scene, CompositerOptions, SceneConfig, SceneView};
pub use crate::error::{Error, Result};
pub use crate::pyramid::LaplacianPyramid;
pub use crate::store::{TileStore, TileStoreOptions};

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
///
/// ```no_run
/// use pano_compositer::prelude::*;
/// use std::sync::Arc;
///
/// # fn main() -> pano_compositer::Result<()> {
/// let store = Arc::new(TileStore::create(TileStoreOptions::default())?);
/// let mut compositer =
///     MultiBandCompositer::initialize(&store, 1024, 512, CompositerOptions::default())?;
/// compositer.terminate()?;
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::image::{Image, Rgb, Rgba};
    pub use crate::{
        CompositerOptions, Error, MultiBandCompositer, Result, TileStore, TileStoreOptions,
    };
}
