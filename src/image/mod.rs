//! Image module: pixel types, owned buffers, view traits, and file I/O.
//!
//! Components
//! - `pixel`: `Rgb`/`Rgba` float pixels, the `TileElement` pod bound, and the
//!   `Sample` arithmetic bound the kernels are generic over.
//! - `buffer`: owned `Image<P>` in row-major layout (stride == width).
//! - `traits`: `ImageView`/`ImageViewMut` abstractions with row iterators.
//! - `io`: loading view inputs and writing the final panorama.
//!
//! Design goals
//! - Keep hot loops simple and cache-friendly via row access.
//! - Expose a fast contiguous path (`as_slice`) when `stride == width`.
//! - In-memory buffers stay small; whole-panorama data lives in
//!   [`crate::cached::CachedImage`].
pub mod buffer;
pub mod io;
pub mod pixel;
pub mod traits;

pub use self::buffer::Image;
pub use self::pixel::{Rgb, Rgba, Sample, TileElement};
pub use self::traits::{ImageView, ImageViewMut, Rows, RowsMut};
