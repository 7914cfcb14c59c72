//! Synthetic view builders shared by the blending tests.

use std::path::Path;
use std::sync::Arc;

use pano_compositer::image::{Image, Rgb, Rgba};
use pano_compositer::{
    BoundingBox, CompositerOptions, MultiBandCompositer, TileStore, TileStoreOptions,
};

/// Store + compositer over a scratch directory, with explicit pyramid depth
/// and tile budget.
pub fn compositer(
    scratch: &Path,
    width: usize,
    height: usize,
    levels: usize,
    tile_size: usize,
    max_resident_tiles: usize,
) -> MultiBandCompositer {
    let store = Arc::new(
        TileStore::create(
            TileStoreOptions::default()
                .with_scratch_dir(scratch)
                .with_tile_size(tile_size)
                .with_max_resident_tiles(max_resident_tiles),
        )
        .expect("tile store"),
    );
    MultiBandCompositer::initialize(
        &store,
        width,
        height,
        CompositerOptions::default().with_max_levels(levels),
    )
    .expect("compositer")
}

/// Constant-color view with full mask and unit weight.
pub fn constant_view(w: usize, h: usize, color: Rgb) -> (Image<Rgb>, Image<u8>, Image<f32>) {
    (
        Image::filled(w, h, color),
        Image::filled(w, h, 255u8),
        Image::filled(w, h, 1.0),
    )
}

/// Smooth color gradient across the view, full mask, unit weight.
pub fn gradient_view(w: usize, h: usize) -> (Image<Rgb>, Image<u8>, Image<f32>) {
    let color = Image::from_fn(w, h, |x, y| {
        Rgb::new(
            0.1 + 0.8 * x as f32 / w as f32,
            0.1 + 0.8 * y as f32 / h as f32,
            0.5,
        )
    });
    (color, Image::filled(w, h, 255u8), Image::filled(w, h, 1.0))
}

/// Weight ramp falling linearly from 1 at the left edge to ~0 at the right.
pub fn falling_weights(w: usize, h: usize) -> Image<f32> {
    Image::from_fn(w, h, |x, _| 1.0 - x as f32 / w as f32)
}

/// Weight ramp rising linearly from ~0 at the left edge to 1 at the right.
pub fn rising_weights(w: usize, h: usize) -> Image<f32> {
    Image::from_fn(w, h, |x, _| (x + 1) as f32 / w as f32)
}

/// Read the whole panorama back into memory.
pub fn snapshot(compositer: &MultiBandCompositer) -> Image<Rgba> {
    let pano = compositer.panorama();
    let (w, h) = (pano.width(), pano.height());
    let mut out = Image::new(w, h);
    pano.extract(&BoundingBox::new(0, 0, w as i64, h as i64), &mut out)
        .expect("extract panorama");
    out
}

/// Largest per-channel RGB deviation between two same-sized images.
pub fn max_rgb_difference(a: &Image<Rgba>, b: &Image<Rgba>) -> f32 {
    assert_eq!((a.w, a.h), (b.w, b.h));
    a.data
        .iter()
        .zip(&b.data)
        .map(|(p, q)| {
            (p.r - q.r)
                .abs()
                .max((p.g - q.g).abs())
                .max((p.b - q.b).abs())
        })
        .fold(0.0, f32::max)
}
