//! Multi-band compositer: the pipeline driver around the pyramid.
//!
//! One instance covers one compositing pass: `initialize` once, `append`
//! once per warped view, `terminate` to collapse the pyramid into the
//! output panorama, `save` to write it out. A failed append or terminate
//! leaves the pass unusable; there is no partial-success state to resume.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::info;

use crate::cached::CachedImage;
use crate::config::CompositerOptions;
use crate::error::{Error, Result};
use crate::image::{io, Image, Rgb, Rgba};
use crate::kernels::feathering;
use crate::pyramid::LaplacianPyramid;
use crate::store::TileStore;

pub struct MultiBandCompositer {
    width: usize,
    height: usize,
    pyramid: LaplacianPyramid,
    panorama: CachedImage<Rgba>,
}

impl MultiBandCompositer {
    /// Build the pyramid and output image for a `width × height` panorama.
    ///
    /// When `options.max_levels` is unset, the deepest level count the
    /// dimensions support is used. Dimensions not divisible by
    /// `2^(levels-1)` are an `InvalidConfiguration` error.
    pub fn initialize(
        store: &Arc<TileStore>,
        width: usize,
        height: usize,
        options: CompositerOptions,
    ) -> Result<Self> {
        let max_levels = match options.max_levels {
            Some(levels) if levels >= 1 => levels,
            Some(_) => return Err(Error::config("at least one pyramid level is required")),
            None => suggested_levels(width, height),
        };

        let pyramid = LaplacianPyramid::initialize(store, width, height, max_levels)?;
        let panorama = CachedImage::create(store, width, height)?;
        info!("multi-band compositing {width}x{height} across {max_levels} levels");

        Ok(Self {
            width,
            height,
            pyramid,
            panorama,
        })
    }

    /// Blend one warped view into the pyramid.
    ///
    /// The color is feathered by its mask first, so the pyramid's blurs see
    /// plausible neighborhood color beyond the footprint instead of black.
    pub fn append(
        &mut self,
        color: &Image<Rgb>,
        mask: &Image<u8>,
        weight: &Image<f32>,
        offset_x: i64,
        offset_y: i64,
    ) -> Result<()> {
        if (mask.w, mask.h) != (color.w, color.h) || (weight.w, weight.h) != (color.w, color.h)
        {
            return Err(Error::dims(format!(
                "view planes disagree: color {}x{}, mask {}x{}, weight {}x{}",
                color.w, color.h, mask.w, mask.h, weight.w, weight.h
            )));
        }

        let start = Instant::now();
        let feathered = feathering(color, mask);
        self.pyramid
            .apply(&feathered, mask, weight, offset_x, offset_y)?;
        info!(
            "blended {}x{} view at ({offset_x}, {offset_y}) in {:.1} ms",
            color.w,
            color.h,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    /// Collapse the pyramid into the output panorama.
    pub fn terminate(&mut self) -> Result<()> {
        let start = Instant::now();
        self.pyramid.rebuild(&mut self.panorama)?;
        info!(
            "panorama rebuilt in {:.1} ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    /// Write the panorama produced by [`terminate`].
    ///
    /// [`terminate`]: MultiBandCompositer::terminate
    pub fn save(&self, path: &Path) -> Result<()> {
        io::write_panorama(&self.panorama, path)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn level_count(&self) -> usize {
        self.pyramid.level_count()
    }

    /// The blended output; meaningful once [`terminate`] has run.
    ///
    /// [`terminate`]: MultiBandCompositer::terminate
    pub fn panorama(&self) -> &CachedImage<Rgba> {
        &self.panorama
    }
}

/// Deepest level count the panorama dimensions support: every level must
/// have integer dimensions and the coarsest stays at least 8 pixels on each
/// side.
pub fn suggested_levels(width: usize, height: usize) -> usize {
    const MIN_COARSEST_EXTENT: usize = 8;

    let mut levels = 1;
    loop {
        let divisor = 1usize << levels;
        if width % divisor != 0
            || height % divisor != 0
            || width / divisor < MIN_COARSEST_EXTENT
            || height / divisor < MIN_COARSEST_EXTENT
        {
            return levels;
        }
        levels += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggested_levels_respects_divisibility_and_extent() {
        // 144 = 16 * 9: the next halving breaks divisibility
        assert_eq!(suggested_levels(144, 144), 5);
        // the coarsest-extent floor stops a power of two
        assert_eq!(suggested_levels(64, 64), 4);
        assert_eq!(suggested_levels(4096, 2048), 9);
        // too small to halve at all
        assert_eq!(suggested_levels(10, 10), 1);
    }
}
