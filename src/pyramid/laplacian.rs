//! Weighted Laplacian-pyramid accumulator over tile-cached levels.
//!
//! Each level holds two cached images: the running sum of
//! `laplacian · weight` over every injected view, and the running sum of the
//! weights themselves. Dividing the first by the second yields the mean
//! band-pass coefficient, so views can be injected in any order and the
//! collapse produces the multi-band blend of all of them.

use std::sync::Arc;

use log::debug;

use crate::bbox::BoundingBox;
use crate::cached::CachedImage;
use crate::error::{Error, Result};
use crate::image::{Image, ImageView, ImageViewMut, Rgb, Rgba, Sample, TileElement};
use crate::kernels::{
    add_in_place, downscale, edge_aware_gaussian, gaussian_5x5, scale_in_place,
    subtract_in_place, upscale, WEIGHT_EPSILON,
};
use crate::store::TileStore;

/// Collapse window over the coarse level, in coarse-level pixels.
const PROCESSING_SIZE: i64 = 512;
/// Context border around a collapse window; covers the 5×5 kernel footprint
/// after the 2× upscale.
const BORDER_SIZE: i64 = 5;

pub struct LaplacianPyramid {
    base_width: usize,
    base_height: usize,
    levels: Vec<CachedImage<Rgb>>,
    weights: Vec<CachedImage<f32>>,
}

impl LaplacianPyramid {
    /// Allocate `max_levels` color/weight accumulator pairs, halving the
    /// dimensions per level. Every pixel starts at zero.
    pub fn initialize(
        store: &Arc<TileStore>,
        base_width: usize,
        base_height: usize,
        max_levels: usize,
    ) -> Result<Self> {
        assert!(max_levels >= 1, "pyramid requires at least one level");
        let divisor = 1usize << (max_levels - 1);
        if base_width % divisor != 0 || base_height % divisor != 0 {
            return Err(Error::config(format!(
                "panorama {base_width}x{base_height} is not divisible by 2^{} for {max_levels} levels",
                max_levels - 1
            )));
        }

        let mut levels = Vec::with_capacity(max_levels);
        let mut weights = Vec::with_capacity(max_levels);
        let (mut w, mut h) = (base_width, base_height);
        for _ in 0..max_levels {
            levels.push(CachedImage::create(store, w, h)?);
            weights.push(CachedImage::create(store, w, h)?);
            w /= 2;
            h /= 2;
        }

        Ok(Self {
            base_width,
            base_height,
            levels,
            weights,
        })
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Inject one warped view.
    ///
    /// `source` is RGB float, `mask` the binary coverage (nonzero = inside
    /// the footprint), `weights` the soft contribution map; all three share
    /// the same dimensions. The view occupies the panorama region starting
    /// at `(offset_x, offset_y)`; `offset_x` is taken modulo the panorama
    /// width, so views may straddle the meridian or use offsets outside
    /// `[0, W)`.
    pub fn apply(
        &mut self,
        source: &Image<Rgb>,
        mask: &Image<u8>,
        weights: &Image<f32>,
        offset_x: i64,
        offset_y: i64,
    ) -> Result<()> {
        if (mask.w, mask.h) != (source.w, source.h)
            || (weights.w, weights.h) != (source.w, source.h)
        {
            return Err(Error::dims(format!(
                "view planes disagree: color {}x{}, mask {}x{}, weight {}x{}",
                source.w, source.h, mask.w, mask.h, weights.w, weights.h
            )));
        }
        if source.w > self.base_width || source.h > self.base_height {
            return Err(Error::dims(format!(
                "view {}x{} exceeds the {}x{} panorama",
                source.w, source.h, self.base_width, self.base_height
            )));
        }

        let mut off_x = offset_x.rem_euclid(self.base_width as i64);
        let mut off_y = offset_y;
        debug!(
            "inject view {}x{} at ({off_x}, {off_y}) across {} levels",
            source.w,
            source.h,
            self.levels.len()
        );

        let mut current_color = source.clone();
        let mut current_weights = weights.clone();
        let mut current_mask: Image<f32> =
            Image::from_fn(mask.w, mask.h, |x, y| if mask.get(x, y) != 0 { 1.0 } else { 0.0 });

        for level in 0..self.levels.len() - 1 {
            // zero signal and weight outside the footprint before any blur
            let mut masked = current_color.clone();
            for ((c, w), &m) in masked
                .data
                .iter_mut()
                .zip(&mut current_weights.data)
                .zip(&current_mask.data)
            {
                if m.abs() <= WEIGHT_EPSILON {
                    *c = Rgb::ZERO;
                    *w = 0.0;
                }
            }

            let (blurred, blurred_mask) = edge_aware_gaussian(&masked, &current_mask, true);

            let next_color = downscale(&blurred);
            let next_mask = downscale(&blurred_mask);

            // band-pass residual against the reconstruction from one level down
            let mut reblurred = gaussian_5x5(&upscale(&next_color), true);
            scale_in_place(&mut reblurred, 4.0);
            let reblurred = resized(reblurred, current_color.w, current_color.h);
            subtract_in_place(&mut current_color, &reblurred);

            let next_weights = downscale(&gaussian_5x5(&current_weights, true));

            self.merge(&current_color, &current_weights, level, off_x, off_y)?;

            current_color = next_color;
            current_weights = next_weights;
            current_mask = next_mask;
            off_x = off_x.div_euclid(2);
            off_y = off_y.div_euclid(2);
        }

        // the coarsest level keeps the Gaussian residual itself
        let last = self.levels.len() - 1;
        self.merge(&current_color, &current_weights, last, off_x, off_y)
    }

    /// Accumulate `(color · weight, weight)` into the pyramid at `level`.
    ///
    /// Wrap matters here: a view crossing the meridian lands on tiles at
    /// both ends of the level in this one extract/accumulate/assign cycle.
    fn merge(
        &mut self,
        color: &Image<Rgb>,
        weight: &Image<f32>,
        level: usize,
        off_x: i64,
        off_y: i64,
    ) -> Result<()> {
        if color.w == 0 || color.h == 0 {
            return Ok(());
        }

        let bb = BoundingBox::new(off_x, off_y, color.w as i64, color.h as i64);
        let mut acc_color = Image::new(color.w, color.h);
        let mut acc_weight = Image::new(color.w, color.h);
        self.levels[level].extract(&bb, &mut acc_color)?;
        self.weights[level].extract(&bb, &mut acc_weight)?;

        for ((a, aw), (&c, &w)) in acc_color
            .data
            .iter_mut()
            .zip(&mut acc_weight.data)
            .zip(color.data.iter().zip(&weight.data))
        {
            *a += c * w;
            *aw += w;
        }

        let src_bb = BoundingBox::new(0, 0, color.w as i64, color.h as i64);
        self.levels[level].assign(&bb, &acc_color, &src_bb)?;
        self.weights[level].assign(&bb, &acc_weight, &src_bb)?;
        Ok(())
    }

    /// Collapse the accumulators into `output`.
    ///
    /// Levels are first normalized back into pyramid coefficients, then the
    /// coarse-to-fine reconstruction runs in dilated windows so no level is
    /// ever fully resident. The pyramid holds coefficient data afterwards;
    /// no further `apply` is meaningful.
    pub fn rebuild(&mut self, output: &mut CachedImage<Rgba>) -> Result<()> {
        if output.width() != self.base_width || output.height() != self.base_height {
            return Err(Error::dims(format!(
                "output {}x{} does not match the {}x{} panorama",
                output.width(),
                output.height(),
                self.base_width,
                self.base_height
            )));
        }
        if !Arc::ptr_eq(output.store(), self.levels[0].store())
            || output.tile_width() != self.levels[0].tile_width()
            || output.tile_height() != self.levels[0].tile_height()
        {
            return Err(Error::config(
                "output tile grid does not match the pyramid's tile store",
            ));
        }

        // weighted sums -> mean coefficients; zero where nothing contributed
        for (color, weight) in self.levels.iter_mut().zip(&self.weights) {
            color.per_pixel(weight, |c, w| {
                if w > WEIGHT_EPSILON {
                    c * (1.0 / w)
                } else {
                    Rgb::ZERO
                }
            })?;
        }

        let last = self.levels.len() - 1;
        self.levels[last].transform(|c| c.max_zero())?;

        for level in (0..last).rev() {
            debug!("collapse level {} into level {}", level + 1, level);
            self.collapse_level(level)?;
            self.levels[level].transform(|c| c.max_zero())?;
        }

        self.write_output(output)
    }

    /// Reconstruct level `level` from `level + 1` in fixed-size windows:
    /// `fine += 4 · gaussian(upscale(coarse))`.
    fn collapse_level(&mut self, level: usize) -> Result<()> {
        let coarse_w = self.levels[level + 1].width() as i64;
        let coarse_h = self.levels[level + 1].height() as i64;

        let mut y = 0;
        while y < coarse_h {
            let mut x = 0;
            while x < coarse_w {
                let mut core = BoundingBox::new(x, y, PROCESSING_SIZE, PROCESSING_SIZE);
                core.clamp_right(coarse_w);
                core.clamp_bottom(coarse_h);

                // horizontal stays unclamped: wrap supplies true context at
                // both seams
                let mut dilated = core.dilate(BORDER_SIZE);
                dilated.clamp_top();
                dilated.clamp_bottom(coarse_h);

                let double_dilated = dilated.double_size();
                let double_core = core.double_size();

                let mut coarse_patch =
                    Image::new(dilated.width as usize, dilated.height as usize);
                self.levels[level + 1].extract(&dilated, &mut coarse_patch)?;

                let mut fine_patch = Image::new(
                    double_dilated.width as usize,
                    double_dilated.height as usize,
                );
                self.levels[level].extract(&double_dilated, &mut fine_patch)?;

                let mut reconstruction = gaussian_5x5(&upscale(&coarse_patch), false);
                scale_in_place(&mut reconstruction, 4.0);
                add_in_place(&mut fine_patch, &reconstruction);

                let src_bb = BoundingBox::new(
                    double_core.left - double_dilated.left,
                    double_core.top - double_dilated.top,
                    double_core.width,
                    double_core.height,
                );
                self.levels[level].assign(&double_core, &fine_patch, &src_bb)?;

                x += PROCESSING_SIZE;
            }
            y += PROCESSING_SIZE;
        }
        Ok(())
    }

    /// Copy the finest level into the RGBA output, tile by tile. Alpha is 1
    /// wherever any weight accumulated, else 0.
    fn write_output(&self, output: &mut CachedImage<Rgba>) -> Result<()> {
        let store = Arc::clone(output.store());
        let color = &self.levels[0];
        let weight = &self.weights[0];

        for i in 0..output.grid_rows() {
            for j in 0..output.grid_cols() {
                let mut out = store.acquire(output.tile(i, j))?;
                let cin = store.acquire(color.tile(i, j))?;
                let win = store.acquire(weight.tile(i, j))?;

                let dst = out.as_mut_slice();
                for ((d, &c), &w) in dst.iter_mut().zip(cin.as_slice()).zip(win.as_slice()) {
                    let a = if w < WEIGHT_EPSILON { 0.0 } else { 1.0 };
                    *d = Rgba::new(c.r, c.g, c.b, a);
                }
            }
        }
        Ok(())
    }
}

/// Copy `img` into a `w × h` buffer, trimming or zero-padding the
/// right/bottom edge. Needed when odd view dimensions make the upscaled
/// reconstruction one pixel short.
fn resized<P: Sample>(img: Image<P>, w: usize, h: usize) -> Image<P> {
    if (img.w, img.h) == (w, h) {
        return img;
    }
    let mut out = Image::new(w, h);
    for y in 0..h.min(img.h) {
        let n = w.min(img.w);
        out.row_mut(y)[..n].copy_from_slice(&img.row(y)[..n]);
    }
    out
}
