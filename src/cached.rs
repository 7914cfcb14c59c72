//! Logical 2D images laid out as a grid of store tiles.
//!
//! A `CachedImage<T>` covers `width × height` pixels with full-size tiles;
//! right/bottom edge tiles carry padding that is written by `fill` but never
//! read back through the public operations. Horizontal wrap is owned here:
//! `extract` and `assign` map out-of-range columns modulo the image width,
//! so a region may straddle the 0°/360° meridian (or lie entirely outside
//! `[0, W)`) and still read/write the right tiles. Rows clamp instead of
//! wrapping.

use std::sync::Arc;

use crate::bbox::BoundingBox;
use crate::error::{Error, Result};
use crate::image::{Image, ImageView, ImageViewMut, TileElement};
use crate::store::{TileHandle, TileStore};

pub struct CachedImage<T: TileElement> {
    store: Arc<TileStore>,
    width: usize,
    height: usize,
    tiles: Vec<Vec<TileHandle<T>>>,
}

impl<T: TileElement> CachedImage<T> {
    /// Allocate a tile grid covering `width × height`. Tile contents are
    /// zero on first use.
    pub fn create(store: &Arc<TileStore>, width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::config("cached image dimensions must be positive"));
        }
        let tw = store.tile_width();
        let th = store.tile_height();
        let cols = width.div_ceil(tw);
        let rows = height.div_ceil(th);

        let mut tiles = Vec::with_capacity(rows);
        for _ in 0..rows {
            let mut row = Vec::with_capacity(cols);
            for _ in 0..cols {
                row.push(store.new_tile::<T>(tw, th)?);
            }
            tiles.push(row);
        }

        Ok(Self {
            store: Arc::clone(store),
            width,
            height,
            tiles,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn tile_width(&self) -> usize {
        self.store.tile_width()
    }

    #[inline]
    pub fn tile_height(&self) -> usize {
        self.store.tile_height()
    }

    pub(crate) fn grid_rows(&self) -> usize {
        self.tiles.len()
    }

    pub(crate) fn grid_cols(&self) -> usize {
        self.tiles[0].len()
    }

    pub(crate) fn tile(&self, i: usize, j: usize) -> TileHandle<T> {
        self.tiles[i][j]
    }

    pub(crate) fn store(&self) -> &Arc<TileStore> {
        &self.store
    }

    /// Write `v` to every pixel of every tile, padding included.
    pub fn fill(&mut self, v: T) -> Result<()> {
        self.for_each_tile(|tile| {
            self.store.acquire(tile)?.as_mut_slice().fill(v);
            Ok(())
        })
    }

    /// Apply `f` to every pixel in place, tile by tile.
    pub fn transform<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(T) -> T + Sync,
    {
        self.for_each_tile(|tile| {
            let mut guard = self.store.acquire(tile)?;
            for px in guard.as_mut_slice() {
                *px = f(*px);
            }
            Ok(())
        })
    }

    /// Combine with a same-shaped image: `self[p] = f(self[p], other[p])`
    /// at every pixel position, tile by tile.
    pub fn per_pixel<U, F>(&mut self, other: &CachedImage<U>, f: F) -> Result<()>
    where
        U: TileElement,
        F: Fn(T, U) -> T + Sync,
    {
        if self.width != other.width || self.height != other.height {
            return Err(Error::dims(format!(
                "per-pixel operands disagree: {}x{} vs {}x{}",
                self.width, self.height, other.width, other.height
            )));
        }

        self.for_each_grid(|i, j| {
            let mut dst = self.store.acquire(self.tiles[i][j])?;
            let src = other.store.acquire(other.tiles[i][j])?;
            for (d, &s) in dst.as_mut_slice().iter_mut().zip(src.as_slice()) {
                *d = f(*d, s);
            }
            Ok(())
        })
    }

    /// Copy the pixels of `region` into `dst`.
    ///
    /// Columns wrap modulo the image width; a region wider than the image
    /// reads repeated columns. Rows outside `[0, height)` are skipped and
    /// the corresponding `dst` rows are left untouched; a region whose
    /// vertical range clamps to nothing is an error.
    pub fn extract(&self, region: &BoundingBox, dst: &mut Image<T>) -> Result<()> {
        self.check_region_shape(region, dst.w, dst.h)?;
        let (y0, y1) = self.clamp_rows(region)?;

        for (px0, len, off) in self.wrap_spans(region.left, region.width) {
            self.copy_span_out(px0, len, y0, y1, region.top, off, dst)?;
        }
        Ok(())
    }

    /// Write `src[src_region]` into `region`, the inverse of [`extract`].
    ///
    /// Same wrap/clamp rules. `src_region` must match `region` in shape and
    /// lie inside `src`.
    ///
    /// [`extract`]: CachedImage::extract
    pub fn assign(
        &mut self,
        region: &BoundingBox,
        src: &Image<T>,
        src_region: &BoundingBox,
    ) -> Result<()> {
        if region.width != src_region.width || region.height != src_region.height {
            return Err(Error::dims(format!(
                "assign regions disagree: {}x{} vs {}x{}",
                region.width, region.height, src_region.width, src_region.height
            )));
        }
        if src_region.left < 0
            || src_region.top < 0
            || src_region.right() > src.w as i64
            || src_region.bottom() > src.h as i64
        {
            return Err(Error::dims(format!(
                "source region {}..{} x {}..{} outside source image {}x{}",
                src_region.left,
                src_region.right(),
                src_region.top,
                src_region.bottom(),
                src.w,
                src.h
            )));
        }
        let (y0, y1) = self.clamp_rows(region)?;

        for (px0, len, off) in self.wrap_spans(region.left, region.width) {
            self.copy_span_in(px0, len, y0, y1, region.top, off, src, src_region)?;
        }
        Ok(())
    }

    fn check_region_shape(&self, region: &BoundingBox, w: usize, h: usize) -> Result<()> {
        if region.width != w as i64 || region.height != h as i64 {
            return Err(Error::dims(format!(
                "region {}x{} does not match buffer {}x{}",
                region.width, region.height, w, h
            )));
        }
        Ok(())
    }

    fn clamp_rows(&self, region: &BoundingBox) -> Result<(usize, usize)> {
        let y0 = region.top.max(0);
        let y1 = region.bottom().min(self.height as i64);
        if y0 >= y1 {
            return Err(Error::bounds(format!(
                "rows {}..{} clamp to nothing in 0..{}",
                region.top,
                region.bottom(),
                self.height
            )));
        }
        Ok((y0 as usize, y1 as usize))
    }

    /// Split a horizontal range into spans that do not cross the wrap seam.
    /// Each span is (first panorama column, length, offset into the region).
    fn wrap_spans(&self, left: i64, width: i64) -> Vec<(usize, usize, usize)> {
        let w = self.width as i64;
        let mut spans = Vec::new();
        let mut off = 0i64;
        while off < width {
            let start = (left + off).rem_euclid(w);
            let len = (w - start).min(width - off);
            spans.push((start as usize, len as usize, off as usize));
            off += len;
        }
        spans
    }

    fn copy_span_out(
        &self,
        px0: usize,
        len: usize,
        y0: usize,
        y1: usize,
        region_top: i64,
        region_off: usize,
        dst: &mut Image<T>,
    ) -> Result<()> {
        let tw = self.tile_width();
        let th = self.tile_height();

        for ti in (y0 / th)..=((y1 - 1) / th) {
            let ry0 = y0.max(ti * th);
            let ry1 = y1.min((ti + 1) * th);
            let mut x = px0;
            let mut dx = region_off;
            while x < px0 + len {
                let tj = x / tw;
                let tx = x % tw;
                let n = (tw - tx).min(px0 + len - x);
                let guard = self.store.acquire(self.tiles[ti][tj])?;
                let data = guard.as_slice();
                for y in ry0..ry1 {
                    let src = &data[(y - ti * th) * tw + tx..][..n];
                    let dy = (y as i64 - region_top) as usize;
                    dst.row_mut(dy)[dx..dx + n].copy_from_slice(src);
                }
                x += n;
                dx += n;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn copy_span_in(
        &mut self,
        px0: usize,
        len: usize,
        y0: usize,
        y1: usize,
        region_top: i64,
        region_off: usize,
        src: &Image<T>,
        src_region: &BoundingBox,
    ) -> Result<()> {
        let tw = self.tile_width();
        let th = self.tile_height();

        for ti in (y0 / th)..=((y1 - 1) / th) {
            let ry0 = y0.max(ti * th);
            let ry1 = y1.min((ti + 1) * th);
            let mut x = px0;
            let mut dx = region_off;
            while x < px0 + len {
                let tj = x / tw;
                let tx = x % tw;
                let n = (tw - tx).min(px0 + len - x);
                let mut guard = self.store.acquire(self.tiles[ti][tj])?;
                let data = guard.as_mut_slice();
                for y in ry0..ry1 {
                    let sy = (y as i64 - region_top + src_region.top) as usize;
                    let sx = src_region.left as usize + dx;
                    let row = &src.row(sy)[sx..sx + n];
                    data[(y - ti * th) * tw + tx..][..n].copy_from_slice(row);
                }
                x += n;
                dx += n;
            }
        }
        Ok(())
    }

    fn for_each_tile<F>(&self, f: F) -> Result<()>
    where
        F: Fn(TileHandle<T>) -> Result<()> + Sync,
    {
        self.for_each_grid(|i, j| f(self.tiles[i][j]))
    }

    #[cfg(feature = "parallel")]
    fn for_each_grid<F>(&self, f: F) -> Result<()>
    where
        F: Fn(usize, usize) -> Result<()> + Sync,
    {
        use rayon::prelude::*;
        let cols = self.grid_cols();
        (0..self.grid_rows())
            .into_par_iter()
            .try_for_each(|i| (0..cols).try_for_each(|j| f(i, j)))
    }

    #[cfg(not(feature = "parallel"))]
    fn for_each_grid<F>(&self, f: F) -> Result<()>
    where
        F: Fn(usize, usize) -> Result<()> + Sync,
    {
        for i in 0..self.grid_rows() {
            for j in 0..self.grid_cols() {
                f(i, j)?;
            }
        }
        Ok(())
    }
}
