//! Owned in-memory image buffer in row-major layout (stride == width).
//!
//! The pipeline extracts panorama regions into these buffers, runs the pure
//! kernels on them, and assigns the results back to the tile-cached images.

use super::pixel::TileElement;
use super::traits::{ImageView, ImageViewMut};

#[derive(Clone, Debug)]
pub struct Image<P> {
    /// Image width in pixels
    pub w: usize,
    /// Image height in pixels
    pub h: usize,
    /// Number of elements between consecutive rows (equals `w`)
    pub stride: usize,
    /// Backing storage in row-major order
    pub data: Vec<P>,
}

impl<P: TileElement> Image<P> {
    /// Construct a zero-initialized buffer of size `w × h`.
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            stride: w,
            data: vec![P::ZERO; w * h],
        }
    }

    /// Construct a buffer filled with `v`.
    pub fn filled(w: usize, h: usize, v: P) -> Self {
        Self {
            w,
            h,
            stride: w,
            data: vec![v; w * h],
        }
    }

    /// Construct a buffer by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(w: usize, h: usize, mut f: impl FnMut(usize, usize) -> P) -> Self {
        let mut out = Self::new(w, h);
        for y in 0..h {
            let row = out.row_mut(y);
            for (x, px) in row.iter_mut().enumerate() {
                *px = f(x, y);
            }
        }
        out
    }

    #[inline]
    /// Convert (x, y) to a linear index into `data`.
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.stride + x
    }

    #[inline]
    /// Get the pixel value at (x, y).
    pub fn get(&self, x: usize, y: usize) -> P {
        self.data[self.idx(x, y)]
    }

    #[inline]
    /// Set the pixel value at (x, y).
    pub fn set(&mut self, x: usize, y: usize, v: P) {
        let i = self.idx(x, y);
        self.data[i] = v;
    }
}

impl<P: TileElement> ImageView for Image<P> {
    type Pixel = P;

    #[inline]
    fn width(&self) -> usize {
        self.w
    }
    #[inline]
    fn height(&self) -> usize {
        self.h
    }
    #[inline]
    fn stride(&self) -> usize {
        self.stride
    }
    #[inline]
    fn row(&self, y: usize) -> &[P] {
        let start = y * self.stride;
        &self.data[start..start + self.w]
    }
    #[inline]
    fn as_slice(&self) -> Option<&[P]> {
        (self.stride == self.w).then_some(&self.data[..self.w * self.h])
    }
}

impl<P: TileElement> ImageViewMut for Image<P> {
    #[inline]
    fn row_mut(&mut self, y: usize) -> &mut [P] {
        let start = y * self.stride;
        let end = start + self.w;
        &mut self.data[start..end]
    }

    #[inline]
    fn as_mut_slice(&mut self) -> Option<&mut [P]> {
        if self.stride == self.w {
            Some(&mut self.data[..self.w * self.h])
        } else {
            None
        }
    }
}
