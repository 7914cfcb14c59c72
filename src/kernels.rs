//! Pure kernels over small in-memory images.
//!
//! Everything here operates on [`Image`] buffers extracted from the cached
//! panorama; none of it knows about tiles or wrap-around beyond the single
//! `horizontal_wrap` flag on the convolution. Wrap across the panorama seam
//! is the business of [`crate::cached::CachedImage`].

use crate::image::{Image, ImageView, ImageViewMut, Rgb, Sample, TileElement};

/// Normalised 5-tap binomial filter `[1, 4, 6, 4, 1] / 16`.
pub const GAUSSIAN_5TAP: [f32; 5] = [0.0625, 0.25, 0.375, 0.25, 0.0625];

const RADIUS: isize = 2;

/// Weights (and blurred masks) below this threshold count as no coverage.
pub const WEIGHT_EPSILON: f32 = 1e-6;

/// Separable 5×5 Gaussian.
///
/// `horizontal_wrap` selects whether out-of-range columns wrap modulo the
/// width (the default for panorama-wide buffers) or clamp to the edge (used
/// on dilated rebuild windows, which carry their own context). Rows always
/// clamp.
pub fn gaussian_5x5<P: Sample>(src: &Image<P>, horizontal_wrap: bool) -> Image<P> {
    if src.w == 0 || src.h == 0 {
        return Image::new(src.w, src.h);
    }
    let tmp = horizontal_pass(src, horizontal_wrap);
    vertical_pass(&tmp)
}

fn horizontal_pass<P: Sample>(src: &Image<P>, wrap: bool) -> Image<P> {
    let w = src.w;
    let mut out = Image::new(src.w, src.h);

    let filter_row = |y: usize, drow: &mut [P]| {
        let srow = src.row(y);
        for (x, d) in drow.iter_mut().enumerate() {
            let mut acc = P::ZERO;
            for (k, &tap) in GAUSSIAN_5TAP.iter().enumerate() {
                let ix = x as isize + k as isize - RADIUS;
                let i = if wrap {
                    ix.rem_euclid(w as isize) as usize
                } else {
                    clamp_index(ix, w)
                };
                acc += srow[i] * tap;
            }
            *d = acc;
        }
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        out.data
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| filter_row(y, row));
    }
    #[cfg(not(feature = "parallel"))]
    for y in 0..src.h {
        filter_row(y, out.row_mut(y));
    }

    out
}

fn vertical_pass<P: Sample>(src: &Image<P>) -> Image<P> {
    let w = src.w;
    let mut out = Image::new(src.w, src.h);

    let filter_row = |y: usize, drow: &mut [P]| {
        for (k, &tap) in GAUSSIAN_5TAP.iter().enumerate() {
            let sy = clamp_index(y as isize + k as isize - RADIUS, src.h);
            for (d, &s) in drow.iter_mut().zip(src.row(sy)) {
                *d += s * tap;
            }
        }
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        out.data
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| filter_row(y, row));
    }
    #[cfg(not(feature = "parallel"))]
    for y in 0..src.h {
        filter_row(y, out.row_mut(y));
    }

    out
}

fn clamp_index(idx: isize, upper: usize) -> usize {
    if idx < 0 {
        0
    } else if (idx as usize) >= upper {
        upper - 1
    } else {
        idx as usize
    }
}

/// Point-sample every other pixel. The input is expected to be blurred
/// already; this is the decimation half of a Gaussian pyramid step.
pub fn downscale<P: Sample>(src: &Image<P>) -> Image<P> {
    let mut out = Image::new(src.w / 2, src.h / 2);
    for y in 0..out.h {
        let srow = src.row(2 * y);
        let drow = out.row_mut(y);
        for (x, d) in drow.iter_mut().enumerate() {
            *d = srow[2 * x];
        }
    }
    out
}

/// Zero-fill 2× upscale: `(2x, 2y)` takes the source pixel, the other three
/// pixels of each block stay zero. The Gaussian that follows, scaled by 4,
/// supplies the interpolation with unit DC response.
pub fn upscale<P: Sample>(src: &Image<P>) -> Image<P> {
    let mut out = Image::new(src.w * 2, src.h * 2);
    for y in 0..src.h {
        let srow = src.row(y);
        let drow = out.row_mut(2 * y);
        for (x, &s) in srow.iter().enumerate() {
            drow[2 * x] = s;
        }
    }
    out
}

/// `dst += src`, componentwise.
pub fn add_in_place<P: Sample>(dst: &mut Image<P>, src: &Image<P>) {
    assert_eq!((dst.w, dst.h), (src.w, src.h), "addition operands disagree");
    for (d, &s) in dst.data.iter_mut().zip(&src.data) {
        *d += s;
    }
}

/// `dst -= src`, componentwise.
pub fn subtract_in_place<P: Sample>(dst: &mut Image<P>, src: &Image<P>) {
    assert_eq!((dst.w, dst.h), (src.w, src.h), "subtraction operands disagree");
    for (d, &s) in dst.data.iter_mut().zip(&src.data) {
        *d = *d - s;
    }
}

/// `img *= s`.
pub fn scale_in_place<P: Sample>(img: &mut Image<P>, s: f32) {
    for px in &mut img.data {
        *px = *px * s;
    }
}

/// Mask-aware Gaussian: blur the masked signal and the mask independently,
/// then divide the blurred signal by the blurred mask.
///
/// Near a mask boundary the plain Gaussian mixes in whatever lies outside
/// the footprint; dividing by the identically-blurred mask renormalizes the
/// kernel over the covered samples only, so nothing bleeds in. `color` must
/// already be zero wherever `mask` is zero. Returns the normalized color
/// and the re-binarized mask (1 where any coverage survived the blur, else
/// 0).
pub fn edge_aware_gaussian(
    color: &Image<Rgb>,
    mask: &Image<f32>,
    horizontal_wrap: bool,
) -> (Image<Rgb>, Image<f32>) {
    debug_assert_eq!((color.w, color.h), (mask.w, mask.h));
    let mut blurred = gaussian_5x5(color, horizontal_wrap);
    let mut blurred_mask = gaussian_5x5(mask, horizontal_wrap);

    for (c, m) in blurred.data.iter_mut().zip(&mut blurred_mask.data) {
        if m.abs() > WEIGHT_EPSILON {
            *c = *c * (1.0 / *m);
            *m = 1.0;
        } else {
            *c = Rgb::ZERO;
            *m = 0.0;
        }
    }
    (blurred, blurred_mask)
}

/// Fill pixels outside the mask with color pulled from progressively
/// coarser mask-aware averages.
///
/// Later blurs see plausible neighborhood color instead of black beyond
/// every footprint edge. Covered pixels are returned unchanged.
pub fn feathering(color: &Image<Rgb>, mask: &Image<u8>) -> Image<Rgb> {
    assert_eq!((color.w, color.h), (mask.w, mask.h), "feathering operands disagree");

    let mut colors = vec![color.clone()];
    let mut masks = vec![mask.clone()];

    let (mut w, mut h) = (color.w, color.h);
    while w >= 2 && h >= 2 {
        let src = colors.last().expect("previous level available");
        let src_mask = masks.last().expect("previous level available");

        let (nw, nh) = (w / 2, h / 2);
        let mut half = Image::new(nw, nh);
        let mut half_mask = Image::new(nw, nh);

        for y in 0..nh {
            for x in 0..nw {
                let mut acc = Rgb::ZERO;
                let mut count = 0u32;
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let (sx, sy) = (2 * x + dx, 2 * y + dy);
                    if src_mask.get(sx, sy) != 0 {
                        acc += src.get(sx, sy);
                        count += 1;
                    }
                }
                if count > 0 {
                    half.set(x, y, acc * (1.0 / count as f32));
                    half_mask.set(x, y, 255);
                }
            }
        }

        colors.push(half);
        masks.push(half_mask);
        w = nw;
        h = nh;
    }

    for lvl in (0..colors.len().saturating_sub(1)).rev() {
        let (fine, coarse) = colors.split_at_mut(lvl + 1);
        let fine = &mut fine[lvl];
        let coarse = &coarse[0];
        let fine_mask = &masks[lvl];
        for y in 0..fine.h {
            for x in 0..fine.w {
                if fine_mask.get(x, y) == 0 {
                    let v = coarse.get((x / 2).min(coarse.w - 1), (y / 2).min(coarse.h - 1));
                    fine.set(x, y, v);
                }
            }
        }
    }

    colors.swap_remove(0)
}
