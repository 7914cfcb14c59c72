//! I/O helpers for view inputs and the final panorama.
//!
//! - `load_color`: read a warped view into an RGB float buffer.
//! - `load_mask`: read a coverage mask (nonzero = inside the camera footprint).
//! - `load_weight`: read a soft weight map as float gray.
//! - `write_panorama`: write the blended RGBA panorama; `.exr` keeps float
//!   data, any other extension goes through an 8-bit clamp.
use std::fs;
use std::path::Path;

use image::{DynamicImage, Rgba32FImage, RgbaImage};

use super::pixel::{Rgb, Rgba};
use super::traits::ImageViewMut;
use super::Image;
use crate::cached::CachedImage;
use crate::error::{Error, Result};
use crate::BoundingBox;

/// Read a warped view into an RGB float buffer.
pub fn load_color(path: &Path) -> Result<Image<Rgb>> {
    let img = image::open(path)
        .map_err(|e| Error::image(path, e))?
        .to_rgb32f();
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut out = Image::new(w, h);
    for (y, row) in out.rows_mut().enumerate() {
        for (x, px) in row.iter_mut().enumerate() {
            let p = img.get_pixel(x as u32, y as u32);
            *px = Rgb::new(p[0], p[1], p[2]);
        }
    }
    Ok(out)
}

/// Read a binary coverage mask. Any nonzero sample counts as covered.
pub fn load_mask(path: &Path) -> Result<Image<u8>> {
    let img = image::open(path)
        .map_err(|e| Error::image(path, e))?
        .to_luma8();
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut out = Image::new(w, h);
    for (y, row) in out.rows_mut().enumerate() {
        for (x, px) in row.iter_mut().enumerate() {
            *px = img.get_pixel(x as u32, y as u32)[0];
        }
    }
    Ok(out)
}

/// Read a soft weight map as float gray, averaging channels if the file is
/// stored as color.
pub fn load_weight(path: &Path) -> Result<Image<f32>> {
    let img = image::open(path)
        .map_err(|e| Error::image(path, e))?
        .to_rgb32f();
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut out = Image::new(w, h);
    for (y, row) in out.rows_mut().enumerate() {
        for (x, px) in row.iter_mut().enumerate() {
            let p = img.get_pixel(x as u32, y as u32);
            *px = (p[0] + p[1] + p[2]) / 3.0;
        }
    }
    Ok(out)
}

/// Write the blended panorama to `path`.
///
/// The cached image is read back one tile-row band at a time; the encoded
/// image is assembled in memory because the encoders write whole files.
pub fn write_panorama(panorama: &CachedImage<Rgba>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
    }

    let w = panorama.width();
    let h = panorama.height();
    let band_rows = panorama.tile_height();

    let mut out = Rgba32FImage::new(w as u32, h as u32);
    let mut y = 0usize;
    while y < h {
        let rows = band_rows.min(h - y);
        let mut band = Image::new(w, rows);
        panorama.extract(
            &BoundingBox::new(0, y as i64, w as i64, rows as i64),
            &mut band,
        )?;
        for by in 0..rows {
            for x in 0..w {
                let p = band.get(x, by);
                out.put_pixel(x as u32, (y + by) as u32, image::Rgba([p.r, p.g, p.b, p.a]));
            }
        }
        y += rows;
    }

    let float_output = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("exr"));

    if float_output {
        DynamicImage::ImageRgba32F(out)
            .save(path)
            .map_err(|e| Error::image(path, e))
    } else {
        let mut lo = RgbaImage::new(w as u32, h as u32);
        for (x, y, px) in out.enumerate_pixels() {
            let q = |v: f32| (v * 255.0).clamp(0.0, 255.0) as u8;
            lo.put_pixel(x, y, image::Rgba([q(px[0]), q(px[1]), q(px[2]), q(px[3])]));
        }
        lo.save(path).map_err(|e| Error::image(path, e))
    }
}
