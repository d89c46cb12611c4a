//! Pixel-format conversions used during import (spec §4.3 "Pixel-format conversions").

use crate::error::PixelError;
use crate::pixel::{Palette, PixelType, SampleType};
use crate::raster::Raster;

/// Colour-to-grayscale channel-average convention, applied per pixel.
fn rgb_to_gray_value(r: f64, g: f64, b: f64) -> f64 {
    (r + g + b) / 3.0
}

/// RGB raster to 8-bit grayscale.
pub fn rgb_to_grayscale(src: &Raster) -> Result<Raster, PixelError> {
    if src.pixel_type() != PixelType::Rgb {
        return Err(PixelError::InvalidShape {
            sample: src.sample_type(),
            pixel: src.pixel_type(),
            bands: src.bands(),
        });
    }
    let mut out = Raster::allocate(src.width(), src.height(), src.sample_type(), PixelType::Grayscale, 1)?;
    if src.mask().is_some() {
        out.ensure_mask();
    }
    for row in 0..src.height() {
        for col in 0..src.width() {
            let p = src.get_pixel(col, row)?;
            let gray = rgb_to_gray_value(p.sample(0).unwrap(), p.sample(1).unwrap(), p.sample(2).unwrap());
            let mut gp = crate::pixel::Pixel::new(src.sample_type(), PixelType::Grayscale, 1)?;
            gp.set_sample(0, gray)?;
            gp.set_transparent(p.is_transparent());
            out.set_pixel(col, row, &gp)?;
        }
    }
    Ok(out)
}

/// Grayscale raster to RGB by replicating the sample into R, G and B.
pub fn grayscale_to_rgb(src: &Raster) -> Result<Raster, PixelError> {
    if src.pixel_type() != PixelType::Grayscale {
        return Err(PixelError::InvalidShape {
            sample: src.sample_type(),
            pixel: src.pixel_type(),
            bands: src.bands(),
        });
    }
    let mut out = Raster::allocate(src.width(), src.height(), src.sample_type(), PixelType::Rgb, 3)?;
    if src.mask().is_some() {
        out.ensure_mask();
    }
    for row in 0..src.height() {
        for col in 0..src.width() {
            let p = src.get_pixel(col, row)?;
            let v = p.sample(0).unwrap();
            let mut rgb = crate::pixel::Pixel::new(src.sample_type(), PixelType::Rgb, 3)?;
            rgb.set_sample(0, v)?;
            rgb.set_sample(1, v)?;
            rgb.set_sample(2, v)?;
            rgb.set_transparent(p.is_transparent());
            out.set_pixel(col, row, &rgb)?;
        }
    }
    Ok(out)
}

/// Palette raster to RGB (or grayscale, via an extra average) through a palette lookup.
pub fn palette_to_rgb(src: &Raster) -> Result<Raster, PixelError> {
    let palette = src.palette().ok_or_else(|| PixelError::InvalidPalette {
        reason: "raster has no palette".into(),
    })?;
    if src.pixel_type() != PixelType::Palette {
        return Err(PixelError::InvalidShape {
            sample: src.sample_type(),
            pixel: src.pixel_type(),
            bands: src.bands(),
        });
    }
    let mut out = Raster::allocate(src.width(), src.height(), SampleType::UInt8, PixelType::Rgb, 3)?;
    out.ensure_mask();
    for row in 0..src.height() {
        for col in 0..src.width() {
            let idx = src.get_pixel(col, row)?;
            let rgb = idx.palette_lookup(palette)?;
            out.set_pixel(col, row, &rgb)?;
        }
    }
    Ok(out)
}

pub fn palette_to_grayscale(src: &Raster) -> Result<Raster, PixelError> {
    let rgb = palette_to_rgb(src)?;
    rgb_to_grayscale(&rgb)
}

/// 1-bit monochrome raster to 8-bit grayscale (0 -> black, 1 -> white unless
/// palette recolouring says otherwise).
pub fn monochrome_to_grayscale(src: &Raster) -> Result<Raster, PixelError> {
    if src.pixel_type() != PixelType::Monochrome {
        return Err(PixelError::InvalidShape {
            sample: src.sample_type(),
            pixel: src.pixel_type(),
            bands: src.bands(),
        });
    }
    let mut out = Raster::allocate(src.width(), src.height(), SampleType::UInt8, PixelType::Grayscale, 1)?;
    if src.mask().is_some() {
        out.ensure_mask();
    }
    for row in 0..src.height() {
        for col in 0..src.width() {
            let p = src.get_pixel(col, row)?;
            let bit = p.sample(0).unwrap_or(0.0);
            let gray = if bit > 0.5 { 0.0 } else { 255.0 };
            let mut gp = crate::pixel::Pixel::new(SampleType::UInt8, PixelType::Grayscale, 1)?;
            gp.set_sample(0, gray)?;
            gp.set_transparent(p.is_transparent());
            out.set_pixel(col, row, &gp)?;
        }
    }
    Ok(out)
}

/// Promote a decoded sub-byte palette raster to 8-bit RGB via palette lookup
/// (spec §4.3 "Sub-byte monochrome/palette tiles decoded at scale > 1 are
/// promoted").
pub fn promote_palette_for_scale(src: &Raster, palette: &Palette) -> Result<Raster, PixelError> {
    let mut with_palette = src.clone();
    if with_palette.palette().is_none() {
        with_palette.set_palette(palette.clone())?;
    }
    palette_to_rgb(&with_palette)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::{Pixel, RgbEntry};

    #[test]
    fn rgb_to_gray_averages_channels() {
        let mut r = Raster::allocate(1, 1, SampleType::UInt8, PixelType::Rgb, 3).unwrap();
        let p = Pixel::from_samples(SampleType::UInt8, PixelType::Rgb, vec![30.0, 60.0, 90.0]).unwrap();
        r.set_pixel(0, 0, &p).unwrap();
        let gray = rgb_to_grayscale(&r).unwrap();
        assert_eq!(gray.get_pixel(0, 0).unwrap().sample(0), Some(60.0));
    }

    #[test]
    fn grayscale_to_rgb_replicates_sample() {
        let mut r = Raster::allocate(1, 1, SampleType::UInt8, PixelType::Grayscale, 1).unwrap();
        let p = Pixel::from_samples(SampleType::UInt8, PixelType::Grayscale, vec![128.0]).unwrap();
        r.set_pixel(0, 0, &p).unwrap();
        let rgb = grayscale_to_rgb(&r).unwrap();
        let out = rgb.get_pixel(0, 0).unwrap();
        assert_eq!((out.sample(0), out.sample(1), out.sample(2)), (Some(128.0), Some(128.0), Some(128.0)));
    }

    #[test]
    fn monochrome_to_grayscale_inverts() {
        let mut r = Raster::allocate(2, 1, SampleType::UInt1, PixelType::Monochrome, 1).unwrap();
        let black = Pixel::from_samples(SampleType::UInt1, PixelType::Monochrome, vec![1.0]).unwrap();
        let white = Pixel::from_samples(SampleType::UInt1, PixelType::Monochrome, vec![0.0]).unwrap();
        r.set_pixel(0, 0, &black).unwrap();
        r.set_pixel(1, 0, &white).unwrap();
        let gray = monochrome_to_grayscale(&r).unwrap();
        assert_eq!(gray.get_pixel(0, 0).unwrap().sample(0), Some(0.0));
        assert_eq!(gray.get_pixel(1, 0).unwrap().sample(0), Some(255.0));
    }

    #[test]
    fn palette_to_rgb_uses_lookup() {
        let mut r = Raster::allocate(1, 1, SampleType::UInt8, PixelType::Palette, 1).unwrap();
        let palette = Palette::new(vec![RgbEntry::new(1, 2, 3), RgbEntry::new(9, 8, 7)], 256).unwrap();
        r.set_palette(palette).unwrap();
        let idx = Pixel::from_samples(SampleType::UInt8, PixelType::Palette, vec![1.0]).unwrap();
        r.set_pixel(0, 0, &idx).unwrap();
        let rgb = palette_to_rgb(&r).unwrap();
        let out = rgb.get_pixel(0, 0).unwrap();
        assert_eq!((out.sample(0), out.sample(1), out.sample(2)), (Some(9.0), Some(8.0), Some(7.0)));
    }
}
