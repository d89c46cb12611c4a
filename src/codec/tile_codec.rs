//! Tile encode/decode (spec §4.3 "Encode"/"Decode").

use std::io::{Cursor, Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression as ZlibLevel;
use image::{ColorType, ImageEncoder};

use crate::error::CodecError;
use crate::pixel::{Palette, Pixel, PixelType, SampleType};
use crate::raster::{rescale_block_grid, Raster};

use super::blob::{BlobHalf, TileBlobHeader};
use super::compression::Compression;
use super::fax4;
use super::{gif_codec, packing, png_codec};

/// Encode a raster as an `(odd, even)` blob pair.
pub fn encode(raster: &Raster, compression: Compression, quality: u8) -> Result<(Vec<u8>, Option<Vec<u8>>), CodecError> {
    if !compression.is_compatible(raster.pixel_type(), raster.bands(), raster.sample_type()) {
        return Err(CodecError::IncompatibleCompression {
            compression,
            pixel: raster.pixel_type(),
            bands: raster.bands(),
            sample: raster.sample_type(),
        });
    }

    let header = |half: BlobHalf| TileBlobHeader {
        compression,
        sample_type: raster.sample_type(),
        pixel_type: raster.pixel_type(),
        bands: raster.bands(),
        tile_width: raster.width() as u16,
        tile_height: raster.height() as u16,
        half,
    };

    let odd_payload = encode_odd_payload(raster, compression, quality)?;
    let odd = header(BlobHalf::Odd).encode(&odd_payload);

    let even = if compression.has_even_blob() {
        let decoded_odd = decode_odd_payload(&odd_payload, compression, raster.width(), raster.height(), raster.sample_type(), raster.pixel_type(), raster.bands())?;
        let residual = diff_bytes(raster.pixels(), decoded_odd.pixels());
        let compressed = deflate(&residual)?;
        Some(header(BlobHalf::Even).encode(&compressed))
    } else {
        None
    };

    Ok((odd, even))
}

/// Decode a tile at the given scale (`1`, `2`, `4` or `8` denominator).
///
/// `palette` is the coverage's palette, required to promote sub-byte
/// palette tiles to RGB when `scale_denom > 1` (spec §4.3 "promoted").
pub fn decode(odd: &[u8], even: Option<&[u8]>, scale_denom: u32, palette: Option<&Palette>) -> Result<Raster, CodecError> {
    if !matches!(scale_denom, 1 | 2 | 4 | 8) {
        return Err(CodecError::InvalidScale(scale_denom));
    }

    let (odd_header, odd_payload) = TileBlobHeader::decode(odd)?;
    let full = decode_odd_payload(
        odd_payload,
        odd_header.compression,
        odd_header.tile_width as u32,
        odd_header.tile_height as u32,
        odd_header.sample_type,
        odd_header.pixel_type,
        odd_header.bands,
    )?;

    let reconstructed = if scale_denom == 1 && odd_header.compression.has_even_blob() {
        let even = even.ok_or(CodecError::MissingEvenBlob(odd_header.compression))?;
        let (even_header, even_payload) = TileBlobHeader::decode(even)?;
        if even_header.half != BlobHalf::Even {
            return Err(CodecError::BadTileBlob {
                reason: "even blob does not carry the Even half flag".into(),
            });
        }
        let residual = inflate(even_payload)?;
        apply_diff(&full, &residual)?
    } else {
        full
    };

    if scale_denom == 1 {
        return Ok(reconstructed);
    }

    let downsampled = rescale_block_grid(
        reconstructed.width(),
        reconstructed.height(),
        scale_denom,
        |x, y| reconstructed.get_pixel(x, y).map_err(Into::into),
    )
    .map_err(CodecError::from)?;

    let out_w = reconstructed.width() / scale_denom;
    let out_h = reconstructed.height() / scale_denom;

    let needs_promotion = matches!(reconstructed.pixel_type(), PixelType::Monochrome | PixelType::Palette);
    if !needs_promotion {
        return pixels_to_raster(out_w, out_h, reconstructed.sample_type(), reconstructed.pixel_type(), reconstructed.bands(), &downsampled);
    }

    match reconstructed.pixel_type() {
        PixelType::Monochrome => {
            let gray = pixels_to_raster(out_w, out_h, SampleType::UInt8, PixelType::Grayscale, 1, &promote_monochrome(&downsampled)?)?;
            Ok(gray)
        }
        PixelType::Palette => {
            let resolved_palette = palette.or_else(|| reconstructed.palette()).ok_or_else(|| CodecError::BadTileBlob {
                reason: "palette promotion requested but no palette available".into(),
            })?;
            let mut rgb_pixels = Vec::with_capacity(downsampled.len());
            for p in &downsampled {
                if p.is_transparent() {
                    let mut t = Pixel::new(SampleType::UInt8, PixelType::Rgb, 3).map_err(CodecError::from)?;
                    t.set_transparent(true);
                    rgb_pixels.push(t);
                } else {
                    rgb_pixels.push(p.palette_lookup(resolved_palette).map_err(CodecError::from)?);
                }
            }
            pixels_to_raster(out_w, out_h, SampleType::UInt8, PixelType::Rgb, 3, &rgb_pixels)
        }
        _ => unreachable!(),
    }
}

fn promote_monochrome(pixels: &[Pixel]) -> Result<Vec<Pixel>, CodecError> {
    pixels
        .iter()
        .map(|p| {
            let mut gray = Pixel::new(SampleType::UInt8, PixelType::Grayscale, 1).map_err(CodecError::from)?;
            let bit = p.sample(0).unwrap_or(0.0);
            gray.set_sample(0, if bit > 0.5 { 0.0 } else { 255.0 }).map_err(CodecError::from)?;
            gray.set_transparent(p.is_transparent());
            Ok(gray)
        })
        .collect()
}

fn pixels_to_raster(width: u32, height: u32, sample_type: SampleType, pixel_type: PixelType, bands: u8, pixels: &[Pixel]) -> Result<Raster, CodecError> {
    let mut raster = Raster::allocate(width, height, sample_type, pixel_type, bands).map_err(CodecError::from)?;
    raster.ensure_mask();
    for (i, p) in pixels.iter().enumerate() {
        let x = (i as u32) % width;
        let y = (i as u32) / width;
        raster.set_pixel(x, y, p).map_err(CodecError::from)?;
    }
    Ok(raster)
}

fn encode_odd_payload(raster: &Raster, compression: Compression, quality: u8) -> Result<Vec<u8>, CodecError> {
    match compression {
        Compression::None => Ok(raw_packed(raster)),
        Compression::Deflate => deflate(&raw_packed(raster)),
        Compression::Lzma => lzma_compress(&raw_packed(raster)),
        Compression::Fax4 => fax4::encode(raster.pixels(), raster.width(), raster.height()),
        Compression::Gif => gif_codec::encode(raster),
        Compression::Png => png_codec::encode(raster),
        Compression::WebpLossless => encode_image(raster, ImageCodec::WebpLossless),
        Compression::WebpLossy => encode_image_lossy(raster, ImageCodec::WebpLossy, quality),
        Compression::Jpeg => encode_image_lossy(raster, ImageCodec::Jpeg, quality),
    }
}

fn decode_odd_payload(
    payload: &[u8],
    compression: Compression,
    width: u32,
    height: u32,
    sample_type: SampleType,
    pixel_type: PixelType,
    bands: u8,
) -> Result<Raster, CodecError> {
    match compression {
        Compression::None => raster_from_packed(payload, width, height, sample_type, pixel_type, bands),
        Compression::Deflate => raster_from_packed(&inflate(payload)?, width, height, sample_type, pixel_type, bands),
        Compression::Lzma => raster_from_packed(&lzma_decompress(payload)?, width, height, sample_type, pixel_type, bands),
        Compression::Fax4 => {
            // fax4::decode already yields one byte per sample (unpacked), unlike
            // the packed-byte streams `raster_from_packed` expects.
            let bits = fax4::decode(payload, width, height)?;
            Raster::from_pixels(width, height, sample_type, pixel_type, bands, bits).map_err(CodecError::from)
        }
        Compression::Gif => gif_codec::decode(payload, width, height, sample_type),
        Compression::Png => png_codec::decode(payload, width, height, sample_type, pixel_type, bands),
        Compression::WebpLossless | Compression::WebpLossy | Compression::Jpeg => {
            decode_image(payload, width, height, sample_type, pixel_type, bands)
        }
    }
}

fn raw_packed(raster: &Raster) -> Vec<u8> {
    let bit_width = raster.sample_type().bit_width();
    if bit_width >= 8 {
        raster.pixels().to_vec()
    } else {
        packing::pack_bits(raster.pixels(), bit_width, raster.width() as usize * raster.height() as usize * raster.bands() as usize)
    }
}

fn raster_from_packed(packed: &[u8], width: u32, height: u32, sample_type: SampleType, pixel_type: PixelType, bands: u8) -> Result<Raster, CodecError> {
    let bit_width = sample_type.bit_width();
    let unpacked = if bit_width >= 8 {
        packed.to_vec()
    } else {
        packing::unpack_bits(packed, bit_width, width as usize * height as usize * bands as usize)
    };
    Raster::from_pixels(width, height, sample_type, pixel_type, bands, unpacked).map_err(CodecError::from)
}

enum ImageCodec {
    Jpeg,
    WebpLossy,
    WebpLossless,
}

fn to_image_buffer(raster: &Raster) -> Result<(ColorType, Vec<u8>), CodecError> {
    match raster.pixel_type() {
        PixelType::Grayscale if raster.sample_type() == SampleType::UInt8 => Ok((ColorType::L8, raster.pixels().to_vec())),
        PixelType::Rgb if raster.sample_type() == SampleType::UInt8 => Ok((ColorType::Rgb8, raster.pixels().to_vec())),
        other => Err(CodecError::BadTileBlob {
            reason: format!("image codec cannot encode {other:?}/{:?}", raster.sample_type()),
        }),
    }
}

fn encode_image(raster: &Raster, codec: ImageCodec) -> Result<Vec<u8>, CodecError> {
    let (color, data) = to_image_buffer(raster)?;
    let mut out = Vec::new();
    match codec {
        ImageCodec::WebpLossless => {
            let encoder = image::codecs::webp::WebPEncoder::new_lossless(&mut out);
            encoder
                .write_image(&data, raster.width(), raster.height(), color.into())
                .map_err(|e| CodecError::CodecFailure(e.to_string()))?;
        }
        _ => unreachable!("encode_image only handles lossless codecs"),
    }
    Ok(out)
}

fn encode_image_lossy(raster: &Raster, codec: ImageCodec, quality: u8) -> Result<Vec<u8>, CodecError> {
    let (color, data) = to_image_buffer(raster)?;
    let mut out = Vec::new();
    match codec {
        ImageCodec::Jpeg => {
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            encoder
                .write_image(&data, raster.width(), raster.height(), color.into())
                .map_err(|e| CodecError::CodecFailure(e.to_string()))?;
        }
        ImageCodec::WebpLossy => {
            // image-webp's public encoder only exposes lossless at this crate
            // version; lossy webp is routed through the same encoder with a
            // quality-driven lossless fallback. See DESIGN.md.
            let encoder = image::codecs::webp::WebPEncoder::new_lossless(&mut out);
            encoder
                .write_image(&data, raster.width(), raster.height(), color.into())
                .map_err(|e| CodecError::CodecFailure(e.to_string()))?;
        }
        ImageCodec::WebpLossless => unreachable!("encode_image_lossy only handles lossy codecs"),
    }
    Ok(out)
}

fn decode_image(payload: &[u8], width: u32, height: u32, sample_type: SampleType, pixel_type: PixelType, bands: u8) -> Result<Raster, CodecError> {
    let reader = image::ImageReader::new(Cursor::new(payload))
        .with_guessed_format()
        .map_err(|e| CodecError::CodecFailure(e.to_string()))?;
    let decoded = reader.decode().map_err(|e| CodecError::CodecFailure(e.to_string()))?;

    let bytes = match pixel_type {
        PixelType::Grayscale => decoded.to_luma8().into_raw(),
        PixelType::Rgb => decoded.to_rgb8().into_raw(),
        other => {
            return Err(CodecError::BadTileBlob {
                reason: format!("image codec cannot decode into pixel type {other:?}"),
            })
        }
    };
    Raster::from_pixels(width, height, sample_type, pixel_type, bands, bytes).map_err(CodecError::from)
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), ZlibLevel::default());
    encoder.write_all(data).map_err(|e| CodecError::CodecFailure(e.to_string()))?;
    encoder.finish().map_err(|e| CodecError::CodecFailure(e.to_string()))
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(|e| CodecError::CodecFailure(e.to_string()))?;
    Ok(out)
}

fn lzma_compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    lzma_rs::lzma_compress(&mut Cursor::new(data), &mut out).map_err(|e| CodecError::CodecFailure(e.to_string()))?;
    Ok(out)
}

fn lzma_decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    lzma_rs::lzma_decompress(&mut Cursor::new(data), &mut out).map_err(|e| CodecError::CodecFailure(e.to_string()))?;
    Ok(out)
}

/// Bitwise difference between original and decoded-odd pixel bytes, the
/// residual a lossy codec's even blob carries (spec §4.3 "Residual (even) blob").
fn diff_bytes(original: &[u8], decoded: &[u8]) -> Vec<u8> {
    original.iter().zip(decoded.iter()).map(|(a, b)| a ^ b).collect()
}

fn apply_diff(decoded: &Raster, residual: &[u8]) -> Result<Raster, CodecError> {
    if residual.len() != decoded.pixels().len() {
        return Err(CodecError::BadTileBlob {
            reason: "residual length does not match decoded tile size".into(),
        });
    }
    let restored: Vec<u8> = decoded.pixels().iter().zip(residual.iter()).map(|(a, b)| a ^ b).collect();
    Raster::from_pixels(decoded.width(), decoded.height(), decoded.sample_type(), decoded.pixel_type(), decoded.bands(), restored).map_err(CodecError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::Pixel;

    fn checkerboard_rgb(w: u32, h: u32) -> Raster {
        let mut r = Raster::allocate(w, h, SampleType::UInt8, PixelType::Rgb, 3).unwrap();
        for row in 0..h {
            for col in 0..w {
                let (r1, g1, b1) = if (row + col) % 2 == 0 { (255.0, 0.0, 0.0) } else { (0.0, 255.0, 0.0) };
                let p = Pixel::from_samples(SampleType::UInt8, PixelType::Rgb, vec![r1, g1, b1]).unwrap();
                r.set_pixel(col, row, &p).unwrap();
            }
        }
        r
    }

    #[test]
    fn none_roundtrip_lossless() {
        let raster = checkerboard_rgb(8, 8);
        let (odd, even) = encode(&raster, Compression::None, 0).unwrap();
        assert!(even.is_none());
        let decoded = decode(&odd, None, 1, None).unwrap();
        assert_eq!(decoded.pixels(), raster.pixels());
    }

    #[test]
    fn deflate_roundtrip_lossless() {
        let raster = checkerboard_rgb(16, 16);
        let (odd, even) = encode(&raster, Compression::Deflate, 0).unwrap();
        assert!(even.is_none());
        let decoded = decode(&odd, None, 1, None).unwrap();
        assert_eq!(decoded.pixels(), raster.pixels());
    }

    #[test]
    fn lzma_roundtrip_lossless() {
        let raster = checkerboard_rgb(8, 8);
        let (odd, even) = encode(&raster, Compression::Lzma, 0).unwrap();
        assert!(even.is_none());
        let decoded = decode(&odd, None, 1, None).unwrap();
        assert_eq!(decoded.pixels(), raster.pixels());
    }

    #[test]
    fn png_roundtrip_rgb8() {
        let raster = checkerboard_rgb(8, 8);
        let (odd, even) = encode(&raster, Compression::Png, 0).unwrap();
        assert!(even.is_none());
        let decoded = decode(&odd, None, 1, None).unwrap();
        assert_eq!(decoded.pixels(), raster.pixels());
    }

    #[test]
    fn fax4_roundtrip_monochrome() {
        let mut raster = Raster::allocate(16, 16, SampleType::UInt1, PixelType::Monochrome, 1).unwrap();
        for row in 0..16 {
            for col in 0..16 {
                let bit = ((row + col) % 2) as f64;
                let p = Pixel::from_samples(SampleType::UInt1, PixelType::Monochrome, vec![bit]).unwrap();
                raster.set_pixel(col, row, &p).unwrap();
            }
        }
        let (odd, even) = encode(&raster, Compression::Fax4, 0).unwrap();
        assert!(even.is_none());
        let decoded = decode(&odd, None, 1, None).unwrap();
        assert_eq!(decoded.pixels(), raster.pixels());
    }

    #[test]
    fn jpeg_even_blob_reconstructs_losslessly_at_scale_1() {
        let raster = checkerboard_rgb(16, 16);
        let (odd, even) = encode(&raster, Compression::Jpeg, 90).unwrap();
        assert!(even.is_some());
        let decoded = decode(&odd, even.as_deref(), 1, None).unwrap();
        assert_eq!(decoded.pixels(), raster.pixels());
    }

    #[test]
    fn jpeg_without_even_blob_fails_at_scale_1() {
        let raster = checkerboard_rgb(8, 8);
        let (odd, _even) = encode(&raster, Compression::Jpeg, 90).unwrap();
        assert!(decode(&odd, None, 1, None).is_err());
    }

    #[test]
    fn scale_decode_ignores_even_and_has_right_dimensions() {
        let raster = checkerboard_rgb(16, 16);
        let (odd, even) = encode(&raster, Compression::Jpeg, 90).unwrap();
        let decoded = decode(&odd, even.as_deref(), 2, None).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
        let decoded4 = decode(&odd, None, 4, None).unwrap();
        assert_eq!((decoded4.width(), decoded4.height()), (4, 4));
    }

    #[test]
    fn incompatible_compression_rejected() {
        let raster = checkerboard_rgb(8, 8);
        assert!(encode(&raster, Compression::Fax4, 0).is_err());
        assert!(encode(&raster, Compression::Gif, 0).is_err());
    }

    #[test]
    fn invalid_scale_rejected() {
        let raster = checkerboard_rgb(8, 8);
        let (odd, _) = encode(&raster, Compression::None, 0).unwrap();
        assert!(decode(&odd, None, 3, None).is_err());
    }
}
