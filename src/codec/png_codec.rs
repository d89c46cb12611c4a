//! PNG payload encode/decode using the `png` crate directly, so sub-8-bit
//! depths and indexed colour round-trip exactly (spec §4.3 PNG row).

use png::{BitDepth, ColorType};

use crate::error::CodecError;
use crate::pixel::{Palette, PixelType, SampleType};
use crate::raster::Raster;

fn bit_depth_for(sample_type: SampleType) -> BitDepth {
    match sample_type {
        SampleType::UInt1 => BitDepth::One,
        SampleType::UInt2 => BitDepth::Two,
        SampleType::UInt4 => BitDepth::Four,
        SampleType::UInt8 => BitDepth::Eight,
        SampleType::UInt16 => BitDepth::Sixteen,
        _ => BitDepth::Eight,
    }
}

pub fn encode(raster: &Raster) -> Result<Vec<u8>, CodecError> {
    let color_type = match raster.pixel_type() {
        PixelType::Monochrome | PixelType::Palette => ColorType::Indexed,
        PixelType::Grayscale => ColorType::Grayscale,
        PixelType::Rgb => ColorType::Rgb,
        other => {
            return Err(CodecError::BadTileBlob {
                reason: format!("png codec cannot encode pixel type {other:?}"),
            })
        }
    };

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, raster.width(), raster.height());
        encoder.set_color(color_type);
        encoder.set_depth(bit_depth_for(raster.sample_type()));

        if color_type == ColorType::Indexed {
            let palette = raster.palette();
            let rgb_bytes: Vec<u8> = match palette {
                Some(p) => p.entries().iter().flat_map(|e| [e.r, e.g, e.b]).collect(),
                None => {
                    // Monochrome without an explicit palette: synthesize black/white.
                    vec![255, 255, 255, 0, 0, 0]
                }
            };
            encoder.set_palette(rgb_bytes);
        }

        let mut writer = encoder
            .write_header()
            .map_err(|e| CodecError::CodecFailure(e.to_string()))?;
        let packed = pack_for_png(raster);
        writer
            .write_image_data(&packed)
            .map_err(|e| CodecError::CodecFailure(e.to_string()))?;
    }
    Ok(out)
}

fn pack_for_png(raster: &Raster) -> Vec<u8> {
    let bit_width = raster.sample_type().bit_width();
    if bit_width >= 8 {
        return raster.pixels().to_vec();
    }
    super::packing::pack_bits(raster.pixels(), bit_width, raster.width() as usize * raster.height() as usize)
}

pub fn decode(payload: &[u8], width: u32, height: u32, sample_type: SampleType, pixel_type: PixelType, bands: u8) -> Result<Raster, CodecError> {
    let decoder = png::Decoder::new(payload);
    let mut reader = decoder.read_info().map_err(|e| CodecError::CodecFailure(e.to_string()))?;
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).map_err(|e| CodecError::CodecFailure(e.to_string()))?;
    let data = &buf[..info.buffer_size()];

    let bit_width = sample_type.bit_width();
    let unpacked = if bit_width < 8 {
        super::packing::unpack_bits(data, bit_width, width as usize * height as usize * bands as usize)
    } else {
        data.to_vec()
    };

    let mut raster = Raster::from_pixels(width, height, sample_type, pixel_type, bands, unpacked)
        .map_err(|e| CodecError::BadTileBlob { reason: e.to_string() })?;

    if pixel_type == PixelType::Palette {
        if let Some(palette_chunk) = reader.info().palette.as_ref() {
            let entries: Vec<crate::pixel::RgbEntry> = palette_chunk
                .chunks_exact(3)
                .map(|c| crate::pixel::RgbEntry::new(c[0], c[1], c[2]))
                .collect();
            let max_entries = 1usize << bit_width;
            if let Ok(palette) = Palette::new(entries, max_entries) {
                let _ = raster.set_palette(palette);
            }
        }
    }
    Ok(raster)
}
