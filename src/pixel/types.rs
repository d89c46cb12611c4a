//! Sample and pixel type tags (spec §3 "Pixel").
//!
//! [`SampleType`] spans sub-byte through double precision; [`PixelType`]
//! spans the six pixel semantics the rest of the engine switches on.

use serde::{Deserialize, Serialize};

/// The eleven sample storage types a pixel's bands may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleType {
    /// 1-bit unsigned (monochrome, 2-colour palette, 1-bit grayscale)
    UInt1,
    /// 2-bit unsigned (small palette)
    UInt2,
    /// 4-bit unsigned (small palette)
    UInt4,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl SampleType {
    /// Width in bits of one sample of this type on disk.
    pub const fn bit_width(self) -> u32 {
        match self {
            SampleType::UInt1 => 1,
            SampleType::UInt2 => 2,
            SampleType::UInt4 => 4,
            SampleType::Int8 | SampleType::UInt8 => 8,
            SampleType::Int16 | SampleType::UInt16 => 16,
            SampleType::Int32 | SampleType::UInt32 => 32,
            SampleType::Float32 => 32,
            SampleType::Float64 => 64,
        }
    }

    /// Whether this sample type packs multiple samples per byte on disk.
    pub const fn is_sub_byte(self) -> bool {
        matches!(self, SampleType::UInt1 | SampleType::UInt2 | SampleType::UInt4)
    }

    /// Number of whole bytes one in-memory (expanded, one-sample-per-byte-or-wider)
    /// sample occupies. Sub-byte types are stored one-per-byte in memory (spec §9
    /// "Sub-byte packing": expansion to one byte per sample is acceptable in memory).
    pub const fn in_memory_bytes(self) -> usize {
        match self {
            SampleType::UInt1 | SampleType::UInt2 | SampleType::UInt4 | SampleType::Int8 | SampleType::UInt8 => 1,
            SampleType::Int16 | SampleType::UInt16 => 2,
            SampleType::Int32 | SampleType::UInt32 | SampleType::Float32 => 4,
            SampleType::Float64 => 8,
        }
    }

    /// The maximum representable value for unsigned / the declared width for signed types.
    pub const fn max_value(self) -> i64 {
        match self {
            SampleType::UInt1 => 1,
            SampleType::UInt2 => 3,
            SampleType::UInt4 => 15,
            SampleType::Int8 => i8::MAX as i64,
            SampleType::UInt8 => u8::MAX as i64,
            SampleType::Int16 => i16::MAX as i64,
            SampleType::UInt16 => u16::MAX as i64,
            SampleType::Int32 => i32::MAX as i64,
            SampleType::UInt32 => u32::MAX as i64,
            SampleType::Float32 | SampleType::Float64 => i64::MAX,
        }
    }

    pub const fn min_value(self) -> i64 {
        match self {
            SampleType::Int8 => i8::MIN as i64,
            SampleType::Int16 => i16::MIN as i64,
            SampleType::Int32 => i32::MIN as i64,
            SampleType::Float32 | SampleType::Float64 => i64::MIN,
            _ => 0,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, SampleType::Float32 | SampleType::Float64)
    }

    /// Stable numeric tag used in the blob header / catalog (spec §6 "Tile blob binary format").
    pub const fn code(self) -> u8 {
        match self {
            SampleType::UInt1 => 0,
            SampleType::UInt2 => 1,
            SampleType::UInt4 => 2,
            SampleType::Int8 => 3,
            SampleType::UInt8 => 4,
            SampleType::Int16 => 5,
            SampleType::UInt16 => 6,
            SampleType::Int32 => 7,
            SampleType::UInt32 => 8,
            SampleType::Float32 => 9,
            SampleType::Float64 => 10,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => SampleType::UInt1,
            1 => SampleType::UInt2,
            2 => SampleType::UInt4,
            3 => SampleType::Int8,
            4 => SampleType::UInt8,
            5 => SampleType::Int16,
            6 => SampleType::UInt16,
            7 => SampleType::Int32,
            8 => SampleType::UInt32,
            9 => SampleType::Float32,
            10 => SampleType::Float64,
            _ => return None,
        })
    }
}

/// The six pixel semantics a coverage or tile may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelType {
    Monochrome,
    Palette,
    Grayscale,
    Rgb,
    Multiband,
    DataGrid,
}

impl PixelType {
    /// Required band count, if the pixel type pins it exactly (spec §3).
    pub const fn fixed_bands(self) -> Option<u8> {
        match self {
            PixelType::Monochrome | PixelType::Palette | PixelType::Grayscale | PixelType::DataGrid => Some(1),
            PixelType::Rgb => Some(3),
            PixelType::Multiband => None,
        }
    }

    pub const fn code(self) -> u8 {
        match self {
            PixelType::Monochrome => 0,
            PixelType::Palette => 1,
            PixelType::Grayscale => 2,
            PixelType::Rgb => 3,
            PixelType::Multiband => 4,
            PixelType::DataGrid => 5,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => PixelType::Monochrome,
            1 => PixelType::Palette,
            2 => PixelType::Grayscale,
            3 => PixelType::Rgb,
            4 => PixelType::Multiband,
            5 => PixelType::DataGrid,
            _ => return None,
        })
    }
}

/// Validate `(sample, pixel, bands)` against the shape rules of spec §3.
///
/// Sub-byte sample types are only valid with monochrome, palette, or
/// (1-bit only) grayscale pixel types.
pub fn validate_shape(sample: SampleType, pixel: PixelType, bands: u8) -> Result<(), crate::error::PixelError> {
    let err = || crate::error::PixelError::InvalidShape { sample, pixel, bands };

    if let Some(required) = pixel.fixed_bands() {
        if bands != required {
            return Err(err());
        }
    } else if bands < 2 {
        return Err(err());
    }

    if sample.is_sub_byte() {
        let ok = match pixel {
            PixelType::Monochrome | PixelType::Palette => true,
            PixelType::Grayscale => sample == SampleType::UInt1,
            _ => false,
        };
        if !ok {
            return Err(err());
        }
    }

    Ok(())
}
