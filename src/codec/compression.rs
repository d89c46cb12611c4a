//! Compression families and their pixel-shape compatibility (spec §4.3 table).

use crate::pixel::{PixelType, SampleType};
use serde::{Deserialize, Serialize};

/// The closed set of tile compression schemes (spec §9 "closed sum over enumerated
/// compression kinds — avoid a plug-in registry").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compression {
    None,
    Deflate,
    Lzma,
    Fax4,
    Gif,
    Png,
    WebpLossless,
    WebpLossy,
    Jpeg,
}

impl Compression {
    /// Whether this codec is natively lossy and therefore carries a residual
    /// even blob for lossless scale-1 reconstruction (spec §3 "Tile blob pair").
    pub const fn has_even_blob(self) -> bool {
        matches!(self, Compression::Jpeg | Compression::WebpLossy)
    }

    pub const fn code(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Deflate => 1,
            Compression::Lzma => 2,
            Compression::Fax4 => 3,
            Compression::Gif => 4,
            Compression::Png => 5,
            Compression::WebpLossless => 6,
            Compression::WebpLossy => 7,
            Compression::Jpeg => 8,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Compression::None,
            1 => Compression::Deflate,
            2 => Compression::Lzma,
            3 => Compression::Fax4,
            4 => Compression::Gif,
            5 => Compression::Png,
            6 => Compression::WebpLossless,
            7 => Compression::WebpLossy,
            8 => Compression::Jpeg,
            _ => return None,
        })
    }

    /// Is `(pixel, bands, sample)` permitted for this compression family
    /// (spec §4.3 table)?
    pub fn is_compatible(self, pixel: PixelType, bands: u8, sample: SampleType) -> bool {
        match self {
            Compression::None | Compression::Deflate | Compression::Lzma => true,
            Compression::Fax4 => pixel == PixelType::Monochrome && sample == SampleType::UInt1,
            Compression::Gif => {
                pixel == PixelType::Palette
                    && bands == 1
                    && matches!(sample, SampleType::UInt1 | SampleType::UInt2 | SampleType::UInt4 | SampleType::UInt8)
            }
            Compression::Png => match pixel {
                PixelType::Monochrome => sample == SampleType::UInt1,
                PixelType::Palette => {
                    matches!(sample, SampleType::UInt1 | SampleType::UInt2 | SampleType::UInt4 | SampleType::UInt8)
                }
                PixelType::Grayscale => matches!(sample, SampleType::UInt8 | SampleType::UInt16),
                PixelType::Rgb => sample == SampleType::UInt8,
                _ => false,
            },
            Compression::WebpLossless => {
                (pixel == PixelType::Grayscale || pixel == PixelType::Rgb) && sample == SampleType::UInt8
            }
            Compression::Jpeg | Compression::WebpLossy => {
                (pixel == PixelType::Grayscale || pixel == PixelType::Rgb) && sample == SampleType::UInt8
            }
        }
    }
}
