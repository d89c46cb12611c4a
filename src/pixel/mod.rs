//! Pixel & palette model (spec C1).
//!
//! In-memory pixel values, palette tables, comparison, and default no-data
//! synthesis. This is the leaf module every other layer builds on: [`raster`](crate::raster)
//! buffers are packed arrays of [`Pixel`] samples, [`codec`](crate::codec) encodes/decodes
//! them, and [`stats`](crate::stats) scans them.

mod palette;
mod types;
mod value;

pub use palette::{Palette, PaletteKind, RgbEntry};
pub use types::{validate_shape, PixelType, SampleType};
pub use value::Pixel;
