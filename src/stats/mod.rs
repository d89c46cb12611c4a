//! Raster statistics: per-tile compute, section-level aggregation, and the
//! persisted tagged blob (spec §4.4, C4).

use crate::error::StatsError;
use crate::pixel::{PixelType, SampleType};
use crate::raster::Raster;

const HIST_BINS: usize = 256;

/// Per-band min/max/sum/sum-of-squares and a 256-bucket histogram.
///
/// `sum` and `sum_sq` are the raw (uncentred) accumulators; `sum_sq_diff` is
/// derived from them on demand so that merging two bands' statistics is a
/// plain elementwise add (spec §4.4 "Aggregate" — pooled sum-of-squared-deviations).
#[derive(Debug, Clone, PartialEq)]
pub struct BandStats {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub sum_sq: f64,
    pub histogram: [u32; HIST_BINS],
}

impl BandStats {
    fn empty() -> Self {
        Self {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            sum_sq: 0.0,
            histogram: [0u32; HIST_BINS],
        }
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// `Σ(nᵢ−1)·σ²ᵢ` pooled form, derived from the additive raw accumulators
    /// (spec §4.4, §8 invariant 5).
    pub fn sum_sq_diff(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum_sq - self.sum * self.sum / self.count as f64).max(0.0)
        }
    }

    fn merge(&mut self, other: &BandStats) {
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        for i in 0..HIST_BINS {
            self.histogram[i] += other.histogram[i];
        }
    }
}

/// `(valid_pixel_count, no_data_count, per_band[])` (spec §3 "Raster statistics").
#[derive(Debug, Clone, PartialEq)]
pub struct RasterStatistics {
    pub valid_pixel_count: u64,
    pub no_data_count: u64,
    pub bands: Vec<BandStats>,
}

/// Scan a decoded tile and produce its statistics, spec §4.4 "Compute".
///
/// Continuous sample types use a two-pass `floor(256·(v−min)/(max−min))`
/// histogram; palette and monochrome tiles index the histogram by code.
pub fn compute_tile_stats(raster: &Raster) -> Result<RasterStatistics, StatsError> {
    let bands = raster.bands() as usize;
    let discrete = matches!(raster.pixel_type(), PixelType::Palette | PixelType::Monochrome);

    let mut valid_pixel_count = 0u64;
    let mut no_data_count = 0u64;
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); bands];
    let mut band_stats: Vec<BandStats> = (0..bands).map(|_| BandStats::empty()).collect();

    for row in 0..raster.height() {
        for col in 0..raster.width() {
            let pixel = raster.get_pixel(col, row)?;
            if pixel.is_transparent() {
                no_data_count += 1;
                continue;
            }
            valid_pixel_count += 1;
            for band in 0..bands {
                let v = pixel.sample(band).unwrap_or(0.0);
                let stats = &mut band_stats[band];
                stats.count += 1;
                stats.min = stats.min.min(v);
                stats.max = stats.max.max(v);
                stats.sum += v;
                stats.sum_sq += v * v;
                values[band].push(v);
            }
        }
    }

    for band in 0..bands {
        let stats = &mut band_stats[band];
        if stats.count == 0 {
            stats.min = 0.0;
            stats.max = 0.0;
            continue;
        }
        let span = stats.max - stats.min;
        for &v in &values[band] {
            let bin = if discrete {
                (v.round() as i64).clamp(0, HIST_BINS as i64 - 1) as usize
            } else if span <= 0.0 {
                0
            } else {
                (((v - stats.min) / span) * HIST_BINS as f64).floor().clamp(0.0, HIST_BINS as f64 - 1.0) as usize
            };
            stats.histogram[bin] += 1;
        }
    }

    Ok(RasterStatistics {
        valid_pixel_count,
        no_data_count,
        bands: band_stats,
    })
}

/// Aggregate per-tile statistics into one section-level result (spec §4.4
/// "Aggregate", §8 invariant 5: order-independent given the pooled formula).
pub fn aggregate(tiles: &[RasterStatistics]) -> Result<RasterStatistics, StatsError> {
    let first = tiles.first().ok_or(StatsError::EmptySet)?;
    let band_count = first.bands.len();

    let mut valid_pixel_count = 0u64;
    let mut no_data_count = 0u64;
    let mut bands: Vec<BandStats> = (0..band_count).map(|_| BandStats::empty()).collect();

    for tile in tiles {
        if tile.bands.len() != band_count {
            return Err(StatsError::BandMismatch {
                expected: band_count,
                actual: tile.bands.len(),
            });
        }
        valid_pixel_count += tile.valid_pixel_count;
        no_data_count += tile.no_data_count;
        for (acc, b) in bands.iter_mut().zip(&tile.bands) {
            acc.merge(b);
        }
    }

    Ok(RasterStatistics {
        valid_pixel_count,
        no_data_count,
        bands,
    })
}

const MAGIC: u8 = 0x53;
const VERSION: u8 = 1;

impl RasterStatistics {
    /// Serialize as a tagged blob: magic/version/sample/bands, global counts,
    /// then per-band `(min, max, sum, sum_sq, count, histogram[256])` (spec §4.4
    /// "Persistence").
    pub fn to_blob(&self, sample_type: SampleType) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + self.bands.len() * (4 * 8 + 8 + HIST_BINS * 4));
        buf.push(MAGIC);
        buf.push(VERSION);
        buf.push(sample_type.code());
        buf.push(self.bands.len() as u8);
        buf.extend_from_slice(&self.valid_pixel_count.to_le_bytes());
        buf.extend_from_slice(&self.no_data_count.to_le_bytes());
        for b in &self.bands {
            buf.extend_from_slice(&b.min.to_le_bytes());
            buf.extend_from_slice(&b.max.to_le_bytes());
            buf.extend_from_slice(&b.sum.to_le_bytes());
            buf.extend_from_slice(&b.sum_sq.to_le_bytes());
            buf.extend_from_slice(&b.count.to_le_bytes());
            for h in &b.histogram {
                buf.extend_from_slice(&h.to_le_bytes());
            }
        }
        buf
    }

    /// Deserialize, failing if the blob's `(sample_type, bands)` doesn't match
    /// what's expected (spec §4.4 "validated on load").
    pub fn from_blob(blob: &[u8], expected_sample: SampleType, expected_bands: usize) -> Result<Self, StatsError> {
        let bad = |reason: &str| StatsError::BadStatsBlob { reason: reason.into() };
        if blob.len() < 20 {
            return Err(bad("statistics blob too short"));
        }
        if blob[0] != MAGIC || blob[1] != VERSION {
            return Err(bad("bad statistics blob magic/version"));
        }
        let sample_type = SampleType::from_code(blob[2]).ok_or_else(|| bad("unknown sample type code"))?;
        if sample_type != expected_sample {
            return Err(bad("statistics blob sample type mismatch"));
        }
        let bands = blob[3] as usize;
        if bands != expected_bands {
            return Err(bad("statistics blob band count mismatch"));
        }
        let mut off = 4;
        let read_u64 = |bytes: &[u8], off: usize| -> u64 {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[off..off + 8]);
            u64::from_le_bytes(b)
        };
        let read_f64 = |bytes: &[u8], off: usize| -> f64 {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[off..off + 8]);
            f64::from_le_bytes(b)
        };
        let valid_pixel_count = read_u64(blob, off);
        off += 8;
        let no_data_count = read_u64(blob, off);
        off += 8;

        let per_band_len = 4 * 8 + 8 + HIST_BINS * 4;
        if blob.len() != off + bands * per_band_len {
            return Err(bad("statistics blob length does not match band count"));
        }

        let mut out_bands = Vec::with_capacity(bands);
        for _ in 0..bands {
            let min = read_f64(blob, off);
            off += 8;
            let max = read_f64(blob, off);
            off += 8;
            let sum = read_f64(blob, off);
            off += 8;
            let sum_sq = read_f64(blob, off);
            off += 8;
            let count = read_u64(blob, off);
            off += 8;
            let mut histogram = [0u32; HIST_BINS];
            for h in histogram.iter_mut() {
                let mut b = [0u8; 4];
                b.copy_from_slice(&blob[off..off + 4]);
                *h = u32::from_le_bytes(b);
                off += 4;
            }
            out_bands.push(BandStats {
                count,
                min,
                max,
                sum,
                sum_sq,
                histogram,
            });
        }

        Ok(RasterStatistics {
            valid_pixel_count,
            no_data_count,
            bands: out_bands,
        })
    }
}
