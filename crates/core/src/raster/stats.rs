//! Per-layer statistics engine
//!
//! Aggregates are computed over valid cells only and cached on the raster.
//! The cache is never invalidated implicitly: after mutating cell values,
//! call [`Raster::update_statistics`] to refresh it.

use crate::error::{Error, Result};
use crate::maybe_rayon::*;
use crate::raster::{Raster, RasterElement, RasterStorage};

/// Statistic name constants (case-insensitive in lookups).
pub mod stat_names {
    pub const VALID_CELLNUMBER: &str = "VALID_CELLNUMBER";
    pub const MEAN: &str = "MEAN";
    pub const MIN: &str = "MIN";
    pub const MAX: &str = "MAX";
    pub const STD: &str = "STD";
    pub const RANGE: &str = "RANGE";
}

/// Aggregates for one layer, over valid cells only.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerStats {
    /// Count of cells whose value differs from the sentinel
    pub valid_count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation (divide by N)
    pub std: f64,
    /// max - min
    pub range: f64,
}

/// Single-pass accumulation over one layer. Cells equal to the sentinel are
/// skipped, not treated as zero. An empty layer reports the sentinel for
/// min/max and zero elsewhere.
fn compute_layer<T: RasterElement>(
    storage: &RasterStorage<T>,
    nodata: T,
    layer0: usize,
) -> LayerStats {
    let mut count = 0usize;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    let mut accumulate = |v: T| {
        if v.is_nodata(nodata) {
            return;
        }
        let x = v.to_f64();
        count += 1;
        sum += x;
        sum_sq += x * x;
        min = min.min(x);
        max = max.max(x);
    };

    match storage {
        RasterStorage::Compact(block) => {
            for &v in block.column(layer0) {
                accumulate(v);
            }
        }
        RasterStorage::Grid(grids) => {
            for &v in grids[layer0].iter() {
                accumulate(v);
            }
        }
    }

    if count == 0 {
        return LayerStats {
            valid_count: 0,
            mean: 0.0,
            min: nodata.to_f64(),
            max: nodata.to_f64(),
            std: 0.0,
            range: 0.0,
        };
    }

    let n = count as f64;
    let mean = sum / n;
    // Population variance as mean(x^2) - mean(x)^2; clamped against
    // negative rounding residue before the square root.
    let variance = (sum_sq / n - mean * mean).max(0.0);
    LayerStats {
        valid_count: count,
        mean,
        min,
        max,
        std: variance.sqrt(),
        range: max - min,
    }
}

impl LayerStats {
    fn get(&self, name: &str) -> Result<f64> {
        match name.to_ascii_uppercase().as_str() {
            stat_names::VALID_CELLNUMBER => Ok(self.valid_count as f64),
            stat_names::MEAN => Ok(self.mean),
            stat_names::MIN => Ok(self.min),
            stat_names::MAX => Ok(self.max),
            stat_names::STD => Ok(self.std),
            stat_names::RANGE => Ok(self.range),
            _ => Err(Error::InvalidKey(name.to_string())),
        }
    }
}

impl<T: RasterElement, M: RasterElement> Raster<T, M> {
    /// Compute the per-layer statistics unless already cached.
    pub fn calculate_statistics(&mut self) {
        if self.stats.is_none() {
            self.update_statistics();
        }
    }

    /// Force recomputation, replacing any cached values. Read-only over the
    /// stored data; layers are processed independently (in parallel when the
    /// `parallel` feature is enabled, with identical results).
    pub fn update_statistics(&mut self) {
        let storage = &self.storage;
        let nodata = self.nodata_value();
        let stats: Vec<LayerStats> = (0..self.header.layers)
            .into_par_iter()
            .map(|l| compute_layer(storage, nodata, l))
            .collect();
        self.stats = Some(stats);
    }

    /// Whether the statistics cache is populated
    pub fn statistics_calculated(&self) -> bool {
        self.stats.is_some()
    }

    fn cached_stats(&mut self) -> &[LayerStats] {
        if self.stats.is_none() {
            self.update_statistics();
        }
        // update_statistics always fills the cache
        self.stats.get_or_insert_with(Vec::new)
    }

    /// Named statistic for a 1-indexed layer, computing lazily on first use.
    ///
    /// Names are case-insensitive over `VALID_CELLNUMBER, MEAN, MIN, MAX,
    /// STD, RANGE`.
    pub fn statistics(&mut self, name: &str, lyr: usize) -> Result<f64> {
        if lyr < 1 || lyr > self.header.layers {
            return Err(Error::OutOfRange {
                what: "layer",
                value: lyr,
                limit: self.header.layers,
            });
        }
        self.cached_stats()[lyr - 1].get(name)
    }

    /// Named statistic for every layer, one value per layer.
    pub fn statistics_all(&mut self, name: &str) -> Result<Vec<f64>> {
        self.cached_stats().iter().map(|s| s.get(name)).collect()
    }

    /// Cached statistics of a 1-indexed layer, if computed
    pub fn layer_statistics(&self, lyr: usize) -> Option<&LayerStats> {
        self.stats.as_ref().and_then(|s| s.get(lyr.checked_sub(1)?))
    }

    // Convenience getters over the named query

    /// Mean of the given layer
    pub fn average(&mut self, lyr: usize) -> Result<f64> {
        self.statistics(stat_names::MEAN, lyr)
    }

    /// Minimum of the given layer
    pub fn minimum(&mut self, lyr: usize) -> Result<f64> {
        self.statistics(stat_names::MIN, lyr)
    }

    /// Maximum of the given layer
    pub fn maximum(&mut self, lyr: usize) -> Result<f64> {
        self.statistics(stat_names::MAX, lyr)
    }

    /// Population standard deviation of the given layer
    pub fn std(&mut self, lyr: usize) -> Result<f64> {
        self.statistics(stat_names::STD, lyr)
    }

    /// Value range (max - min) of the given layer
    pub fn range(&mut self, lyr: usize) -> Result<f64> {
        self.statistics(stat_names::RANGE, lyr)
    }

    /// Count of valid cells in the given layer
    pub fn valid_number(&mut self, lyr: usize) -> Result<usize> {
        Ok(self.statistics(stat_names::VALID_CELLNUMBER, lyr)? as usize)
    }

    /// Drop the statistics cache.
    pub fn release_statistics(&mut self) {
        self.stats = None;
    }
}
