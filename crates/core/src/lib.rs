//! # gridmask core
//!
//! In-memory model for masked raster (gridded spatial) data.
//!
//! This crate provides:
//! - `Raster<T, M>`: generic raster grid with valid-cell compaction
//! - `RasterHeader`: named geometry metadata and coordinate transforms
//! - `PositionIndex`: the valid-cell (row, col) addressing scheme
//! - Masking against another raster's valid-cell set
//! - Lazy per-layer statistics (mean, min, max, std, range, valid count)
//! - I/O adapters for ESRI ASCII grids, GeoTIFF, and pluggable stores
//!
//! A raster holds its cells in one of two forms, chosen at construction:
//! a compact array of only the valid cells addressed through a position
//! index, or the full rectangular grid. Callers address cells by valid
//! index, by (row, col), or by real-world coordinate regardless of form.

pub mod error;
pub mod io;
pub(crate) mod maybe_rayon;
pub mod raster;

pub use error::{Error, Result};
pub use raster::{
    LayerStats, PositionIndex, Raster, RasterElement, RasterHeader, RasterOptions, RasterStorage,
    DEFAULT_NODATA,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::io::{RasterStore, RawRaster};
    pub use crate::raster::{
        keys, stat_names, LayerStats, PositionIndex, Raster, RasterElement, RasterHeader,
        RasterOptions, RasterStorage, DEFAULT_NODATA,
    };
}
