//! Raster data structures and operations

mod build;
mod element;
mod grid;
mod header;
mod position;
mod stats;
mod storage;

pub use build::RasterOptions;
pub use element::{RasterElement, DEFAULT_NODATA};
pub use grid::Raster;
pub use header::{keys, RasterHeader};
pub use position::PositionIndex;
pub use stats::{stat_names, LayerStats};
pub use storage::RasterStorage;
