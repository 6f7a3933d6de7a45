//! Raster header: named geometry metadata and coordinate transforms

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Canonical header key names, matching the common ASCII-grid vocabulary.
pub mod keys {
    pub const NODATA_VALUE: &str = "NODATA_VALUE";
    pub const XLLCENTER: &str = "XLLCENTER";
    pub const YLLCENTER: &str = "YLLCENTER";
    pub const NROWS: &str = "NROWS";
    pub const NCOLS: &str = "NCOLS";
    pub const CELLSIZE: &str = "CELLSIZE";
    pub const LAYERS: &str = "LAYERS";
    pub const CELLSNUM: &str = "CELLSNUM";
    pub const SRS: &str = "SRS";
}

/// Geometry metadata for one raster.
///
/// `xll`/`yll` are the coordinates of the CENTER of the lower-left cell.
/// Row 0 is the northernmost row; y increases upward. Counts are stored as
/// native integers but remain addressable by the double-valued key API for
/// header interchange with I/O adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterHeader {
    /// No-data sentinel
    pub nodata: f64,
    /// X coordinate of the lower-left cell center
    pub xll: f64,
    /// Y coordinate of the lower-left cell center
    pub yll: f64,
    /// Number of rows
    pub rows: usize,
    /// Number of columns
    pub cols: usize,
    /// Cell size (square cells)
    pub cell_size: f64,
    /// Number of layers
    pub layers: usize,
    /// Number of stored cells (valid-cell count under compaction,
    /// rows * cols otherwise)
    pub cells: usize,
}

impl RasterHeader {
    /// Create a single-layer header; `cells` starts at `rows * cols`.
    pub fn new(rows: usize, cols: usize, xll: f64, yll: f64, cell_size: f64, nodata: f64) -> Self {
        Self {
            nodata,
            xll,
            yll,
            rows,
            cols,
            cell_size,
            layers: 1,
            cells: rows * cols,
        }
    }

    /// Look up a header value by canonical key (case-insensitive).
    pub fn get(&self, key: &str) -> Result<f64> {
        match key.to_ascii_uppercase().as_str() {
            keys::NODATA_VALUE => Ok(self.nodata),
            keys::XLLCENTER => Ok(self.xll),
            keys::YLLCENTER => Ok(self.yll),
            keys::NROWS => Ok(self.rows as f64),
            keys::NCOLS => Ok(self.cols as f64),
            keys::CELLSIZE => Ok(self.cell_size),
            keys::LAYERS => Ok(self.layers as f64),
            keys::CELLSNUM => Ok(self.cells as f64),
            _ => Err(Error::InvalidKey(key.to_string())),
        }
    }

    /// Set a header value by canonical key (case-insensitive).
    ///
    /// Counts are truncated to integers; negative counts are rejected.
    pub fn set(&mut self, key: &str, value: f64) -> Result<()> {
        let as_count = |v: f64| -> Result<usize> {
            if v < 0.0 {
                return Err(Error::OutOfRange {
                    what: "header count",
                    value: 0,
                    limit: 0,
                });
            }
            Ok(v as usize)
        };
        match key.to_ascii_uppercase().as_str() {
            keys::NODATA_VALUE => self.nodata = value,
            keys::XLLCENTER => self.xll = value,
            keys::YLLCENTER => self.yll = value,
            keys::NROWS => self.rows = as_count(value)?,
            keys::NCOLS => self.cols = as_count(value)?,
            keys::CELLSIZE => self.cell_size = value,
            keys::LAYERS => self.layers = as_count(value)?,
            keys::CELLSNUM => self.cells = as_count(value)?,
            _ => return Err(Error::InvalidKey(key.to_string())),
        }
        Ok(())
    }

    /// Total cell count of the full extent
    pub fn extent_cells(&self) -> usize {
        self.rows * self.cols
    }

    /// Whether (row, col) lies inside the extent
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }

    // Coordinate conversion

    /// Coordinates of the cell center at (row, col).
    ///
    /// `x = xll + col * cell_size`, `y = yll + (rows - 1 - row) * cell_size`.
    pub fn coordinate_of(&self, row: usize, col: usize) -> (f64, f64) {
        let x = self.xll + col as f64 * self.cell_size;
        let y = self.yll + (self.rows - 1 - row) as f64 * self.cell_size;
        (x, y)
    }

    /// (row, col) of the cell whose center is nearest to (x, y).
    ///
    /// Center-aligned: a coordinate belongs to the cell whose center is
    /// within half a cell size. Out-of-grid coordinates yield `None`.
    pub fn position_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let cs = self.cell_size;
        let col = ((x - self.xll) / cs + 0.5).floor();
        let from_bottom = ((y - self.yll) / cs + 0.5).floor();
        if col < 0.0 || col >= self.cols as f64 {
            return None;
        }
        if from_bottom < 0.0 || from_bottom >= self.rows as f64 {
            return None;
        }
        let row = self.rows - 1 - from_bottom as usize;
        Some((row, col as usize))
    }

    /// Check another header describes the same grid geometry.
    pub fn same_extent(&self, other: &RasterHeader) -> Result<()> {
        if !cell_size_eq(self.cell_size, other.cell_size) {
            return Err(Error::IncompatibleGeometry {
                expected: self.cell_size,
                actual: other.cell_size,
            });
        }
        if self.rows != other.rows || self.cols != other.cols {
            return Err(Error::DimensionMismatch {
                er: self.rows,
                ec: self.cols,
                ar: other.rows,
                ac: other.cols,
            });
        }
        Ok(())
    }
}

impl Default for RasterHeader {
    fn default() -> Self {
        Self::new(0, 0, 0.0, 0.0, 1.0, crate::raster::DEFAULT_NODATA)
    }
}

/// Cell sizes read from files carry float noise; compare with a relative
/// tolerance instead of bitwise equality.
pub(crate) fn cell_size_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn header() -> RasterHeader {
        RasterHeader::new(4, 5, 100.0, 200.0, 10.0, -9999.0)
    }

    #[test]
    fn test_key_access() {
        let h = header();
        assert_eq!(h.get("NROWS").unwrap(), 4.0);
        assert_eq!(h.get("ncols").unwrap(), 5.0);
        assert_eq!(h.get("CELLSIZE").unwrap(), 10.0);
        assert!(matches!(h.get("BOGUS"), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_key_set() {
        let mut h = header();
        h.set("cellsnum", 12.0).unwrap();
        assert_eq!(h.cells, 12);
        assert!(h.set("WHAT", 0.0).is_err());
    }

    #[test]
    fn test_coordinate_of_top_row() {
        let h = header();
        // Row 0 is the top row: y = yll + (rows - 1) * cs
        let (x, y) = h.coordinate_of(0, 0);
        assert_relative_eq!(x, 100.0);
        assert_relative_eq!(y, 230.0);
        let (x, y) = h.coordinate_of(3, 4);
        assert_relative_eq!(x, 140.0);
        assert_relative_eq!(y, 200.0);
    }

    #[test]
    fn test_position_of_roundtrip() {
        let h = header();
        for row in 0..h.rows {
            for col in 0..h.cols {
                let (x, y) = h.coordinate_of(row, col);
                assert_eq!(h.position_of(x, y), Some((row, col)));
            }
        }
    }

    #[test]
    fn test_position_of_off_center() {
        let h = header();
        // Anywhere within half a cell of the center maps to the same cell
        let (x, y) = h.coordinate_of(2, 3);
        assert_eq!(h.position_of(x + 4.9, y - 4.9), Some((2, 3)));
    }

    #[test]
    fn test_position_of_outside() {
        let h = header();
        assert_eq!(h.position_of(0.0, 0.0), None);
        assert_eq!(h.position_of(100.0, 236.0), None);
        assert_eq!(h.position_of(146.0, 200.0), None);
    }

    #[test]
    fn test_same_extent() {
        let h = header();
        let mut other = header();
        assert!(h.same_extent(&other).is_ok());
        other.cell_size = 30.0;
        assert!(matches!(
            h.same_extent(&other),
            Err(Error::IncompatibleGeometry { .. })
        ));
        other.cell_size = 10.0;
        other.rows = 7;
        assert!(matches!(
            h.same_extent(&other),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
