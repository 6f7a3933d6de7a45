//! Main Raster type

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use ndarray::Array2;

use crate::error::{Error, Result};
use crate::raster::stats::LayerStats;
use crate::raster::{PositionIndex, RasterElement, RasterHeader, RasterStorage};

/// A masked, optionally multi-layer raster grid.
///
/// `Raster<T, M>` stores cells of type `T`. When position compaction is
/// requested (the default), only the valid cells are kept, addressed by a
/// 0-based valid-cell index through a [`PositionIndex`]; otherwise the full
/// rectangular extent is stored per layer. `M` is the element type of an
/// optional mask raster whose valid-cell set governs which cells of this
/// raster are considered valid.
///
/// # Example
///
/// ```ignore
/// use gridmask_core::prelude::*;
///
/// let dem: Raster<f32> = Raster::from_file("dem.asc")?;
/// let index = dem.position_index_of(10, 20);
/// let value = dem.value_at(10, 20, 1)?;
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement, M: RasterElement = T> {
    /// Geometry metadata; `cells` tracks the stored-cell count
    pub(crate) header: RasterHeader,
    /// Spatial reference, carried opaquely
    pub(crate) srs: String,
    /// Base name used to derive per-layer output names
    pub(crate) core_name: String,
    /// Source path, when read from a file
    pub(crate) file_path: Option<PathBuf>,
    /// Cell values, compact or full-grid form
    pub(crate) storage: RasterStorage<T>,
    /// Valid-cell positions, present only in compact form
    pub(crate) positions: Option<PositionIndex>,
    /// Non-owning reference to the mask; its lifetime belongs to the caller
    pub(crate) mask: Option<Weak<Raster<M, M>>>,
    /// Whether the mask's extent was kept, no-data included
    pub(crate) use_mask_extent: bool,
    /// Per-layer statistics cache; never invalidated implicitly
    pub(crate) stats: Option<Vec<LayerStats>>,
}

impl<T: RasterElement, M: RasterElement> Raster<T, M> {
    // Dimensions and metadata

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.header.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.header.cols
    }

    /// Cell size (square cells)
    pub fn cell_size(&self) -> f64 {
        self.header.cell_size
    }

    /// X coordinate of the lower-left cell center
    pub fn xll_center(&self) -> f64 {
        self.header.xll
    }

    /// Y coordinate of the lower-left cell center
    pub fn yll_center(&self) -> f64 {
        self.header.yll
    }

    /// Number of layers
    pub fn layers(&self) -> usize {
        self.header.layers
    }

    /// Stored cell count per layer: the valid-cell count under compaction,
    /// rows * cols otherwise
    pub fn cell_count(&self) -> usize {
        self.header.cells
    }

    /// The no-data sentinel as recorded in the header
    pub fn nodata(&self) -> f64 {
        self.header.nodata
    }

    /// The no-data sentinel cast to the storage type
    pub fn nodata_value(&self) -> T {
        T::from_f64(self.header.nodata)
    }

    /// Raster header
    pub fn header(&self) -> &RasterHeader {
        &self.header
    }

    /// Spatial reference string (opaque pass-through)
    pub fn srs(&self) -> &str {
        &self.srs
    }

    /// Set the spatial reference string
    pub fn set_srs(&mut self, srs: impl Into<String>) {
        self.srs = srs.into();
    }

    /// Base name for derived outputs
    pub fn core_name(&self) -> &str {
        &self.core_name
    }

    /// Set the base name for derived outputs
    pub fn set_core_name(&mut self, name: impl Into<String>) {
        self.core_name = name.into();
    }

    /// Path this raster was read from, if any
    pub fn file_path(&self) -> Option<&std::path::Path> {
        self.file_path.as_deref()
    }

    /// Whether this raster carries more than one layer
    pub fn is_2d(&self) -> bool {
        self.header.layers > 1
    }

    /// Whether the compact (position-indexed) form is active
    pub fn is_compact(&self) -> bool {
        self.storage.is_compact()
    }

    /// Whether valid-cell positions were calculated
    pub fn positions_calculated(&self) -> bool {
        self.positions.is_some()
    }

    /// Whether the mask's extent was adopted, no-data included
    pub fn mask_extent_used(&self) -> bool {
        self.use_mask_extent
    }

    /// The position index, present only in compact form
    pub fn position_index(&self) -> Option<&PositionIndex> {
        self.positions.as_ref()
    }

    /// The backing storage
    pub fn storage(&self) -> &RasterStorage<T> {
        &self.storage
    }

    /// The mask this raster was built against, if it is still alive.
    ///
    /// The reference held internally is non-owning; when the caller has
    /// dropped the mask this returns `None`.
    pub fn mask(&self) -> Option<Arc<Raster<M, M>>> {
        self.mask.as_ref().and_then(Weak::upgrade)
    }

    // Coordinate / position transforms

    /// Coordinates of the cell center at (row, col)
    pub fn coordinate_of(&self, row: usize, col: usize) -> (f64, f64) {
        self.header.coordinate_of(row, col)
    }

    /// (row, col) of the cell containing (x, y), or `None` if outside
    pub fn position_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        self.header.position_of(x, y)
    }

    /// Valid-cell index of (row, col), or `None` for masked-out cells.
    ///
    /// Without a position index (grid form) there is no compact addressing,
    /// so this always returns `None`.
    pub fn position_index_of(&self, row: usize, col: usize) -> Option<usize> {
        self.positions.as_ref().and_then(|p| p.index_of(row, col))
    }

    /// Valid-cell index of the cell containing coordinate (x, y)
    pub fn position_at_coordinate(&self, x: f64, y: f64) -> Option<usize> {
        let (row, col) = self.header.position_of(x, y)?;
        self.position_index_of(row, col)
    }

    // Accessors

    fn check_layer(&self, lyr: usize) -> Result<usize> {
        if lyr < 1 || lyr > self.header.layers {
            return Err(Error::OutOfRange {
                what: "layer",
                value: lyr,
                limit: self.header.layers,
            });
        }
        Ok(lyr - 1)
    }

    /// Value at a valid-cell index (1-indexed layer).
    ///
    /// In grid form the index addresses the full extent in row-major order.
    pub fn value_at_index(&self, index: usize, lyr: usize) -> Result<T> {
        let l = self.check_layer(lyr)?;
        if index >= self.header.cells {
            return Err(Error::OutOfRange {
                what: "valid-cell index",
                value: index,
                limit: self.header.cells,
            });
        }
        Ok(match &self.storage {
            RasterStorage::Compact(block) => block[(index, l)],
            RasterStorage::Grid(grids) => {
                let cols = self.header.cols;
                grids[l][(index / cols, index % cols)]
            }
        })
    }

    /// Value at (row, col) for the given 1-indexed layer.
    ///
    /// Policy for masked-out cells: an in-bounds cell that is not part of
    /// the valid set yields the no-data sentinel rather than an error.
    /// Out-of-bounds row/col/layer is an `OutOfRange` error.
    pub fn value_at(&self, row: usize, col: usize, lyr: usize) -> Result<T> {
        let l = self.check_layer(lyr)?;
        if !self.header.contains(row, col) {
            return Err(Error::OutOfRange {
                what: "row/col",
                value: row.max(col),
                limit: self.header.rows.max(self.header.cols),
            });
        }
        Ok(match &self.storage {
            RasterStorage::Compact(block) => match self.position_index_of(row, col) {
                Some(idx) => block[(idx, l)],
                None => self.nodata_value(),
            },
            RasterStorage::Grid(grids) => grids[l][(row, col)],
        })
    }

    /// All layer values of the cell at a valid-cell index
    pub fn cell_values(&self, index: usize) -> Result<Vec<T>> {
        (1..=self.header.layers)
            .map(|lyr| self.value_at_index(index, lyr))
            .collect()
    }

    /// Whether the cell at (row, col) holds the no-data sentinel
    pub fn is_nodata_at(&self, row: usize, col: usize, lyr: usize) -> Result<bool> {
        Ok(self.value_at(row, col, lyr)?.is_nodata(self.nodata_value()))
    }

    // Mutators

    /// Write a value at (row, col) for the given 1-indexed layer.
    ///
    /// In compact form the target must be part of the valid set; the set
    /// never grows after construction.
    pub fn set_value(&mut self, row: usize, col: usize, value: T, lyr: usize) -> Result<()> {
        let l = self.check_layer(lyr)?;
        if !self.header.contains(row, col) {
            return Err(Error::OutOfRange {
                what: "row/col",
                value: row.max(col),
                limit: self.header.rows.max(self.header.cols),
            });
        }
        match &mut self.storage {
            RasterStorage::Compact(block) => {
                let idx = self
                    .positions
                    .as_ref()
                    .and_then(|p| p.index_of(row, col))
                    .ok_or(Error::NotValidCell { row, col })?;
                block[(idx, l)] = value;
            }
            RasterStorage::Grid(grids) => grids[l][(row, col)] = value,
        }
        Ok(())
    }

    /// Replace every stored occurrence of the no-data sentinel.
    ///
    /// The position index and the header sentinel stay untouched. In grid
    /// form this rewrites the no-data holes; in compact form it only affects
    /// cells that store the sentinel despite being counted valid, which the
    /// mask default-value path can produce.
    pub fn replace_nodata(&mut self, new_value: T) {
        let nd = self.nodata_value();
        self.storage.map_values_mut(|v| {
            if v.is_nodata(nd) {
                *v = new_value;
            }
        });
    }

    /// Reclassify stored values through an integer-keyed mapping.
    ///
    /// Compact form only. Values whose integer cast matches a key are
    /// replaced by the mapped value; unmapped values pass through unchanged.
    /// Never alters the valid-cell count or the position index.
    pub fn reclassify(&mut self, map: &HashMap<i32, T>) -> Result<()> {
        if !self.storage.is_compact() {
            return Err(Error::Unsupported(
                "reclassify requires position-compacted storage",
            ));
        }
        self.storage.map_values_mut(|v| {
            let key = v.to_f64() as i32;
            if let Some(&mapped) = map.get(&key) {
                *v = mapped;
            }
        });
        Ok(())
    }

    // Lifecycle

    /// Replace this instance's state with an independent deep copy of
    /// `other`. Previously owned buffers are dropped; afterwards the two
    /// instances share nothing but the mask reference.
    pub fn copy_from(&mut self, other: &Self) {
        *self = other.clone();
    }

    /// Adopt header values from another raster's header.
    pub fn copy_header(&mut self, header: &RasterHeader) {
        self.header = header.clone();
    }

    // Conversion

    /// Expand one 1-indexed layer to its full rows x cols grid.
    ///
    /// Compact form fills masked-out cells with the no-data sentinel; grid
    /// form clones the layer as stored.
    pub fn to_grid(&self, lyr: usize) -> Result<Array2<T>> {
        let l = self.check_layer(lyr)?;
        match &self.storage {
            RasterStorage::Grid(grids) => Ok(grids[l].clone()),
            RasterStorage::Compact(block) => {
                let mut grid = Array2::from_elem(
                    (self.header.rows, self.header.cols),
                    self.nodata_value(),
                );
                if let Some(positions) = &self.positions {
                    for (idx, (row, col)) in positions.iter().enumerate() {
                        grid[(row, col)] = block[(idx, l)];
                    }
                }
                Ok(grid)
            }
        }
    }

    /// The valid (row, col) set of this raster, in row-major order.
    ///
    /// Compact form reads the position index; grid form scans the first
    /// layer for cells that differ from the sentinel.
    pub(crate) fn valid_positions(&self) -> Vec<(usize, usize)> {
        if let Some(positions) = &self.positions {
            return positions.iter().collect();
        }
        let nd = self.nodata_value();
        let mut out = Vec::new();
        if let RasterStorage::Grid(grids) = &self.storage {
            if let Some(first) = grids.first() {
                for ((row, col), v) in first.indexed_iter() {
                    if !v.is_nodata(nd) {
                        out.push((row, col));
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::RawRaster;
    use crate::raster::RasterOptions;

    const ND: f64 = -9999.0;

    fn compact_3x3() -> Raster<f64> {
        // Corners (0, 0) and (2, 2) are no-data.
        let header = RasterHeader::new(3, 3, 0.0, 0.0, 10.0, ND);
        let data = Array2::from_shape_vec(
            (3, 3),
            vec![ND, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, ND],
        )
        .unwrap();
        let raw = RawRaster::new(header, data).unwrap();
        Raster::from_raw(raw, RasterOptions::default()).unwrap()
    }

    #[test]
    fn test_value_by_index_and_rowcol_agree() {
        let r = compact_3x3();
        for (idx, (row, col)) in r.position_index().unwrap().iter().enumerate() {
            assert_eq!(
                r.value_at_index(idx, 1).unwrap(),
                r.value_at(row, col, 1).unwrap()
            );
        }
    }

    #[test]
    fn test_masked_out_cell_reads_as_nodata() {
        // Policy: in-bounds but not in the valid set yields the sentinel.
        let r = compact_3x3();
        assert_eq!(r.value_at(0, 0, 1).unwrap(), ND);
        assert_eq!(r.value_at(2, 2, 1).unwrap(), ND);
        assert!(r.is_nodata_at(0, 0, 1).unwrap());
        assert!(!r.is_nodata_at(1, 1, 1).unwrap());
    }

    #[test]
    fn test_out_of_bounds_is_an_error() {
        let r = compact_3x3();
        assert!(matches!(
            r.value_at(3, 0, 1),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            r.value_at(0, 0, 2),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            r.value_at_index(7, 1),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_set_value_writes_through() {
        let mut r = compact_3x3();
        r.set_value(1, 1, 40.0, 1).unwrap();
        assert_eq!(r.value_at(1, 1, 1).unwrap(), 40.0);
        let idx = r.position_index_of(1, 1).unwrap();
        assert_eq!(r.value_at_index(idx, 1).unwrap(), 40.0);
    }

    #[test]
    fn test_set_value_cannot_grow_valid_set() {
        let mut r = compact_3x3();
        let err = r.set_value(0, 0, 1.0, 1).unwrap_err();
        assert!(matches!(err, Error::NotValidCell { row: 0, col: 0 }));
        assert_eq!(r.cell_count(), 7);
    }

    #[test]
    fn test_position_at_coordinate() {
        let r = compact_3x3();
        // Cell (1, 1) center is (10, 10); its valid index is 3.
        assert_eq!(r.position_at_coordinate(10.0, 10.0), Some(3));
        // Masked-out corner has no index; far outside has no cell.
        assert_eq!(r.position_at_coordinate(0.0, 20.0), None);
        assert_eq!(r.position_at_coordinate(500.0, 500.0), None);
    }

    #[test]
    fn test_replace_nodata_leaves_index_alone() {
        let opts = RasterOptions {
            calc_positions: false,
            ..Default::default()
        };
        let header = RasterHeader::new(2, 2, 0.0, 0.0, 10.0, ND);
        let data = Array2::from_shape_vec((2, 2), vec![ND, 1.0, 2.0, ND]).unwrap();
        let mut r: Raster<f64> =
            Raster::from_raw(RawRaster::new(header, data).unwrap(), opts).unwrap();
        r.replace_nodata(0.0);
        assert_eq!(r.value_at(0, 0, 1).unwrap(), 0.0);
        assert_eq!(r.value_at(1, 1, 1).unwrap(), 0.0);
        assert_eq!(r.nodata(), ND);
        assert_eq!(r.cell_count(), 4);
    }

    #[test]
    fn test_reclassify_maps_values() {
        let mut r = compact_3x3();
        let map = HashMap::from([(1, 100.0), (7, 700.0)]);
        r.reclassify(&map).unwrap();
        assert_eq!(r.value_at(0, 1, 1).unwrap(), 100.0);
        assert_eq!(r.value_at(2, 1, 1).unwrap(), 700.0);
        // Unmapped values pass through unchanged.
        assert_eq!(r.value_at(1, 1, 1).unwrap(), 4.0);
        // Shape is untouched.
        assert_eq!(r.cell_count(), 7);
        assert_eq!(r.position_index().unwrap().len(), 7);
    }

    #[test]
    fn test_reclassify_requires_compact_form() {
        let opts = RasterOptions {
            calc_positions: false,
            ..Default::default()
        };
        let header = RasterHeader::new(2, 2, 0.0, 0.0, 10.0, ND);
        let data = Array2::from_elem((2, 2), 1.0);
        let mut r: Raster<f64> =
            Raster::from_raw(RawRaster::new(header, data).unwrap(), opts).unwrap();
        assert!(matches!(
            r.reclassify(&HashMap::new()),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_copy_independence() {
        let source = compact_3x3();
        let mut copy: Raster<f64> = source.clone();
        copy.copy_from(&source);
        let mut source = source;
        source.set_value(1, 1, -1.0, 1).unwrap();
        assert_eq!(copy.value_at(1, 1, 1).unwrap(), 4.0);
        copy.set_value(0, 1, -2.0, 1).unwrap();
        assert_eq!(source.value_at(0, 1, 1).unwrap(), 1.0);
    }

    #[test]
    fn test_cell_values_across_layers() {
        let header = RasterHeader::new(2, 2, 0.0, 0.0, 10.0, ND);
        let a = RawRaster::new(
            header.clone(),
            Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap(),
        )
        .unwrap();
        let b = RawRaster::new(
            header,
            Array2::from_shape_vec((2, 2), vec![10.0, 20.0, 30.0, 40.0]).unwrap(),
        )
        .unwrap();
        let r: Raster<f64> =
            Raster::from_raw_layers(vec![a, b], RasterOptions::default()).unwrap();
        assert_eq!(r.cell_values(3).unwrap(), vec![4.0, 40.0]);
    }

    #[test]
    fn test_to_grid_restores_holes() {
        let r = compact_3x3();
        let grid = r.to_grid(1).unwrap();
        assert_eq!(grid[(0, 0)], ND);
        assert_eq!(grid[(2, 2)], ND);
        assert_eq!(grid[(1, 2)], 5.0);
    }
}
