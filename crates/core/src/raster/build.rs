//! Masking and compaction engine
//!
//! Turns raw rectangular grids (plus an optional mask raster) into the
//! position index and storage form of a [`Raster`].

use std::sync::Arc;

use ndarray::Array2;
use tracing::debug;

use crate::error::{Error, Result};
use crate::io::RawRaster;
use crate::raster::header::cell_size_eq;
use crate::raster::{PositionIndex, Raster, RasterElement, RasterHeader, RasterStorage};

/// Construction options for the masking and compaction engine.
#[derive(Debug, Clone, Copy)]
pub struct RasterOptions {
    /// Compact to valid cells (default true); false keeps the full grid
    pub calc_positions: bool,
    /// Keep the mask's whole valid set even where the source has no data
    /// (default true)
    pub use_mask_extent: bool,
    /// Substitute for mask-valid cells the source cannot supply; defaults
    /// to the source's no-data sentinel
    pub default_value: Option<f64>,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            calc_positions: true,
            use_mask_extent: true,
            default_value: None,
        }
    }
}

impl<T: RasterElement, M: RasterElement> Raster<T, M> {
    /// Build from a single raw grid, no mask.
    pub fn from_raw(raw: RawRaster<T>, opts: RasterOptions) -> Result<Self> {
        Self::from_raw_layers(vec![raw], opts)
    }

    /// Build from one raw grid per layer, no mask.
    ///
    /// The position index is computed once from the first layer and reused
    /// for every subsequent layer; layers must agree on geometry.
    pub fn from_raw_layers(raws: Vec<RawRaster<T>>, opts: RasterOptions) -> Result<Self> {
        let first = raws.first().ok_or(Error::Unsupported(
            "at least one layer is required to build a raster",
        ))?;
        for raw in &raws[1..] {
            first.header.same_extent(&raw.header)?;
        }

        let mut header = first.header.clone();
        let srs = first.srs.clone();
        header.layers = raws.len();
        let nodata = T::from_f64(header.nodata);

        if !opts.calc_positions {
            header.cells = header.extent_cells();
            let grids = raws.into_iter().map(|raw| raw.data).collect();
            return Ok(Self::assemble(header, srs, RasterStorage::Grid(grids), None));
        }

        // Row-major scan of the first layer defines the canonical order.
        let mut positions = Vec::new();
        for ((row, col), v) in first.data.indexed_iter() {
            if !v.is_nodata(nodata) {
                positions.push((row, col));
            }
        }
        header.cells = positions.len();
        debug!(
            valid = positions.len(),
            extent = header.extent_cells(),
            layers = header.layers,
            "compacted grid to valid cells"
        );

        let block = Array2::from_shape_fn((positions.len(), raws.len()), |(i, l)| {
            let (row, col) = positions[i];
            raws[l].data[(row, col)]
        });
        Ok(Self::assemble(
            header,
            srs,
            RasterStorage::Compact(block),
            Some(PositionIndex::from_sorted(positions)),
        ))
    }

    /// Build from a single raw grid governed by a mask raster.
    pub fn from_raw_masked(
        raw: RawRaster<T>,
        mask: &Arc<Raster<M, M>>,
        opts: RasterOptions,
    ) -> Result<Self> {
        Self::from_raw_layers_masked(vec![raw], mask, opts)
    }

    /// Build from one raw grid per layer, governed by a mask raster.
    ///
    /// The mask's valid positions are authoritative and the produced raster
    /// adopts the mask's geometry. The two extents may differ in origin but
    /// must share the cell size; alignment goes through the coordinate
    /// transform, not through header equality.
    pub fn from_raw_layers_masked(
        raws: Vec<RawRaster<T>>,
        mask: &Arc<Raster<M, M>>,
        opts: RasterOptions,
    ) -> Result<Self> {
        let first = raws.first().ok_or(Error::Unsupported(
            "at least one layer is required to build a raster",
        ))?;
        if !cell_size_eq(mask.cell_size(), first.header.cell_size) {
            return Err(Error::IncompatibleGeometry {
                expected: mask.cell_size(),
                actual: first.header.cell_size,
            });
        }
        for raw in &raws[1..] {
            first.header.same_extent(&raw.header)?;
        }

        let nodata = T::from_f64(first.header.nodata);
        let default_value = opts
            .default_value
            .map(T::from_f64)
            .unwrap_or(nodata);

        // Align every mask-valid cell to a source cell by coordinate.
        let mask_positions = mask.valid_positions();
        let mut positions = Vec::with_capacity(mask_positions.len());
        let mut source_cells = Vec::with_capacity(mask_positions.len());
        let mut substituted = 0usize;
        for (mrow, mcol) in mask_positions {
            let (x, y) = mask.coordinate_of(mrow, mcol);
            let src = first.header.position_of(x, y);
            let missing = match src {
                Some((row, col)) => first.data[(row, col)].is_nodata(nodata),
                None => true,
            };
            if missing {
                if !opts.use_mask_extent {
                    continue;
                }
                substituted += 1;
            }
            positions.push((mrow, mcol));
            source_cells.push(src);
        }
        if substituted > 0 {
            debug!(
                substituted,
                total = positions.len(),
                "mask extent exceeds source valid extent; substituted default value"
            );
        }

        // Geometry comes from the mask; the sentinel and SRS from the source.
        let mut header = RasterHeader::new(
            mask.rows(),
            mask.cols(),
            mask.xll_center(),
            mask.yll_center(),
            mask.cell_size(),
            first.header.nodata,
        );
        header.layers = raws.len();
        header.cells = positions.len();
        let srs = first.srs.clone();

        let block = Array2::from_shape_fn((positions.len(), raws.len()), |(i, l)| {
            match source_cells[i] {
                Some((row, col)) => {
                    let v = raws[l].data[(row, col)];
                    if opts.use_mask_extent && v.is_nodata(nodata) {
                        default_value
                    } else {
                        v
                    }
                }
                None => default_value,
            }
        });

        let mut raster = Self::assemble(
            header,
            srs,
            RasterStorage::Compact(block),
            Some(PositionIndex::from_sorted(positions)),
        );
        raster.mask = Some(Arc::downgrade(mask));
        raster.use_mask_extent = opts.use_mask_extent;
        Ok(raster)
    }

    /// Adopt a caller-provided value array, one value per mask-valid cell.
    ///
    /// The buffer moves into the raster; the mask supplies geometry,
    /// position index and sentinel. The mask must itself be compacted.
    pub fn with_mask_values(mask: &Arc<Raster<M, M>>, values: Vec<T>) -> Result<Self> {
        let n = values.len();
        let block = Array2::from_shape_vec((n, 1), values)
            .map_err(|_| Error::Unsupported("value buffer does not form a column"))?;
        Self::with_mask_layers(mask, block)
    }

    /// Adopt a caller-provided (cells x layers) value block paired with a
    /// mask. Row `i` holds every layer value of the mask's i-th valid cell.
    pub fn with_mask_layers(mask: &Arc<Raster<M, M>>, values: Array2<T>) -> Result<Self> {
        let positions = mask
            .position_index()
            .ok_or(Error::Unsupported(
                "array adoption requires a position-compacted mask",
            ))?
            .clone();
        if values.nrows() != positions.len() {
            return Err(Error::DimensionMismatch {
                er: positions.len(),
                ec: values.ncols(),
                ar: values.nrows(),
                ac: values.ncols(),
            });
        }

        let mut header = RasterHeader::new(
            mask.rows(),
            mask.cols(),
            mask.xll_center(),
            mask.yll_center(),
            mask.cell_size(),
            mask.nodata(),
        );
        header.layers = values.ncols();
        header.cells = values.nrows();

        let mut raster = Self::assemble(
            header,
            mask.srs().to_string(),
            RasterStorage::Compact(values),
            Some(positions),
        );
        raster.mask = Some(Arc::downgrade(mask));
        Ok(raster)
    }

    fn assemble(
        header: RasterHeader,
        srs: String,
        storage: RasterStorage<T>,
        positions: Option<PositionIndex>,
    ) -> Self {
        Self {
            header,
            srs,
            core_name: String::new(),
            file_path: None,
            storage,
            positions,
            mask: None,
            use_mask_extent: true,
            stats: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ND: f64 = -9999.0;

    fn raw(rows: usize, cols: usize, xll: f64, yll: f64, values: Vec<f64>) -> RawRaster<f64> {
        let header = RasterHeader::new(rows, cols, xll, yll, 10.0, ND);
        RawRaster::new(header, Array2::from_shape_vec((rows, cols), values).unwrap()).unwrap()
    }

    fn source_4x4() -> RawRaster<f64> {
        // Two no-data holes at (0, 0) and (2, 2).
        raw(
            4,
            4,
            0.0,
            0.0,
            vec![
                ND, 1.0, 2.0, 3.0, //
                4.0, 5.0, 6.0, 7.0, //
                8.0, 9.0, ND, 11.0, //
                12.0, 13.0, 14.0, 15.0,
            ],
        )
    }

    #[test]
    fn test_compaction_row_major_scan() {
        let r: Raster<f64> = Raster::from_raw(source_4x4(), RasterOptions::default()).unwrap();
        assert!(r.is_compact());
        assert_eq!(r.cell_count(), 14);
        let positions = r.position_index().unwrap();
        assert_eq!(positions.len(), 14);
        // Scan order is authoritative: first valid cell is (0, 1).
        assert_eq!(positions.get(0).unwrap(), (0, 1));
        assert_eq!(r.value_at_index(0, 1).unwrap(), 1.0);
        assert_eq!(positions.get(9).unwrap(), (2, 3));
        assert_eq!(r.value_at_index(9, 1).unwrap(), 11.0);
        // Holes are absent from the index.
        assert_eq!(positions.index_of(0, 0), None);
        assert_eq!(positions.index_of(2, 2), None);
    }

    #[test]
    fn test_grid_form_when_positions_skipped() {
        let opts = RasterOptions {
            calc_positions: false,
            ..Default::default()
        };
        let r: Raster<f64> = Raster::from_raw(source_4x4(), opts).unwrap();
        assert!(!r.is_compact());
        assert!(!r.positions_calculated());
        assert_eq!(r.cell_count(), 16);
        assert_eq!(r.value_at(2, 2, 1).unwrap(), ND);
    }

    #[test]
    fn test_layers_share_one_index() {
        let a = source_4x4();
        let mut b = source_4x4();
        // Layer 2 has a different no-data layout; the first layer rules.
        b.data[(3, 3)] = ND;
        let r: Raster<f64> =
            Raster::from_raw_layers(vec![a, b], RasterOptions::default()).unwrap();
        assert_eq!(r.layers(), 2);
        assert!(r.is_2d());
        assert_eq!(r.cell_count(), 14);
        // (3, 3) is valid per layer 1 and stores layer 2's sentinel as-is.
        let idx = r.position_index_of(3, 3).unwrap();
        assert_eq!(r.value_at_index(idx, 2).unwrap(), ND);
    }

    #[test]
    fn test_layer_dimension_mismatch() {
        let a = source_4x4();
        let b = raw(3, 4, 0.0, 0.0, vec![0.0; 12]);
        let err =
            Raster::<f64>::from_raw_layers(vec![a, b], RasterOptions::default()).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    fn mask_2x2(xll: f64, yll: f64) -> Arc<Raster<f64>> {
        // Three valid cells; (1, 1) is masked out.
        let m = raw(2, 2, xll, yll, vec![1.0, 1.0, 1.0, ND]);
        Arc::new(Raster::from_raw(m, RasterOptions::default()).unwrap())
    }

    #[test]
    fn test_mask_alignment_by_coordinate() {
        // Mask origin sits one cell inside the source.
        let mask = mask_2x2(10.0, 10.0);
        let r: Raster<f64> =
            Raster::from_raw_masked(source_4x4(), &mask, RasterOptions::default()).unwrap();
        // Geometry is adopted from the mask; positions are mask-grid.
        assert_eq!((r.rows(), r.cols()), (2, 2));
        assert_eq!(r.cell_count(), 3);
        // Mask (0, 0) center is (10, 20) -> source (1, 1) = 5.0.
        assert_eq!(r.value_at(0, 0, 1).unwrap(), 5.0);
        // Mask (1, 0) center is (10, 10) -> source (2, 1) = 9.0.
        assert_eq!(r.value_at(1, 0, 1).unwrap(), 9.0);
    }

    #[test]
    fn test_mask_extent_keeps_mask_count() {
        // Mask pokes past the source's far corner; (0, 1) and (1, 0) of the
        // mask fall outside, plus the source hole under (0, 0).
        let mask = mask_2x2(30.0, 30.0);
        let opts = RasterOptions {
            default_value: Some(99.0),
            ..Default::default()
        };
        let r: Raster<f64> = Raster::from_raw_masked(source_4x4(), &mask, opts).unwrap();
        assert_eq!(r.cell_count(), 3);
        // Mask (0, 0) center (30, 40) is north of the source: substituted.
        assert_eq!(r.value_at(0, 0, 1).unwrap(), 99.0);
        // Mask (1, 0) center (30, 30) -> source (0, 3) = 3.0.
        assert_eq!(r.value_at(1, 0, 1).unwrap(), 3.0);
    }

    #[test]
    fn test_mask_without_extent_drops_missing_cells() {
        let mask = mask_2x2(30.0, 30.0);
        let opts = RasterOptions {
            use_mask_extent: false,
            ..Default::default()
        };
        let r: Raster<f64> = Raster::from_raw_masked(source_4x4(), &mask, opts).unwrap();
        // Only mask (1, 0) -> source (0, 3) survives.
        assert_eq!(r.cell_count(), 1);
        assert_eq!(r.value_at_index(0, 1).unwrap(), 3.0);
        assert!(!r.mask_extent_used());
    }

    #[test]
    fn test_mask_cell_size_must_match() {
        let m = raw(2, 2, 0.0, 0.0, vec![1.0; 4]);
        let mut mask_raster: Raster<f64> = Raster::from_raw(m, RasterOptions::default()).unwrap();
        mask_raster.header.cell_size = 30.0;
        let mask = Arc::new(mask_raster);
        let err = Raster::<f64>::from_raw_masked(source_4x4(), &mask, RasterOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::IncompatibleGeometry { .. }));
    }

    #[test]
    fn test_mask_reference_is_non_owning() {
        let mask = mask_2x2(10.0, 10.0);
        let r: Raster<f64> =
            Raster::from_raw_masked(source_4x4(), &mask, RasterOptions::default()).unwrap();
        assert!(r.mask().is_some());
        drop(mask);
        assert!(r.mask().is_none());
    }

    #[test]
    fn test_adopt_values_against_mask() {
        let mask = mask_2x2(10.0, 10.0);
        let r: Raster<f64> = Raster::with_mask_values(&mask, vec![7.0, 8.0, 9.0]).unwrap();
        assert_eq!(r.cell_count(), 3);
        assert_eq!(r.rows(), 2);
        assert_eq!(r.value_at_index(2, 1).unwrap(), 9.0);
        assert_eq!(
            r.position_index().unwrap().as_slice(),
            mask.position_index().unwrap().as_slice()
        );
    }

    #[test]
    fn test_adopt_values_length_mismatch() {
        let mask = mask_2x2(10.0, 10.0);
        let err = Raster::<f64>::with_mask_values(&mask, vec![7.0, 8.0]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn test_adopt_layer_block_against_mask() {
        let mask = mask_2x2(10.0, 10.0);
        let block = Array2::from_shape_vec((3, 2), vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0]).unwrap();
        let r: Raster<f64> = Raster::with_mask_layers(&mask, block).unwrap();
        assert_eq!(r.layers(), 2);
        assert_eq!(r.value_at_index(1, 2).unwrap(), 20.0);
    }
}
