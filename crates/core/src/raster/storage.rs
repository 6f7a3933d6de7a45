//! Dual-mode cell storage

use ndarray::Array2;

use crate::raster::RasterElement;

/// Backing representation for a raster's cell values.
///
/// Exactly one form exists per instance, chosen at construction:
///
/// - `Compact`: only the valid cells, as a (valid cells x layers) block in
///   canonical position order. Cell-major: all layers of one cell are
///   adjacent.
/// - `Grid`: the full rectangular extent, one rows x cols array per layer.
///
/// Modeling this as an enum rather than two optional buffers makes the
/// "both or neither populated" state unrepresentable.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterStorage<T: RasterElement> {
    /// Valid cells only, shape (valid_count, layers)
    Compact(Array2<T>),
    /// Full extent, one array per layer
    Grid(Vec<Array2<T>>),
}

impl<T: RasterElement> RasterStorage<T> {
    /// Number of layers
    pub fn layers(&self) -> usize {
        match self {
            RasterStorage::Compact(block) => block.ncols(),
            RasterStorage::Grid(grids) => grids.len(),
        }
    }

    /// Number of stored cells per layer
    pub fn cell_count(&self) -> usize {
        match self {
            RasterStorage::Compact(block) => block.nrows(),
            RasterStorage::Grid(grids) => grids.first().map_or(0, |g| g.len()),
        }
    }

    /// Whether this is the compact (position-indexed) form
    pub fn is_compact(&self) -> bool {
        matches!(self, RasterStorage::Compact(_))
    }

    /// Apply `f` to every stored value, across all layers.
    pub fn map_values_mut(&mut self, mut f: impl FnMut(&mut T)) {
        match self {
            RasterStorage::Compact(block) => {
                for v in block.iter_mut() {
                    f(v);
                }
            }
            RasterStorage::Grid(grids) => {
                for grid in grids {
                    for v in grid.iter_mut() {
                        f(v);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_compact_shape() {
        let s = RasterStorage::Compact(array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]]);
        assert!(s.is_compact());
        assert_eq!(s.layers(), 2);
        assert_eq!(s.cell_count(), 3);
    }

    #[test]
    fn test_grid_shape() {
        let s = RasterStorage::Grid(vec![Array2::<f32>::zeros((4, 5)); 3]);
        assert!(!s.is_compact());
        assert_eq!(s.layers(), 3);
        assert_eq!(s.cell_count(), 20);
    }

    #[test]
    fn test_map_values_mut() {
        let mut s = RasterStorage::Compact(array![[1.0], [2.0], [3.0]]);
        s.map_values_mut(|v| *v += 1.0);
        assert_eq!(s, RasterStorage::Compact(array![[2.0], [3.0], [4.0]]));
    }
}
