//! Valid-cell position index

use crate::error::{Error, Result};

/// Ordered (row, col) list defining the compact-form addressing scheme.
///
/// One entry per valid cell, indexed `0..valid_count`. Entries are kept in
/// row-major scan order, which makes the ordering canonical and lets the
/// inverse lookup run as a binary search without a companion map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionIndex {
    positions: Vec<(usize, usize)>,
}

impl PositionIndex {
    /// Build from positions already in row-major order.
    ///
    /// Order is debug-asserted, not sorted: the masking engine produces
    /// positions in scan order and that order is authoritative.
    pub fn from_sorted(positions: Vec<(usize, usize)>) -> Self {
        debug_assert!(positions.windows(2).all(|w| w[0] < w[1]));
        Self { positions }
    }

    /// Number of valid cells
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// (row, col) of the valid cell at `index`
    pub fn get(&self, index: usize) -> Result<(usize, usize)> {
        self.positions
            .get(index)
            .copied()
            .ok_or(Error::OutOfRange {
                what: "valid-cell index",
                value: index,
                limit: self.positions.len(),
            })
    }

    /// Valid-cell index of (row, col), or `None` if the cell is masked out
    pub fn index_of(&self, row: usize, col: usize) -> Option<usize> {
        self.positions.binary_search(&(row, col)).ok()
    }

    /// Iterate (row, col) pairs in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.positions.iter().copied()
    }

    /// The raw position slice
    pub fn as_slice(&self) -> &[(usize, usize)] {
        &self.positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> PositionIndex {
        PositionIndex::from_sorted(vec![(0, 1), (0, 3), (1, 0), (2, 2)])
    }

    #[test]
    fn test_lookup() {
        let idx = index();
        assert_eq!(idx.len(), 4);
        assert_eq!(idx.get(2).unwrap(), (1, 0));
        assert!(matches!(idx.get(4), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn test_inverse_lookup() {
        let idx = index();
        assert_eq!(idx.index_of(0, 3), Some(1));
        assert_eq!(idx.index_of(2, 2), Some(3));
        assert_eq!(idx.index_of(0, 0), None);
        assert_eq!(idx.index_of(5, 5), None);
    }

    #[test]
    fn test_iteration_order() {
        let idx = index();
        let collected: Vec<_> = idx.iter().collect();
        assert_eq!(collected, vec![(0, 1), (0, 3), (1, 0), (2, 2)]);
    }
}
