//! Error types for gridmask

use thiserror::Error;

/// Main error type for gridmask operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source unavailable: {path}")]
    SourceUnavailable { path: String },

    #[error("Malformed grid or header in {path}: {reason}")]
    FormatError { path: String, reason: String },

    #[error("Dimension mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    DimensionMismatch {
        er: usize,
        ec: usize,
        ar: usize,
        ac: usize,
    },

    #[error("Incompatible geometry: cell size {expected} vs {actual}")]
    IncompatibleGeometry { expected: f64, actual: f64 },

    #[error("Unknown key: {0}")]
    InvalidKey(String),

    #[error("{what} out of range: {value} (limit {limit})")]
    OutOfRange {
        what: &'static str,
        value: usize,
        limit: usize,
    },

    #[error("Cell ({row}, {col}) is not in the valid set")]
    NotValidCell { row: usize, col: usize },

    #[error("Write failed for {path}: {reason}")]
    WriteError { path: String, reason: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

/// Result type alias for gridmask operations
pub type Result<T> = std::result::Result<T, Error>;
