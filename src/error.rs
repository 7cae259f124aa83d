//! Error types for betarange
//!
//! Configuration errors (missing input, malformed tables) are distinguished
//! from degenerate-but-valid data: an empty measurement window is a legitimate
//! outcome, a record table spanning zero events is not.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// betarange error types
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing input (non-existent record table, malformed settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record table column missing or of the wrong type
    #[error("Storage error: {0}")]
    Storage(String),

    /// The decay table spans zero simulated events; virtual emission times
    /// cannot be assigned
    #[error("No events in record table: cannot assign virtual emission times")]
    NoEvents,

    /// A decay record carries a parent nuclide outside {C-11, N-13, O-15}.
    /// The provenance tracker never emits such a record, so this signals a
    /// corrupted or foreign input table.
    #[error("Decay record with unknown parent isotope Z={z} at row {row}")]
    UnknownIsotope {
        /// Atomic number found in the record
        z: i32,
        /// Row index within the decay table
        row: usize,
    },

    /// Histogram construction with a degenerate axis
    #[error("Invalid histogram axis: {0}")]
    InvalidAxis(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}
