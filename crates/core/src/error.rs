//! Error and result types shared across the Zonalis crates.

use thiserror::Error;

/// Everything that can go wrong while loading data or reducing regions.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer does not fill a {width}x{height} grid")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Cell ({row}, {col}) lies outside a grid of {rows} rows by {cols} columns")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Grid shapes differ: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Coordinate systems differ: {0} vs {1}")]
    CrsMismatch(String, String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Schema mismatch in {source_name}: none of the name fields {candidates:?} present")]
    SchemaMismatch {
        source_name: String,
        candidates: Vec<String>,
    },

    #[error("Duplicate region name: {0}")]
    DuplicateRegion(String),

    #[error("Formula error: {0}")]
    Formula(String),

    #[error("Aggregation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
