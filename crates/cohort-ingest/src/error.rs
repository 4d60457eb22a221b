//! Error types for input readers.

use std::path::PathBuf;

use cohort_model::ModelError;
use thiserror::Error;

/// Errors that can occur while reading run inputs.
#[derive(Debug, Error)]
pub enum IngestError {
    // === File System Errors ===
    /// Input file not found.
    #[error("input file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Failed to read file.
    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === CSV Parsing Errors ===
    /// Malformed CSV record.
    #[error("failed to parse CSV {path}: {source}")]
    CsvParse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// CSV error without file context.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// CSV file has no header row.
    #[error("CSV file is empty: {path}")]
    EmptyCsv { path: PathBuf },

    /// Required column not found.
    #[error("required column '{column}' not found in {path}")]
    MissingColumn { column: String, path: PathBuf },

    /// Value that cannot be parsed for its column.
    #[error("invalid {field} value '{value}' in {path} (row {row})")]
    InvalidValue {
        field: String,
        value: String,
        path: PathBuf,
        row: usize,
    },

    // === XML Errors ===
    /// Malformed query definition.
    #[error("failed to parse XML {path} at byte {position}: {source}")]
    Xml {
        path: PathBuf,
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    // === Layout Errors ===
    /// Fixed-width layout is unusable.
    #[error("invalid record layout in {path}: {reason}")]
    Layout { path: PathBuf, reason: String },

    // === Validation Errors ===
    /// Input rows violate a model invariant.
    #[error("{path}: {source}")]
    Validation {
        path: PathBuf,
        #[source]
        source: ModelError,
    },
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;
