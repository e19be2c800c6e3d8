//! Error types for the gedload ingestion pipeline.
//!
//! This module defines the fatal error hierarchy:
//!
//! - [`ReadError`] - byte stream and decoding errors
//! - [`SchemaError`] - header and schema errors
//! - [`LoadError`] - top-level load errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.
//!
//! Only fatal conditions live here. Row-level problems (malformed lines,
//! field-count mismatches, missing required fields) and field-level parse
//! failures are not errors: they accumulate into the rejected-rows list and
//! coercion counters on the [`Table`](crate::models::Table).

use thiserror::Error;

// =============================================================================
// Read Errors
// =============================================================================

/// Errors while reading and decoding the input stream.
#[derive(Debug, Error)]
pub enum ReadError {
    /// Failed to read the input stream.
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    /// The byte stream does not decode under the configured encoding.
    ///
    /// Reported once per load, never per line.
    #[error("Input is not valid {encoding}: undecodable byte sequence near offset {offset}")]
    Decode { encoding: &'static str, offset: usize },
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Errors while building the schema from the header row.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The input contains no rows at all.
    #[error("CSV input is empty")]
    EmptyInput,

    /// The header row could not be tokenized.
    #[error("Header row is not parseable: {0}")]
    Header(String),

    /// The header row contains no usable column names.
    #[error("Header row has no columns")]
    NoColumns,

    /// Two columns share the same name after trimming.
    #[error("Duplicate column name after trimming: '{0}'")]
    DuplicateColumn(String),
}

// =============================================================================
// Load Errors (top-level)
// =============================================================================

/// Top-level load errors.
///
/// This is the only error type returned by [`crate::pipeline::load_file`]
/// and [`crate::pipeline::load_bytes`]. A `LoadError` means the load aborted
/// and no Table was published.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Stream or decoding error.
    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    /// Header/schema error.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for reader operations.
pub type ReadResult<T> = Result<T, ReadError>;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;
