//! Error types and SNAFU context selectors for dataset operations.
//!
//! This module centralizes the `DatasetError` enum used by the public API and
//! exposes context selectors (via `#[snafu(visibility(pub(crate)))]`) so
//! sibling modules can attach error context without re-exporting everything
//! at the crate root.
//!
//! Loosely grouped:
//! - not found: `DatasetNotFound`, `MetadataNotFound`, `DatasetNotInCatalog`
//! - validation: `MetadataParse`, `InvalidMetadata`, `DuplicateId`,
//!   `DimensionMismatch`, `InvalidRecord`
//! - configuration / state: `Storage` (wrapping scheme errors),
//!   `CatalogNotInitialized`, `NotBackedByStorage`
//! - arguments: `InvalidBatchSize`, `InvalidArgument`, `UnknownTable`
//! - capacity: `CapacityExceeded`
//! - persistence: `NameMismatch`, `ParquetWrite`

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use snafu::prelude::*;

use crate::metadata::MetadataError;
use crate::storage::StorageError;

/// Result alias used across the crate.
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Errors from dataset, catalog and table operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DatasetError {
    /// The dataset root does not exist.
    #[snafu(display("Dataset does not exist at {path}. Please check the path or dataset id"))]
    DatasetNotFound {
        /// Location that was checked.
        path: String,
        /// Underlying storage error.
        source: StorageError,
    },

    /// `metadata.json` is missing.
    #[snafu(display("Metadata file not found at {path}"))]
    MetadataNotFound {
        /// Path of the expected metadata file.
        path: String,
        /// Underlying storage error.
        source: StorageError,
    },

    /// `metadata.json` is not valid JSON or does not match the schema.
    #[snafu(display("Invalid metadata at {path}: {source}"))]
    MetadataParse {
        /// Path of the metadata file.
        path: String,
        /// Underlying JSON error (field type or shape mismatch).
        source: serde_json::Error,
    },

    /// Metadata parsed but violates a semantic rule.
    #[snafu(display("Invalid metadata for dataset {name:?}: {source}"))]
    InvalidMetadata {
        /// Dataset name as found in the metadata.
        name: String,
        /// The violated rule.
        source: MetadataError,
    },

    /// Any other storage-layer failure, including unsupported schemes.
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// Underlying storage error.
        source: StorageError,
    },

    /// A parquet file could not be decoded.
    #[snafu(display("Parquet read error in {path}: {source}"))]
    ParquetRead {
        /// File being read.
        path: String,
        /// Underlying parquet error.
        source: ParquetError,
    },

    /// A table could not be encoded as parquet.
    #[snafu(display("Parquet write error for {path}: {source}"))]
    ParquetWrite {
        /// File being written.
        path: String,
        /// Underlying parquet error.
        source: ParquetError,
    },

    /// Arrow compute or conversion error.
    #[snafu(display("Arrow error: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// Rows could not be converted to or from JSON records.
    #[snafu(display("Record encoding error: {source}"))]
    RecordEncoding {
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Batches of one table disagree on their schema.
    #[snafu(display("Schema mismatch: expected {expected}, found {found}"))]
    SchemaMismatch {
        /// Schema of the table.
        expected: String,
        /// Schema of the offending batch.
        found: String,
    },

    /// `batch_size` is not a positive integer.
    #[snafu(display("batch_size must be greater than 0 (got {value})"))]
    InvalidBatchSize {
        /// The rejected value, as written by the caller.
        value: String,
    },

    /// Any other invalid caller-supplied argument.
    #[snafu(display("Invalid argument: {message}"))]
    InvalidArgument {
        /// What was wrong.
        message: String,
    },

    /// A table holds more rows than may be materialized in memory.
    #[snafu(display(
        "Table at {path} has {rows} rows, exceeding the in-memory limit of {limit} rows"
    ))]
    CapacityExceeded {
        /// Table directory.
        path: String,
        /// Rows recorded in the parquet footers.
        rows: u64,
        /// Configured cap.
        limit: u64,
    },

    /// Persisting under a directory whose name differs from the metadata name.
    #[snafu(display(
        "Refusing to save dataset {name:?} to {path}: the target directory name must match the dataset name"
    ))]
    NameMismatch {
        /// Target location.
        path: String,
        /// `metadata.name`.
        name: String,
    },

    /// Table key other than `documents` / `queries`.
    #[snafu(display("Dataset does not have key: {key}"))]
    UnknownTable {
        /// The rejected key.
        key: String,
    },

    /// Operation requires a storage-backed dataset.
    #[snafu(display("Dataset was built in memory and has no storage path; cannot {operation}"))]
    NotBackedByStorage {
        /// Operation that was attempted.
        operation: String,
    },

    /// Two documents share an id.
    #[snafu(display("Duplicate document id {id:?}"))]
    DuplicateId {
        /// The repeated id.
        id: String,
    },

    /// A vector's length differs from `dense_model.dimension`.
    #[snafu(display(
        "Row {row} of {column} has {actual} dimensions, expected {expected}"
    ))]
    DimensionMismatch {
        /// Vector column checked.
        column: String,
        /// Zero-based row index.
        row: usize,
        /// Dimension declared in the metadata.
        expected: usize,
        /// Dimension found.
        actual: usize,
    },

    /// A row violates a record-level rule.
    #[snafu(display("Invalid record at row {row}: {message}"))]
    InvalidRecord {
        /// Zero-based row index.
        row: usize,
        /// What was wrong.
        message: String,
    },

    /// `load_dataset` was called before the catalog was listed.
    #[snafu(display("Catalog not initialized. List the catalog's datasets before loading one"))]
    CatalogNotInitialized,

    /// The identifier is not part of the loaded catalog.
    #[snafu(display("Dataset {id} not found in catalog at {base}"))]
    DatasetNotInCatalog {
        /// Requested identifier.
        id: String,
        /// Catalog base location.
        base: String,
    },
}
