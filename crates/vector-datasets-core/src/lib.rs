//! Core accessors for parquet-backed vector search datasets.
//!
//! A dataset is a directory (local, `s3://` or `gs://`) laid out as:
//!
//! ```text
//! <dataset_root>/
//!   documents/*.parquet
//!   queries/*.parquet        (optional)
//!   metadata.json
//! ```
//!
//! This crate provides:
//!
//! - Strongly-typed, validated dataset metadata (`metadata` module).
//! - A storage resolver that maps a path or URI to an `opendal`-backed
//!   handle with existence checks, globbing and read/write (`storage`).
//! - An in-memory Arrow table wrapper (`table`) and helpers that turn rows
//!   into key-value records for downstream upserts and queries (`records`).
//! - The `Dataset` accessor with lazily loaded, memoized tables (`dataset`).
//! - A `Catalog` handle that lists datasets below a base location and
//!   resolves identifiers into datasets (`catalog`).
//!
//! Higher-level tools (for example the `vdatasets` CLI) depend on this crate
//! rather than talking to storage directly.
#![deny(missing_docs)]
pub mod catalog;
pub mod config;
pub mod dataset;
pub mod error;
pub mod metadata;
pub mod records;
pub mod storage;
pub mod table;

pub use catalog::Catalog;
pub use config::{CatalogConfig, DatasetOptions, StorageOptions};
pub use dataset::{Dataset, TableKind};
pub use error::{DatasetError, DatasetResult};
pub use metadata::{DatasetMetadata, DenseModelMetadata, SparseModelMetadata};
pub use records::{Document, Query, Record, RecordBatches, SparseValues};
pub use storage::{Storage, StorageError, StorageLocation};
pub use table::DataTable;
