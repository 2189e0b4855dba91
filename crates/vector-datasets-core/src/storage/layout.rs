//! On-disk layout helpers for a dataset root.
//!
//! ```text
//! <dataset_root>/
//!   documents/*.parquet
//!   queries/*.parquet        (optional)
//!   metadata.json
//! ```
//!
//! The functions here return paths relative to the dataset root, using `/`
//! separators on every platform since they are handed to the storage
//! operator rather than to the OS.

/// Directory holding the document parquet files.
pub const DOCUMENTS_DIR_NAME: &str = "documents";

/// Directory holding the query parquet files.
pub const QUERIES_DIR_NAME: &str = "queries";

/// Name of the metadata sidecar file.
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// File pattern matched inside a table directory.
pub const PARQUET_PATTERN: &str = "*.parquet";

/// Number of digits used in zero-padded part file names.
pub const PART_FILENAME_DIGITS: usize = 5;

/// Relative path: `<dir>/`
pub fn table_rel_dir(dir: &str) -> String {
    format!("{dir}/")
}

/// Relative glob: `<dir>/*.parquet`
pub fn table_rel_glob(dir: &str) -> String {
    format!("{dir}/{PARQUET_PATTERN}")
}

/// Relative path: `<dir>/part-<zero-padded>.parquet`
pub fn part_rel_path(dir: &str, part: usize) -> String {
    format!("{dir}/part-{:0width$}.parquet", part, width = PART_FILENAME_DIGITS)
}

/// Relative path: `metadata.json`
pub fn metadata_rel_path() -> &'static str {
    METADATA_FILE_NAME
}

/// Relative path of a child's metadata file: `<child>/metadata.json`
pub fn child_metadata_rel_path(child: &str) -> String {
    format!("{child}/{METADATA_FILE_NAME}")
}
