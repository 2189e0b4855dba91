//! Caller-supplied configuration.
//!
//! - [`StorageOptions`]: backend options (region, endpoint, credentials, ...)
//!   passed through verbatim to the storage backend.
//! - [`DatasetOptions`]: per-dataset loading knobs.
//! - [`CatalogConfig`]: where the catalog lives, resolved from an explicit
//!   argument, then the `DATASETS_CATALOG_BASEPATH` environment variable,
//!   then the public default.
use std::collections::BTreeMap;
use std::env;

/// Environment variable consulted for the catalog base path.
pub const CATALOG_BASE_PATH_ENV: &str = "DATASETS_CATALOG_BASEPATH";

/// Public catalog used when nothing else is configured.
pub const DEFAULT_CATALOG_BASE_PATH: &str = "gs://pinecone-datasets-dev";

/// Row cap applied when materializing a table in memory.
pub const DEFAULT_MAX_ROWS: u64 = 10_000_000;

/// Opaque key/value options handed to the storage backend.
///
/// Keys follow the backend's own configuration names, for example `region`,
/// `endpoint`, `access_key_id` for S3 or `credential_path` for GCS. The
/// storage resolver never interprets them beyond overriding `root`/`bucket`.
pub type StorageOptions = BTreeMap<String, String>;

/// Options controlling how a [`crate::Dataset`] is opened and loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetOptions {
    /// Backend options forwarded to storage.
    pub storage: StorageOptions,
    /// Maximum number of rows a single table may hold once loaded.
    pub max_rows: u64,
    /// Load and validate `metadata.json` while opening the dataset.
    pub eager_metadata: bool,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        DatasetOptions {
            storage: StorageOptions::new(),
            max_rows: DEFAULT_MAX_ROWS,
            eager_metadata: false,
        }
    }
}

impl DatasetOptions {
    /// Add a single storage option.
    pub fn with_storage_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.storage.insert(key.into(), value.into());
        self
    }

    /// Replace the row cap.
    pub fn with_max_rows(mut self, max_rows: u64) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Toggle eager metadata loading.
    pub fn with_eager_metadata(mut self, eager: bool) -> Self {
        self.eager_metadata = eager;
        self
    }
}

/// Location of a dataset catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Base path or URI under which every dataset is a child directory.
    pub base_path: String,
}

impl CatalogConfig {
    /// Use `base_path` as-is.
    pub fn new(base_path: impl Into<String>) -> Self {
        CatalogConfig {
            base_path: base_path.into(),
        }
    }

    /// Resolve the base path from the process environment.
    ///
    /// Precedence: non-empty `explicit`, then [`CATALOG_BASE_PATH_ENV`], then
    /// [`DEFAULT_CATALOG_BASE_PATH`].
    pub fn resolve(explicit: Option<&str>) -> Self {
        Self::resolve_with(explicit, |key| env::var(key).ok())
    }

    /// Like [`CatalogConfig::resolve`] but with a caller-supplied variable lookup.
    pub fn resolve_with<F>(explicit: Option<&str>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_path = explicit
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .or_else(|| lookup(CATALOG_BASE_PATH_ENV).filter(|s| !s.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_CATALOG_BASE_PATH.to_string());
        CatalogConfig { base_path }
    }
}
