//! Catalog of datasets below a common base location.
//!
//! A catalog base is any storage location whose immediate children are
//! dataset roots:
//!
//! ```text
//! <base>/
//!   <dataset-id>/metadata.json
//!   <dataset-id>/documents/*.parquet
//!   ...
//! ```
//!
//! [`Catalog`] is an explicit handle: it lists the base once, caches every
//! child's metadata, and only resolves identifiers it has seen.
use futures::StreamExt;
use log::{debug, warn};
use serde_json::Value;
use snafu::prelude::*;

use crate::config::{CatalogConfig, DatasetOptions};
use crate::dataset::Dataset;
use crate::error::{
    CatalogNotInitializedSnafu, DatasetError, DatasetNotInCatalogSnafu, DatasetResult,
    RecordEncodingSnafu, StorageSnafu,
};
use crate::metadata::DatasetMetadata;
use crate::storage::{Storage, StorageError, StorageLocation, layout};
use crate::table::DataTable;

/// A listed catalog entry: identifier and its metadata.
type Entry = (String, DatasetMetadata);

/// Handle over a catalog base location.
#[derive(Debug, Clone)]
pub struct Catalog {
    config: CatalogConfig,
    options: DatasetOptions,
    entries: Option<Vec<Entry>>,
}

/// Read and validate `<child>/metadata.json`, or explain why the child is
/// skipped.
async fn read_entry(storage: &Storage, child: String) -> Option<Entry> {
    let rel = layout::child_metadata_rel_path(&child);
    let path = storage.display_path(&rel);

    let json = match storage.read_to_string(&rel).await {
        Ok(json) => json,
        Err(e) => {
            warn!("Skipping catalog entry {child}: cannot read {path}: {e}");
            return None;
        }
    };

    let metadata = match DatasetMetadata::from_json(&json) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("Skipping catalog entry {child}: invalid metadata at {path}: {e}");
            return None;
        }
    };

    if let Err(e) = metadata.validate() {
        warn!("Skipping catalog entry {child}: {e}");
        return None;
    }
    if metadata.name != child {
        warn!(
            "Catalog entry {child} declares name {:?}; listing it under its directory name",
            metadata.name
        );
    }

    Some((child, metadata))
}

impl Catalog {
    /// An unloaded catalog handle.
    pub fn new(config: CatalogConfig, options: DatasetOptions) -> Self {
        Catalog {
            config,
            options,
            entries: None,
        }
    }

    /// Catalog at `explicit`, else `DATASETS_CATALOG_BASEPATH`, else the
    /// public default.
    pub fn from_env(explicit: Option<&str>, options: DatasetOptions) -> Self {
        Self::new(CatalogConfig::resolve(explicit), options)
    }

    /// The base path this catalog lists.
    pub fn base_path(&self) -> &str {
        &self.config.base_path
    }

    /// Whether the catalog has been listed.
    pub fn is_loaded(&self) -> bool {
        self.entries.is_some()
    }

    fn base_location(&self) -> DatasetResult<StorageLocation> {
        StorageLocation::parse(&self.config.base_path).context(StorageSnafu)
    }

    async fn scan(&self) -> DatasetResult<Vec<Entry>> {
        let base = self.base_location()?;
        let path = base.to_string();

        let storage = match Storage::connect_existing(base, &self.options.storage).await {
            Ok(storage) => storage,
            Err(source @ StorageError::NotFound { .. }) => {
                return Err(DatasetError::DatasetNotFound { path, source });
            }
            Err(source) => return Err(DatasetError::Storage { source }),
        };

        let children = storage.list_dirs("").await.context(StorageSnafu)?;
        debug!("catalog {path}: {} candidate dataset(s)", children.len());

        let storage = &storage;
        let entries: Vec<Option<Entry>> = futures::stream::iter(children)
            .then(move |child| read_entry(storage, child))
            .collect()
            .await;

        Ok(entries.into_iter().flatten().collect())
    }

    async fn loaded_entries(&mut self) -> DatasetResult<&[Entry]> {
        if self.entries.is_none() {
            self.entries = Some(self.scan().await?);
        }
        Ok(self.entries.as_deref().unwrap_or_default())
    }

    fn entries(&self) -> DatasetResult<&[Entry]> {
        self.entries
            .as_deref()
            .context(CatalogNotInitializedSnafu)
    }

    /// Identifiers of the datasets in the catalog, sorted by name.
    ///
    /// The base is listed on the first call only; use [`Catalog::reload`] to
    /// pick up changes.
    pub async fn list_datasets(&mut self) -> DatasetResult<Vec<String>> {
        Ok(self
            .loaded_entries()
            .await?
            .iter()
            .map(|(id, _)| id.clone())
            .collect())
    }

    /// One row per dataset: an `id` column holding the identifier accepted by
    /// [`Catalog::load_dataset`], then every metadata field as a column.
    pub async fn summary(&mut self) -> DatasetResult<DataTable> {
        let mut rows = Vec::new();
        for (id, metadata) in self.loaded_entries().await? {
            let mut row = serde_json::to_value(metadata).context(RecordEncodingSnafu)?;
            if let Value::Object(fields) = &mut row {
                fields.insert("id".to_string(), Value::String(id.clone()));
            }
            rows.push(row);
        }
        DataTable::from_json_rows(&rows)
    }

    /// Drop the cached listing and list the base again.
    pub async fn reload(&mut self) -> DatasetResult<Vec<String>> {
        self.entries = None;
        self.list_datasets().await
    }

    /// Cached metadata of a listed dataset.
    pub fn metadata(&self, id: &str) -> DatasetResult<&DatasetMetadata> {
        self.entries()?
            .iter()
            .find(|(entry_id, _)| entry_id == id)
            .map(|(_, metadata)| metadata)
            .context(DatasetNotInCatalogSnafu {
                id,
                base: self.config.base_path.clone(),
            })
    }

    /// Open a listed dataset, reading its metadata eagerly.
    ///
    /// Fails with `CatalogNotInitialized` when this handle was never listed
    /// and with `DatasetNotInCatalog` for unknown identifiers.
    pub async fn load_dataset(&self, id: &str) -> DatasetResult<Dataset> {
        self.metadata(id)?;
        let location = self.base_location()?.join(id);
        let options = self.options.clone().with_eager_metadata(true);
        Dataset::from_location(location, options).await
    }
}
