//! The `Dataset` accessor.
//!
//! A dataset is opened from a path or URI (or built from in-memory tables)
//! and exposes three lazily loaded values:
//!
//! - `documents()` / `queries()`: every parquet file under `documents/` or
//!   `queries/`, materialized into a [`DataTable`]. A missing directory is an
//!   expected absence (queries are optional): it logs a warning and yields an
//!   empty table. A table larger than `DatasetOptions::max_rows` is an error.
//! - `metadata()`: the validated `metadata.json` sidecar.
//!
//! Each value is loaded at most once per instance and cached in a
//! `tokio::sync::OnceCell`; [`Dataset::invalidate`] drops the caches of a
//! storage-backed dataset so the next access re-reads storage.
mod parquet_io;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use arrow::array::AsArray;
use arrow::compute::cast;
use arrow::datatypes::DataType;
use log::{debug, warn};
use snafu::prelude::*;
use tokio::sync::OnceCell;

use crate::config::{CatalogConfig, DatasetOptions, StorageOptions};
use crate::error::{
    ArrowSnafu, DatasetError, DatasetResult, DimensionMismatchSnafu, DuplicateIdSnafu,
    InvalidArgumentSnafu, InvalidMetadataSnafu, InvalidRecordSnafu, MetadataParseSnafu,
    NameMismatchSnafu, NotBackedByStorageSnafu, RecordEncodingSnafu, StorageSnafu,
    UnknownTableSnafu,
};
use crate::metadata::{DatasetMetadata, DenseModelMetadata};
use crate::records::{
    DOCUMENT_COLUMNS, Document, QUERY_COLUMNS, Query, RecordBatches, Records, SparseValues,
    batch_size_from,
};
use crate::storage::{Storage, StorageError, StorageLocation, layout};
use crate::table::DataTable;

/// Rows converted per step when validating sparse vectors.
const VALIDATION_BATCH_ROWS: usize = 10_000;

/// Which of the two tables of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// The `documents/` table.
    Documents,
    /// The `queries/` table.
    Queries,
}

impl TableKind {
    /// Directory name under the dataset root.
    pub fn dir_name(self) -> &'static str {
        match self {
            TableKind::Documents => layout::DOCUMENTS_DIR_NAME,
            TableKind::Queries => layout::QUERIES_DIR_NAME,
        }
    }

    /// Canonical columns kept when iterating this table.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            TableKind::Documents => DOCUMENT_COLUMNS,
            TableKind::Queries => QUERY_COLUMNS,
        }
    }

    /// Name of the dense vector column.
    pub fn vector_column(self) -> &'static str {
        match self {
            TableKind::Documents => "values",
            TableKind::Queries => "vector",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for TableKind {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            layout::DOCUMENTS_DIR_NAME => Ok(TableKind::Documents),
            layout::QUERIES_DIR_NAME => Ok(TableKind::Queries),
            other => UnknownTableSnafu {
                key: other.to_string(),
            }
            .fail(),
        }
    }
}

#[derive(Debug)]
enum Backing {
    Storage(Storage),
    Memory,
}

/// A dataset of documents, queries and metadata.
#[derive(Debug)]
pub struct Dataset {
    backing: Backing,
    options: DatasetOptions,
    documents: OnceCell<DataTable>,
    queries: OnceCell<DataTable>,
    metadata: OnceCell<DatasetMetadata>,
}

async fn load_table(storage: &Storage, kind: TableKind, max_rows: u64) -> DatasetResult<DataTable> {
    let dir = kind.dir_name();
    let read_path = storage.display_path(&layout::table_rel_dir(dir));

    let files = storage
        .glob(&layout::table_rel_glob(dir))
        .await
        .context(StorageSnafu)?;

    if files.is_empty() {
        warn!("No data found at: {read_path}. Returning empty table");
        return Ok(DataTable::empty());
    }

    debug!("loading {} file(s) from {read_path}", files.len());
    parquet_io::read_parquet_files(storage, &read_path, &files, max_rows).await
}

async fn load_metadata(storage: &Storage) -> DatasetResult<DatasetMetadata> {
    let rel = layout::metadata_rel_path();
    let path = storage.display_path(rel);

    let json = match storage.read_to_string(rel).await {
        Ok(s) => s,
        Err(source @ StorageError::NotFound { .. }) => {
            return Err(DatasetError::MetadataNotFound { path, source });
        }
        Err(source) => return Err(DatasetError::Storage { source }),
    };

    let metadata = DatasetMetadata::from_json(&json).context(MetadataParseSnafu { path })?;
    metadata.validate().context(InvalidMetadataSnafu {
        name: metadata.name.clone(),
    })?;
    Ok(metadata)
}

fn generated_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() ^ (d.as_secs() as u32))
        .unwrap_or_default();
    format!("dataset_{nanos:08x}")
}

fn check_unique_ids(documents: &DataTable) -> DatasetResult<()> {
    let Ok(idx) = documents.schema().index_of("id") else {
        return Ok(());
    };

    let mut seen = HashSet::with_capacity(documents.num_rows());
    for batch in documents.batches() {
        let ids = cast(batch.column(idx), &DataType::Utf8).context(ArrowSnafu)?;
        for id in ids.as_string::<i32>().iter().flatten() {
            ensure!(seen.insert(id.to_string()), DuplicateIdSnafu { id });
        }
    }
    Ok(())
}

fn check_dimensions(table: &DataTable, kind: TableKind, expected: usize) -> DatasetResult<()> {
    if table.is_empty() {
        return Ok(());
    }

    let column = kind.vector_column();
    let lengths = table.vector_lengths(column).context(InvalidArgumentSnafu {
        message: format!("{kind} table has no list-typed {column:?} column"),
    })?;

    for (row, len) in lengths.into_iter().enumerate() {
        let Some(actual) = len else {
            return InvalidRecordSnafu {
                row,
                message: format!("{kind} row has a null {column:?} vector"),
            }
            .fail();
        };
        ensure!(
            actual == expected,
            DimensionMismatchSnafu {
                column,
                row,
                expected,
                actual,
            }
        );
    }
    Ok(())
}

fn check_sparse(table: &DataTable, column: &str) -> DatasetResult<()> {
    if !table.has_column(column) {
        return Ok(());
    }

    let projected = table.select(&[column])?;
    let mut row: usize = 0;
    for batch in RecordBatches::new(projected, VALIDATION_BATCH_ROWS)? {
        for record in batch? {
            if let Some(value) = record.get(column) {
                let sparse: SparseValues =
                    serde_json::from_value(value.clone()).context(RecordEncodingSnafu)?;
                ensure!(
                    sparse.is_well_formed(),
                    InvalidRecordSnafu {
                        row,
                        message: format!(
                            "{column} has {} indices but {} values",
                            sparse.indices.len(),
                            sparse.values.len()
                        ),
                    }
                );
            }
            row += 1;
        }
    }
    Ok(())
}

impl Dataset {
    /// Open a dataset from a local path or an `s3://` / `gs://` URI.
    ///
    /// Fails with `DatasetNotFound` if nothing exists at the path and with a
    /// `Storage` error for unsupported schemes. No table is read.
    pub async fn from_path(path: &str, options: DatasetOptions) -> DatasetResult<Self> {
        let location = StorageLocation::parse(path).context(StorageSnafu)?;
        Self::from_location(location, options).await
    }

    /// Open a dataset from an already parsed location.
    pub async fn from_location(
        location: StorageLocation,
        options: DatasetOptions,
    ) -> DatasetResult<Self> {
        let path = location.to_string();
        let storage = match Storage::connect_existing(location, &options.storage).await {
            Ok(storage) => storage,
            Err(source @ StorageError::NotFound { .. }) => {
                return Err(DatasetError::DatasetNotFound { path, source });
            }
            Err(source) => return Err(DatasetError::Storage { source }),
        };

        let dataset = Dataset {
            backing: Backing::Storage(storage),
            options,
            documents: OnceCell::new(),
            queries: OnceCell::new(),
            metadata: OnceCell::new(),
        };

        if dataset.options.eager_metadata {
            dataset.metadata().await?;
        }
        Ok(dataset)
    }

    /// Open dataset `id` from a catalog base path.
    ///
    /// `base` falls back to `DATASETS_CATALOG_BASEPATH` and then to the public
    /// catalog, exactly like [`CatalogConfig::resolve`].
    pub async fn from_catalog(
        id: &str,
        base: Option<&str>,
        options: DatasetOptions,
    ) -> DatasetResult<Self> {
        let config = CatalogConfig::resolve(base);
        let base = StorageLocation::parse(&config.base_path).context(StorageSnafu)?;
        Self::from_location(base.join(id), options).await
    }

    /// Build an in-memory dataset.
    ///
    /// Missing `queries` become an empty table. Missing `metadata` is
    /// generated: a `dataset_<hex>` name, the current time, row counts of the
    /// tables and the dimension of the first document vector.
    pub fn from_tables(
        documents: DataTable,
        queries: Option<DataTable>,
        metadata: Option<DatasetMetadata>,
    ) -> DatasetResult<Self> {
        let queries = queries.unwrap_or_default();

        let metadata = match metadata {
            Some(metadata) => metadata,
            None => {
                let dimension = documents
                    .vector_dimension(TableKind::Documents.vector_column())
                    .and_then(|d| u32::try_from(d).ok())
                    .filter(|d| *d > 0)
                    .context(InvalidArgumentSnafu {
                        message: "cannot infer the dense dimension from the documents table; \
                                  pass metadata explicitly"
                            .to_string(),
                    })?;
                DatasetMetadata::new(
                    generated_name(),
                    documents.num_rows() as u64,
                    queries.num_rows() as u64,
                    DenseModelMetadata {
                        name: "unknown".to_string(),
                        tokenizer: None,
                        dimension,
                    },
                )
            }
        };

        Ok(Dataset {
            backing: Backing::Memory,
            options: DatasetOptions::default(),
            documents: OnceCell::new_with(Some(documents)),
            queries: OnceCell::new_with(Some(queries)),
            metadata: OnceCell::new_with(Some(metadata)),
        })
    }

    /// Build an in-memory dataset from typed rows.
    pub fn from_records(
        documents: &[Document],
        queries: &[Query],
        metadata: Option<DatasetMetadata>,
    ) -> DatasetResult<Self> {
        let documents = DataTable::from_serializable(documents)?;
        let queries = DataTable::from_serializable(queries)?;
        Self::from_tables(documents, Some(queries), metadata)
    }

    /// Storage location, or `None` for in-memory datasets.
    pub fn location(&self) -> Option<&StorageLocation> {
        match &self.backing {
            Backing::Storage(storage) => Some(storage.location()),
            Backing::Memory => None,
        }
    }

    /// Whether this dataset was built from in-memory tables.
    pub fn is_in_memory(&self) -> bool {
        matches!(self.backing, Backing::Memory)
    }

    /// Options the dataset was opened with.
    pub fn options(&self) -> &DatasetOptions {
        &self.options
    }

    fn cell(&self, kind: TableKind) -> &OnceCell<DataTable> {
        match kind {
            TableKind::Documents => &self.documents,
            TableKind::Queries => &self.queries,
        }
    }

    /// The table of the given kind, loading it on first access.
    pub async fn table(&self, kind: TableKind) -> DatasetResult<&DataTable> {
        self.cell(kind)
            .get_or_try_init(|| async {
                match &self.backing {
                    Backing::Storage(storage) => {
                        load_table(storage, kind, self.options.max_rows).await
                    }
                    Backing::Memory => NotBackedByStorageSnafu {
                        operation: format!("load {kind}"),
                    }
                    .fail(),
                }
            })
            .await
    }

    /// The documents table, loading it on first access.
    pub async fn documents(&self) -> DatasetResult<&DataTable> {
        self.table(TableKind::Documents).await
    }

    /// The queries table, loading it on first access.
    pub async fn queries(&self) -> DatasetResult<&DataTable> {
        self.table(TableKind::Queries).await
    }

    /// The dataset metadata, loading and validating it on first access.
    pub async fn metadata(&self) -> DatasetResult<&DatasetMetadata> {
        self.metadata
            .get_or_try_init(|| async {
                match &self.backing {
                    Backing::Storage(storage) => load_metadata(storage).await,
                    Backing::Memory => NotBackedByStorageSnafu {
                        operation: "load metadata",
                    }
                    .fail(),
                }
            })
            .await
    }

    /// Iterate documents in batches of `batch_size` records.
    ///
    /// Only the canonical document columns are kept. Every call starts from
    /// the first row. Fails with `InvalidBatchSize` unless `batch_size` is a
    /// positive integer; the check happens before any data is loaded.
    pub async fn iter_documents<T>(&self, batch_size: T) -> DatasetResult<RecordBatches>
    where
        T: TryInto<usize> + Copy + fmt::Display,
    {
        let batch_size = batch_size_from(batch_size)?;
        let table = self.documents().await?.select(DOCUMENT_COLUMNS)?;
        RecordBatches::new(table, batch_size)
    }

    /// Iterate queries one record at a time, canonical columns only.
    pub async fn iter_queries(&self) -> DatasetResult<Records> {
        let table = self.queries().await?.select(QUERY_COLUMNS)?;
        Ok(Records::new(table))
    }

    /// Number of documents (loads the documents table).
    pub async fn len(&self) -> DatasetResult<usize> {
        Ok(self.documents().await?.num_rows())
    }

    /// Whether the documents table is empty (loads it).
    pub async fn is_empty(&self) -> DatasetResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// The first `n` document rows.
    pub async fn head(&self, n: usize) -> DatasetResult<DataTable> {
        Ok(self.documents().await?.head(n))
    }

    /// Drop every cached value so the next access reloads from storage.
    ///
    /// In-memory datasets have nothing to reload and fail with
    /// `NotBackedByStorage`.
    pub fn invalidate(&mut self) -> DatasetResult<()> {
        ensure!(
            !self.is_in_memory(),
            NotBackedByStorageSnafu {
                operation: "invalidate cached tables",
            }
        );
        self.documents.take();
        self.queries.take();
        self.metadata.take();
        Ok(())
    }

    /// Write metadata to `metadata.json` and replace the cached value.
    pub async fn save_metadata(&mut self, metadata: DatasetMetadata) -> DatasetResult<()> {
        let Backing::Storage(storage) = &self.backing else {
            return NotBackedByStorageSnafu {
                operation: "save metadata",
            }
            .fail();
        };

        metadata.validate().context(InvalidMetadataSnafu {
            name: metadata.name.clone(),
        })?;
        let json = metadata.to_json().context(RecordEncodingSnafu)?;
        storage
            .write(layout::metadata_rel_path(), json.into_bytes())
            .await
            .context(StorageSnafu)?;

        self.metadata = OnceCell::new_with(Some(metadata));
        Ok(())
    }

    /// Persist tables and metadata under `path`.
    ///
    /// The last segment of `path` must equal `metadata.name`; otherwise this
    /// fails with `NameMismatch` before anything is created. Parquet parts
    /// already present under `documents/` and `queries/` are deleted first,
    /// so a smaller save is not mixed with an earlier, larger one. Empty
    /// tables are not written, so reloading yields the usual empty-table
    /// warning.
    pub async fn persist(&self, path: &str, storage_options: &StorageOptions) -> DatasetResult<()> {
        let location = StorageLocation::parse(path).context(StorageSnafu)?;
        let metadata = self.metadata().await?;

        ensure!(
            location.file_name() == Some(metadata.name.as_str()),
            NameMismatchSnafu {
                path: location.to_string(),
                name: metadata.name.clone(),
            }
        );

        let documents = self.documents().await?;
        let queries = self.queries().await?;

        let storage = Storage::connect(location, storage_options)
            .await
            .context(StorageSnafu)?;

        for (kind, table) in [(TableKind::Documents, documents), (TableKind::Queries, queries)] {
            let stale = storage
                .glob(&layout::table_rel_glob(kind.dir_name()))
                .await
                .context(StorageSnafu)?;
            for rel in &stale {
                storage.delete(rel).await.context(StorageSnafu)?;
            }

            if table.is_empty() {
                debug!("skipping empty {kind} table");
                continue;
            }
            let rel = layout::part_rel_path(kind.dir_name(), 0);
            let bytes = parquet_io::encode_parquet(table, &storage.display_path(&rel))?;
            storage.write(&rel, bytes).await.context(StorageSnafu)?;
        }

        let json = metadata.to_json().context(RecordEncodingSnafu)?;
        storage
            .write(layout::metadata_rel_path(), json.into_bytes())
            .await
            .context(StorageSnafu)?;
        Ok(())
    }

    /// Check record-level invariants.
    ///
    /// - document ids are unique;
    /// - every document and query vector has `dense_model.dimension` entries;
    /// - sparse vectors have as many indices as values.
    pub async fn validate(&self) -> DatasetResult<()> {
        let expected = self.metadata().await?.dense_model.dimension as usize;
        let documents = self.documents().await?;
        let queries = self.queries().await?;

        check_unique_ids(documents)?;
        check_dimensions(documents, TableKind::Documents, expected)?;
        check_dimensions(queries, TableKind::Queries, expected)?;
        check_sparse(documents, "sparse_values")?;
        check_sparse(queries, "sparse_vector")?;
        Ok(())
    }
}
