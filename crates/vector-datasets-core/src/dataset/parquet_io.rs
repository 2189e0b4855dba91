//! Parquet read/write for dataset tables.
//!
//! Reading follows a two-step flow per table directory:
//! 1. Fetch every matched file and open a reader over the in-memory bytes,
//!    summing the row counts recorded in the parquet footers. If the total
//!    exceeds the caller's cap we fail before decoding a single row.
//! 2. Decode all record batches, in file order. Parts written at different
//!    times may carry different columns or nested keys; their schemas are
//!    merged and missing values read as nulls.
//!
//! Writing encodes a whole table into a single parquet part file.
use arrow::array::{RecordBatch, RecordBatchReader};
use log::debug;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use snafu::prelude::*;

use crate::error::{
    ArrowSnafu, CapacityExceededSnafu, DatasetResult, ParquetReadSnafu, ParquetWriteSnafu,
    StorageSnafu,
};
use crate::storage::Storage;
use crate::table::DataTable;

/// Read and concatenate the parquet files at `files` (relative to `storage`).
///
/// `table_path` is only used in error messages.
pub(crate) async fn read_parquet_files(
    storage: &Storage,
    table_path: &str,
    files: &[String],
    max_rows: u64,
) -> DatasetResult<DataTable> {
    let mut builders = Vec::with_capacity(files.len());
    let mut total_rows: u64 = 0;

    for rel in files {
        let bytes = storage.read(rel).await.context(StorageSnafu)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes).context(ParquetReadSnafu {
            path: storage.display_path(rel),
        })?;

        let file_rows = u64::try_from(builder.metadata().file_metadata().num_rows()).unwrap_or(0);
        total_rows = total_rows.saturating_add(file_rows);
        ensure!(
            total_rows <= max_rows,
            CapacityExceededSnafu {
                path: table_path.to_string(),
                rows: total_rows,
                limit: max_rows,
            }
        );

        debug!("{}: {file_rows} row(s)", storage.display_path(rel));
        builders.push((rel, builder));
    }

    let mut parts = Vec::with_capacity(builders.len());
    for (rel, builder) in builders {
        let reader = builder.build().context(ParquetReadSnafu {
            path: storage.display_path(rel),
        })?;
        let schema = reader.schema();
        let batches = reader
            .collect::<Result<Vec<RecordBatch>, _>>()
            .context(ArrowSnafu)?;
        parts.push(DataTable::try_new(schema, batches)?);
    }

    DataTable::merge(parts)
}

/// Encode `table` as a single parquet file.
pub(crate) fn encode_parquet(table: &DataTable, path_for_errors: &str) -> DatasetResult<Vec<u8>> {
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, table.schema(), None).context(
        ParquetWriteSnafu {
            path: path_for_errors.to_string(),
        },
    )?;

    for batch in table.batches() {
        writer.write(batch).context(ParquetWriteSnafu {
            path: path_for_errors.to_string(),
        })?;
    }

    writer.close().context(ParquetWriteSnafu {
        path: path_for_errors.to_string(),
    })?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageOptions;
    use crate::error::DatasetError;
    use crate::storage::StorageLocation;
    use serde_json::json;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    async fn storage_with_parts(tmp: &TempDir, parts: &[usize]) -> Result<Storage, Box<dyn std::error::Error>> {
        let storage = Storage::connect(StorageLocation::local(tmp.path()), &StorageOptions::new()).await?;
        let mut next_id = 0;
        for (i, rows) in parts.iter().enumerate() {
            let json_rows: Vec<_> = (0..*rows)
                .map(|_| {
                    next_id += 1;
                    json!({"id": next_id.to_string(), "values": [0.5, 0.25]})
                })
                .collect();
            let table = DataTable::from_json_rows(&json_rows)?;
            let rel = format!("documents/part-{i}.parquet");
            storage.write(&rel, encode_parquet(&table, &rel)?).await?;
        }
        Ok(storage)
    }

    #[tokio::test]
    async fn reads_all_parts_in_order() -> TestResult {
        let tmp = TempDir::new()?;
        let storage = storage_with_parts(&tmp, &[2, 3]).await?;
        let files = storage.glob("documents/*.parquet").await?;

        let table = read_parquet_files(&storage, "documents", &files, 100).await?;
        assert_eq!(table.num_rows(), 5);
        let ids: Vec<String> = table
            .to_json_rows()?
            .iter()
            .filter_map(|r| r["id"].as_str().map(str::to_string))
            .collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
        Ok(())
    }

    #[tokio::test]
    async fn row_cap_is_enforced_from_footers() -> TestResult {
        let tmp = TempDir::new()?;
        let storage = storage_with_parts(&tmp, &[2, 3]).await?;
        let files = storage.glob("documents/*.parquet").await?;

        let err = read_parquet_files(&storage, "documents", &files, 4)
            .await
            .expect_err("5 rows exceed a cap of 4");
        assert!(matches!(
            err,
            DatasetError::CapacityExceeded { rows: 5, limit: 4, .. }
        ));

        // Exactly at the cap is fine.
        assert_eq!(read_parquet_files(&storage, "documents", &files, 5).await?.num_rows(), 5);
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_file_reports_parquet_error() -> TestResult {
        let tmp = TempDir::new()?;
        let storage = Storage::connect(StorageLocation::local(tmp.path()), &StorageOptions::new()).await?;
        storage.write("documents/bad.parquet", b"not parquet".to_vec()).await?;

        let files = storage.glob("documents/*.parquet").await?;
        let err = read_parquet_files(&storage, "documents", &files, 100)
            .await
            .expect_err("garbage is not parquet");
        assert!(matches!(err, DatasetError::ParquetRead { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn parts_with_drifting_metadata_keys_are_merged() -> TestResult {
        let tmp = TempDir::new()?;
        let storage = Storage::connect(StorageLocation::local(tmp.path()), &StorageOptions::new()).await?;

        let older = DataTable::from_json_rows(&[
            json!({"id": "1", "values": [0.5, 0.25], "metadata": {"title": "a"}}),
        ])?;
        let newer = DataTable::from_json_rows(&[
            json!({"id": "2", "values": [0.5, 0.25], "metadata": {"title": "b", "url": "http://b"}}),
            json!({"id": "3", "values": [0.5, 0.25], "metadata": {"title": "c", "url": "http://c"}}),
        ])?;
        for (rel, table) in [
            ("documents/part-00000.parquet", &older),
            ("documents/part-00001.parquet", &newer),
        ] {
            storage.write(rel, encode_parquet(table, rel)?).await?;
        }

        let files = storage.glob("documents/*.parquet").await?;
        let table = read_parquet_files(&storage, "documents", &files, 100).await?;
        assert_eq!(table.num_rows(), 3);

        let rows = table.to_json_rows()?;
        assert_eq!(rows[0]["metadata"], json!({"title": "a"}));
        assert_eq!(rows[1]["metadata"], json!({"title": "b", "url": "http://b"}));
        assert_eq!(rows[2]["id"], "3");
        Ok(())
    }

    #[tokio::test]
    async fn parts_with_conflicting_column_types_are_rejected() -> TestResult {
        let tmp = TempDir::new()?;
        let storage = Storage::connect(StorageLocation::local(tmp.path()), &StorageOptions::new()).await?;

        let text = DataTable::from_json_rows(&[json!({"id": "1", "values": [0.5]})])?;
        let number = DataTable::from_json_rows(&[json!({"id": 2, "values": [0.5]})])?;
        for (rel, table) in [("documents/a.parquet", &text), ("documents/b.parquet", &number)] {
            storage.write(rel, encode_parquet(table, rel)?).await?;
        }

        let files = storage.glob("documents/*.parquet").await?;
        let err = read_parquet_files(&storage, "documents", &files, 100)
            .await
            .expect_err("id is a string in one part and an integer in the other");
        assert!(matches!(err, DatasetError::SchemaMismatch { .. }));
        Ok(())
    }
}
