//! Row-level views and iteration helpers.
//!
//! Downstream consumers (an index upsert loop, a query benchmark) want rows
//! as key-value records rather than Arrow columns. This module provides:
//!
//! - [`Record`]: one row as a JSON object, null fields omitted.
//! - [`Document`] / [`Query`]: typed views of the canonical columns, with
//!   `TryFrom<Record>` conversions.
//! - [`RecordBatches`]: a lazy iterator yielding `batch_size` records at a
//!   time; only the rows of the current batch are converted.
//! - [`Records`]: the single-record flavor used for queries.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::prelude::*;

use crate::error::{DatasetError, DatasetResult, InvalidBatchSizeSnafu, RecordEncodingSnafu};
use crate::table::DataTable;

/// Columns kept when iterating documents, in output order.
pub const DOCUMENT_COLUMNS: &[&str] = &["id", "values", "sparse_values", "metadata", "blob"];

/// Columns kept when iterating queries, in output order.
pub const QUERY_COLUMNS: &[&str] = &["vector", "sparse_vector", "filter", "top_k", "blob"];

/// One table row as a JSON object.
pub type Record = Map<String, Value>;

/// Sparse vector: parallel `indices` / `values` arrays.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SparseValues {
    /// Dimension indices, in ascending order by convention.
    pub indices: Vec<u32>,
    /// Weights for each index.
    pub values: Vec<f32>,
}

impl SparseValues {
    /// True when both arrays have the same length.
    pub fn is_well_formed(&self) -> bool {
        self.indices.len() == self.values.len()
    }
}

/// A document: dense vector plus optional sparse vector, metadata and payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique id within the dataset.
    pub id: String,
    /// Dense embedding.
    pub values: Vec<f32>,
    /// Optional sparse embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_values: Option<SparseValues>,
    /// Optional free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Optional opaque payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<Value>,
}

/// A query: vector, optional sparse vector and filter, and a result count.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Query {
    /// Dense query vector.
    pub vector: Vec<f32>,
    /// Optional sparse query vector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_vector: Option<SparseValues>,
    /// Optional filter expression, for example `{"genre": {"$eq": "drama"}}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Map<String, Value>>,
    /// Number of results requested.
    pub top_k: u32,
    /// Optional opaque payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<Value>,
}

impl TryFrom<Record> for Document {
    type Error = DatasetError;

    fn try_from(record: Record) -> Result<Self, Self::Error> {
        serde_json::from_value(Value::Object(record)).context(RecordEncodingSnafu)
    }
}

impl TryFrom<Record> for Query {
    type Error = DatasetError;

    fn try_from(record: Record) -> Result<Self, Self::Error> {
        serde_json::from_value(Value::Object(record)).context(RecordEncodingSnafu)
    }
}

/// Validate a caller-supplied batch size.
///
/// Accepts any integer type so that `0` and negative values are reported as
/// `InvalidBatchSize` rather than failing to type-check.
pub fn batch_size_from<T>(batch_size: T) -> DatasetResult<usize>
where
    T: TryInto<usize> + Copy + std::fmt::Display,
{
    match batch_size.try_into() {
        Ok(n) if n > 0 => Ok(n),
        _ => InvalidBatchSizeSnafu {
            value: batch_size.to_string(),
        }
        .fail(),
    }
}

/// Lazy iterator over a table in batches of records.
///
/// Each item converts only its own rows, so memory stays proportional to
/// `batch_size`. The number of items is `ceil(rows / batch_size)`.
#[derive(Debug, Clone)]
pub struct RecordBatches {
    table: DataTable,
    batch_size: usize,
    offset: usize,
}

impl RecordBatches {
    /// Iterate `table` in batches of `batch_size` rows.
    ///
    /// Fails with `InvalidBatchSize` when `batch_size` is zero.
    pub fn new(table: DataTable, batch_size: usize) -> DatasetResult<Self> {
        let batch_size = batch_size_from(batch_size)?;
        Ok(RecordBatches {
            table,
            batch_size,
            offset: 0,
        })
    }

    /// Number of batches left to yield.
    pub fn remaining_batches(&self) -> usize {
        let rows_left = self.table.num_rows().saturating_sub(self.offset);
        rows_left.div_ceil(self.batch_size)
    }
}

impl Iterator for RecordBatches {
    type Item = DatasetResult<Vec<Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.table.num_rows() {
            return None;
        }
        let window = self.table.slice(self.offset, self.batch_size);
        self.offset += window.num_rows();
        Some(window.to_json_rows())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining_batches();
        (n, Some(n))
    }
}

impl ExactSizeIterator for RecordBatches {}

/// Lazy iterator yielding one record per row.
#[derive(Debug, Clone)]
pub struct Records {
    inner: RecordBatches,
}

impl Records {
    /// Iterate `table` one row at a time.
    pub fn new(table: DataTable) -> Self {
        Records {
            inner: RecordBatches {
                table,
                batch_size: 1,
                offset: 0,
            },
        }
    }
}

impl Iterator for Records {
    type Item = DatasetResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch = self.inner.next()?;
        Some(batch.and_then(|mut rows| {
            rows.pop().ok_or_else(|| DatasetError::InvalidArgument {
                message: "row conversion produced no record".to_string(),
            })
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Records {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn docs(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| Document {
                id: i.to_string(),
                values: vec![i as f32, 0.5],
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn batch_size_rejects_zero_and_negative() {
        assert!(matches!(
            batch_size_from(0),
            Err(DatasetError::InvalidBatchSize { .. })
        ));
        assert!(matches!(
            batch_size_from(-1),
            Err(DatasetError::InvalidBatchSize { ref value }) if value == "-1"
        ));
        assert_eq!(batch_size_from(7_i64).ok(), Some(7));
    }

    #[test]
    fn batches_cover_table_in_order() -> TestResult {
        let table = DataTable::from_serializable(&docs(7))?;
        let iter = RecordBatches::new(table, 3)?;
        assert_eq!(iter.len(), 3);

        let batches = iter.collect::<DatasetResult<Vec<_>>>()?;
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);

        let ids: Vec<&str> = batches
            .iter()
            .flatten()
            .filter_map(|r| r["id"].as_str())
            .collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4", "5", "6"]);
        Ok(())
    }

    #[test]
    fn empty_table_yields_nothing() -> TestResult {
        assert_eq!(RecordBatches::new(DataTable::empty(), 10)?.count(), 0);
        assert_eq!(Records::new(DataTable::empty()).count(), 0);
        Ok(())
    }

    #[test]
    fn records_convert_to_typed_rows() -> TestResult {
        let query = Query {
            vector: vec![0.25, 0.5],
            sparse_vector: Some(SparseValues {
                indices: vec![1, 4],
                values: vec![0.5, 0.25],
            }),
            filter: json!({"genre": {"$eq": "drama"}}).as_object().cloned(),
            top_k: 5,
            blob: None,
        };
        let table = DataTable::from_serializable(std::slice::from_ref(&query))?;

        let records = Records::new(table).collect::<DatasetResult<Vec<_>>>()?;
        assert_eq!(records.len(), 1);
        assert!(!records[0].contains_key("blob"));

        let back = Query::try_from(records[0].clone())?;
        assert_eq!(back, query);
        Ok(())
    }

    #[test]
    fn sparse_values_shape() {
        let ok = SparseValues {
            indices: vec![1, 2],
            values: vec![0.1, 0.2],
        };
        let bad = SparseValues {
            indices: vec![1],
            values: vec![],
        };
        assert!(ok.is_well_formed());
        assert!(!bad.is_well_formed());
    }
}
