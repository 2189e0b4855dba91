//! In-memory Arrow tables.
//!
//! [`DataTable`] is the materialized form of a documents or queries table: a
//! schema plus the record batches decoded from every parquet file of that
//! table, in file order. It is deliberately small; anything heavier (joins,
//! filters, SQL) belongs to an external engine that can consume the batches.
//!
//! Conversions to and from JSON go through `arrow::json`, so nested vectors,
//! sparse-vector structs and metadata objects survive both directions.
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, RecordBatch, RecordBatchOptions, StructArray, new_null_array,
};
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::{DataType, Field, Fields, Schema, SchemaRef};
use arrow::json::reader::infer_json_schema_from_iterator;
use arrow::json::{ArrayWriter, ReaderBuilder};
use serde::Serialize;
use serde_json::{Map, Value};
use snafu::prelude::*;

use crate::error::{ArrowSnafu, DatasetError, DatasetResult, RecordEncodingSnafu, SchemaMismatchSnafu};

/// A materialized table: one schema, zero or more batches.
#[derive(Debug, Clone)]
pub struct DataTable {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Default for DataTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for DataTable {
    fn eq(&self, other: &Self) -> bool {
        // Batch boundaries are an artifact of how the table was read.
        if self.schema != other.schema || self.num_rows() != other.num_rows() {
            return false;
        }
        match (self.concat(), other.concat()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl DataTable {
    /// A table with no columns and no rows.
    pub fn empty() -> Self {
        DataTable {
            schema: Arc::new(Schema::empty()),
            batches: Vec::new(),
        }
    }

    /// Build a table from batches that all share `schema`.
    ///
    /// Fails with `SchemaMismatch` if any batch disagrees with `schema`.
    pub fn try_new(schema: SchemaRef, batches: Vec<RecordBatch>) -> DatasetResult<Self> {
        for batch in &batches {
            ensure!(
                batch.schema().fields() == schema.fields(),
                SchemaMismatchSnafu {
                    expected: format!("{schema:?}"),
                    found: format!("{:?}", batch.schema()),
                }
            );
        }
        Ok(DataTable { schema, batches })
    }

    /// Build a table from batches, taking the schema of the first one.
    pub fn from_batches(batches: Vec<RecordBatch>) -> DatasetResult<Self> {
        match batches.first() {
            Some(first) => Self::try_new(first.schema(), batches),
            None => Ok(Self::empty()),
        }
    }

    /// Concatenate tables whose schemas may differ.
    ///
    /// Parts that agree on their fields are chained as-is. Otherwise the
    /// schemas are merged by name (struct children included), every field
    /// becomes nullable, and each batch is aligned to the merged schema with
    /// nulls for the columns it lacks. Fails with `SchemaMismatch` when two
    /// parts give the same field incompatible types.
    pub fn merge(parts: Vec<DataTable>) -> DatasetResult<Self> {
        let Some(first) = parts.first() else {
            return Ok(Self::empty());
        };
        let first_schema = first.schema.clone();

        if parts.iter().all(|p| p.schema.fields() == first_schema.fields()) {
            let batches = parts.into_iter().flat_map(|p| p.batches).collect();
            return Self::try_new(first_schema, batches);
        }

        let merged = Schema::try_merge(
            parts
                .iter()
                .map(|p| Schema::new(p.schema.fields().clone())),
        )
        .map_err(|e| DatasetError::SchemaMismatch {
            expected: format!("{first_schema:?}"),
            found: e.to_string(),
        })?;
        let merged: Fields = merged.fields().iter().map(|f| nullable_field(f)).collect();
        let schema = Arc::new(Schema::new(merged));

        let mut batches = Vec::new();
        for part in parts {
            for batch in &part.batches {
                batches.push(align_batch(batch, &schema)?);
            }
        }
        Self::try_new(schema, batches)
    }

    /// Build a table from JSON objects, inferring the schema from the rows.
    ///
    /// Vectors become lists, nested objects become structs, and keys absent
    /// from some rows become nullable columns. A key holding scalars of
    /// different JSON types across rows becomes a string column.
    pub fn from_json_rows(rows: &[Value]) -> DatasetResult<Self> {
        if rows.is_empty() {
            return Ok(Self::empty());
        }

        let schema = infer_json_schema_from_iterator(rows.iter().map(Ok)).context(ArrowSnafu)?;
        let schema = Arc::new(schema);

        let mut decoder = ReaderBuilder::new(schema.clone())
            .with_batch_size(rows.len())
            .with_coerce_primitive(true)
            .build_decoder()
            .context(ArrowSnafu)?;
        decoder.serialize(rows).context(ArrowSnafu)?;

        let batches = decoder.flush().context(ArrowSnafu)?.into_iter().collect();
        Self::try_new(schema, batches)
    }

    /// Build a table from any serializable rows (typed documents or queries).
    pub fn from_serializable<T: Serialize>(rows: &[T]) -> DatasetResult<Self> {
        let values = rows
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .context(RecordEncodingSnafu)?;
        Self::from_json_rows(&values)
    }

    /// The table schema.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// The underlying batches, in load order.
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Total number of rows.
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// True when the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<&str> {
        self.schema.fields().iter().map(|f| f.name().as_str()).collect()
    }

    /// Whether a column with this name exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.schema.index_of(name).is_ok()
    }

    /// All rows as a single batch.
    pub fn concat(&self) -> DatasetResult<RecordBatch> {
        concat_batches(&self.schema, &self.batches).context(ArrowSnafu)
    }

    /// Rows `[offset, offset + len)` (clamped to the table), without copying data.
    pub fn slice(&self, offset: usize, len: usize) -> DataTable {
        let mut out = Vec::new();
        let mut skip = offset;
        let mut remaining = len;

        for batch in &self.batches {
            if remaining == 0 {
                break;
            }
            let rows = batch.num_rows();
            if skip >= rows {
                skip -= rows;
                continue;
            }
            let take = (rows - skip).min(remaining);
            out.push(batch.slice(skip, take));
            remaining -= take;
            skip = 0;
        }

        DataTable {
            schema: self.schema.clone(),
            batches: out,
        }
    }

    /// The first `n` rows.
    pub fn head(&self, n: usize) -> DataTable {
        self.slice(0, n)
    }

    /// Keep only `columns` that exist in the table, in the order given.
    ///
    /// Names that are not present are skipped rather than reported, so a
    /// canonical column list can be applied to tables that omit optional
    /// columns.
    pub fn select(&self, columns: &[&str]) -> DatasetResult<DataTable> {
        let indices: Vec<usize> = columns
            .iter()
            .filter_map(|name| self.schema.index_of(name).ok())
            .collect();

        let schema = Arc::new(self.schema.project(&indices).context(ArrowSnafu)?);
        let batches = self
            .batches
            .iter()
            .map(|b| b.project(&indices))
            .collect::<Result<Vec<_>, _>>()
            .context(ArrowSnafu)?;

        Ok(DataTable { schema, batches })
    }

    /// Render every row as a JSON object. Null fields are omitted.
    pub fn to_json_rows(&self) -> DatasetResult<Vec<Map<String, Value>>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let mut writer = ArrayWriter::new(Vec::new());
        let batches: Vec<&RecordBatch> = self.batches.iter().filter(|b| b.num_rows() > 0).collect();
        writer.write_batches(&batches).context(ArrowSnafu)?;
        writer.finish().context(ArrowSnafu)?;

        let buf = writer.into_inner();
        serde_json::from_slice(&buf).context(RecordEncodingSnafu)
    }

    /// Length of the first non-null vector in `column`.
    ///
    /// Supports `List`, `LargeList` and `FixedSizeList` columns. Returns
    /// `None` when the column is missing, has another type, or holds no
    /// non-null value.
    pub fn vector_dimension(&self, column: &str) -> Option<usize> {
        self.vector_lengths(column)?.into_iter().flatten().next()
    }

    /// Length of the vector in `column` for every row (`None` for nulls).
    pub fn vector_lengths(&self, column: &str) -> Option<Vec<Option<usize>>> {
        let idx = self.schema.index_of(column).ok()?;
        let mut out = Vec::with_capacity(self.num_rows());

        for batch in &self.batches {
            let col = batch.column(idx);
            match col.data_type() {
                DataType::List(_) => {
                    let list = col.as_list::<i32>();
                    out.extend((0..list.len()).map(|i| {
                        (!list.is_null(i)).then(|| list.value_length(i) as usize)
                    }));
                }
                DataType::LargeList(_) => {
                    let list = col.as_list::<i64>();
                    out.extend((0..list.len()).map(|i| {
                        (!list.is_null(i)).then(|| list.value_length(i) as usize)
                    }));
                }
                DataType::FixedSizeList(_, size) => {
                    let list = col.as_fixed_size_list();
                    out.extend((0..list.len()).map(|i| (!list.is_null(i)).then_some(*size as usize)));
                }
                _ => return None,
            }
        }
        Some(out)
    }
}

/// `field` with itself and every nested struct child marked nullable.
fn nullable_field(field: &Field) -> Field {
    let data_type = match field.data_type() {
        DataType::Struct(children) => {
            DataType::Struct(children.iter().map(|c| nullable_field(c)).collect())
        }
        other => other.clone(),
    };
    field.clone().with_data_type(data_type).with_nullable(true)
}

/// Reshape `array` to `target`, matching struct children by name.
fn align_array(array: &ArrayRef, target: &DataType) -> DatasetResult<ArrayRef> {
    if array.data_type() == target {
        return Ok(array.clone());
    }
    match (array.data_type(), target) {
        (DataType::Struct(_), DataType::Struct(children)) => {
            let source = array.as_struct();
            let columns = children
                .iter()
                .map(|child| match source.column_by_name(child.name()) {
                    Some(column) => align_array(column, child.data_type()),
                    None => Ok(new_null_array(child.data_type(), source.len())),
                })
                .collect::<DatasetResult<Vec<_>>>()?;
            let aligned = StructArray::try_new(children.clone(), columns, source.nulls().cloned())
                .context(ArrowSnafu)?;
            Ok(Arc::new(aligned))
        }
        _ => cast(array, target).context(ArrowSnafu),
    }
}

fn align_batch(batch: &RecordBatch, schema: &SchemaRef) -> DatasetResult<RecordBatch> {
    let columns = schema
        .fields()
        .iter()
        .map(|field| match batch.column_by_name(field.name()) {
            Some(column) => align_array(column, field.data_type()),
            None => Ok(new_null_array(field.data_type(), batch.num_rows())),
        })
        .collect::<DatasetResult<Vec<_>>>()?;

    let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
    RecordBatch::try_new_with_options(schema.clone(), columns, &options).context(ArrowSnafu)
}

impl TryFrom<Vec<RecordBatch>> for DataTable {
    type Error = DatasetError;

    fn try_from(batches: Vec<RecordBatch>) -> Result<Self, Self::Error> {
        DataTable::from_batches(batches)
    }
}
