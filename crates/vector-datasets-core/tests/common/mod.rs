#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use arrow::array::{Float32Builder, Int64Builder, ListBuilder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use serde_json::json;
use vector_datasets_core::{DatasetMetadata, DenseModelMetadata, Document, Query, SparseValues};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

fn sparse(indices: [u32; 3], values: [f32; 3]) -> Option<SparseValues> {
    Some(SparseValues {
        indices: indices.to_vec(),
        values: values.to_vec(),
    })
}

pub fn documents() -> Vec<Document> {
    vec![
        Document {
            id: "1".to_string(),
            values: vec![0.1, 0.2, 0.3],
            sparse_values: sparse([1, 2, 3], [0.1, 0.2, 0.3]),
            metadata: json!({"title": "title1", "url": "url1"}).as_object().cloned(),
            blob: None,
        },
        Document {
            id: "2".to_string(),
            values: vec![0.4, 0.5, 0.6],
            sparse_values: sparse([4, 5, 6], [0.4, 0.5, 0.6]),
            metadata: json!({"title": "title2", "url": "url2"}).as_object().cloned(),
            blob: None,
        },
    ]
}

pub fn queries() -> Vec<Query> {
    vec![
        Query {
            vector: vec![0.1, 0.2, 0.3],
            sparse_vector: sparse([1, 2, 3], [0.1, 0.2, 0.3]),
            filter: json!({"filter1": {"$eq": "filter1"}}).as_object().cloned(),
            top_k: 1,
            blob: None,
        },
        Query {
            vector: vec![0.4, 0.5, 0.6],
            sparse_vector: sparse([4, 5, 6], [0.4, 0.5, 0.6]),
            filter: json!({"filter2": {"$eq": "filter2"}}).as_object().cloned(),
            top_k: 2,
            blob: None,
        },
    ]
}

pub fn metadata(name: &str, queries: u64) -> DatasetMetadata {
    let mut metadata = DatasetMetadata::new(
        name,
        2,
        queries,
        DenseModelMetadata {
            name: "ada2".to_string(),
            tokenizer: None,
            dimension: 3,
        },
    );
    metadata.created_at = "2021-01-01 00:00:00.000000".to_string();
    metadata
}

pub fn write_metadata(root: &Path, metadata: &DatasetMetadata) -> TestResult {
    std::fs::create_dir_all(root)?;
    std::fs::write(root.join("metadata.json"), metadata.to_json()?)?;
    Ok(())
}

/// Write `rows` documents with an extra `payload_size` column next to the
/// canonical ones.
pub fn write_documents_with_extra_column(path: &Path, rows: usize) -> TestResult {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut id_builder = StringBuilder::new();
    let mut values_builder = ListBuilder::new(Float32Builder::new());
    let mut extra_builder = Int64Builder::with_capacity(rows);

    for i in 0..rows {
        id_builder.append_value(format!("doc-{i}"));
        values_builder.values().append_slice(&[i as f32, 0.5, 0.25]);
        values_builder.append(true);
        extra_builder.append_value(i as i64 * 100);
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "values",
            DataType::List(Arc::new(Field::new("item", DataType::Float32, true))),
            true,
        ),
        Field::new("payload_size", DataType::Int64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(id_builder.finish()) as _,
            Arc::new(values_builder.finish()),
            Arc::new(extra_builder.finish()),
        ],
    )?;

    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}
