//! Dataset metadata stored in the `metadata.json` sidecar.
//!
//! The sidecar describes a dataset as a whole: its name, when it was created,
//! how many documents and queries it holds, and which embedding model produced
//! the vectors. Field names match the on-disk JSON exactly so a load followed
//! by a save reproduces the original document. Optional descriptive fields
//! that are absent are omitted on save.
//!
//! Deserialization only checks JSON shape and types; [`DatasetMetadata::validate`]
//! enforces the semantic rules (non-empty name, positive dimension, parseable
//! creation timestamp).
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::prelude::*;

/// Formats accepted for `created_at` in addition to RFC 3339.
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Semantic validation failures for [`DatasetMetadata`].
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum MetadataError {
    /// The dataset name is empty.
    #[snafu(display("dataset name must not be empty"))]
    EmptyName,

    /// The dense model dimension is zero.
    #[snafu(display("dense model {model:?} has dimension 0; dimension must be positive"))]
    ZeroDimension {
        /// Name of the offending dense model.
        model: String,
    },

    /// `created_at` is not a recognised timestamp.
    #[snafu(display("created_at {value:?} is not a valid timestamp"))]
    InvalidCreatedAt {
        /// The raw value found in the metadata.
        value: String,
    },
}

/// Descriptor of the dense embedding model used to produce vectors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DenseModelMetadata {
    /// Model name, for example `text-embedding-ada-002`.
    pub name: String,

    /// Optional tokenizer identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<String>,

    /// Length of every dense vector in the dataset.
    pub dimension: u32,
}

/// Descriptor of the sparse embedding model, if the dataset carries sparse vectors.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SparseModelMetadata {
    /// Optional model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Optional tokenizer identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<String>,
}

/// Metadata describing a whole dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetMetadata {
    /// Dataset name. Persisted datasets live in a directory with this name.
    pub name: String,

    /// Creation timestamp, kept verbatim as found in the sidecar.
    pub created_at: String,

    /// Number of document rows.
    pub documents: u64,

    /// Number of query rows.
    pub queries: u64,

    /// Where the raw data came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// License of the underlying data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// Storage bucket the dataset was published to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    /// Benchmark task, for example `retrieval`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,

    /// Dense embedding model.
    pub dense_model: DenseModelMetadata,

    /// Sparse embedding model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_model: Option<SparseModelMetadata>,

    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Search tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    /// Arguments used when the dataset was generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Map<String, Value>>,
}

impl DatasetMetadata {
    /// Minimal metadata with `created_at` set to the current UTC time.
    pub fn new(
        name: impl Into<String>,
        documents: u64,
        queries: u64,
        dense_model: DenseModelMetadata,
    ) -> Self {
        DatasetMetadata {
            name: name.into(),
            created_at: Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            documents,
            queries,
            source: None,
            license: None,
            bucket: None,
            task: None,
            dense_model,
            sparse_model: None,
            description: None,
            tags: None,
            args: None,
        }
    }

    /// Parse and validate metadata from its JSON representation.
    ///
    /// Returns the `serde_json` error for shape/type mismatches; semantic
    /// checks are left to [`DatasetMetadata::validate`].
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check the semantic invariants serde cannot express.
    pub fn validate(&self) -> Result<(), MetadataError> {
        ensure!(!self.name.trim().is_empty(), EmptyNameSnafu);
        ensure!(
            self.dense_model.dimension > 0,
            ZeroDimensionSnafu {
                model: self.dense_model.name.clone(),
            }
        );
        self.created_at_utc()?;
        Ok(())
    }

    /// `created_at` as a UTC timestamp.
    ///
    /// Accepts RFC 3339 and the naive `YYYY-MM-DD HH:MM:SS[.ffffff]` form,
    /// which is interpreted as UTC.
    pub fn created_at_utc(&self) -> Result<DateTime<Utc>, MetadataError> {
        let raw = self.created_at.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }

        NAIVE_TIMESTAMP_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
            .context(InvalidCreatedAtSnafu {
                value: self.created_at.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> DatasetMetadata {
        DatasetMetadata {
            name: "quora_all-MiniLM-L6-bm25".to_string(),
            created_at: "2023-05-01 12:00:00.000000".to_string(),
            documents: 522_931,
            queries: 15_000,
            source: Some("https://quoradata.quora.com".to_string()),
            license: None,
            bucket: Some("gs://pinecone-datasets-dev".to_string()),
            task: Some("similar questions".to_string()),
            dense_model: DenseModelMetadata {
                name: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
                tokenizer: None,
                dimension: 384,
            },
            sparse_model: Some(SparseModelMetadata {
                name: Some("bm25".to_string()),
                tokenizer: None,
            }),
            description: None,
            tags: Some(vec!["questions".to_string()]),
            args: None,
        }
    }

    #[test]
    fn json_roundtrip_is_lossless() -> Result<(), Box<dyn std::error::Error>> {
        let meta = sample();
        let json = meta.to_json()?;
        let back = DatasetMetadata::from_json(&json)?;
        assert_eq!(back, meta);
        Ok(())
    }

    #[test]
    fn absent_optional_fields_are_not_written() -> Result<(), Box<dyn std::error::Error>> {
        let meta = DatasetMetadata::new(
            "tiny",
            2,
            0,
            DenseModelMetadata {
                name: "ada2".to_string(),
                tokenizer: None,
                dimension: 2,
            },
        );
        let value: Value = serde_json::from_str(&meta.to_json()?)?;
        let obj = value.as_object().expect("metadata serializes to an object");
        assert!(!obj.contains_key("license"));
        assert!(!obj.contains_key("sparse_model"));
        assert!(obj["dense_model"].get("tokenizer").is_none());
        Ok(())
    }

    #[test]
    fn parses_minimal_sidecar() -> Result<(), Box<dyn std::error::Error>> {
        let json = r#"{
            "name": "test_io_dataset",
            "created_at": "2021-01-01 00:00:00.000000",
            "documents": 2,
            "queries": 2,
            "dense_model": {"name": "ada2", "dimension": 2}
        }"#;
        let meta = DatasetMetadata::from_json(json)?;
        meta.validate()?;
        assert_eq!(meta.dense_model.dimension, 2);
        assert_eq!(
            meta.created_at_utc()?,
            Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()
        );
        Ok(())
    }

    #[test]
    fn negative_counts_are_rejected_by_serde() {
        let json = r#"{
            "name": "bad",
            "created_at": "2021-01-01 00:00:00",
            "documents": -1,
            "queries": 0,
            "dense_model": {"name": "ada2", "dimension": 2}
        }"#;
        assert!(DatasetMetadata::from_json(json).is_err());
    }

    #[test]
    fn validate_rejects_zero_dimension() {
        let mut meta = sample();
        meta.dense_model.dimension = 0;
        assert!(matches!(
            meta.validate(),
            Err(MetadataError::ZeroDimension { .. })
        ));
    }

    #[test]
    fn validate_rejects_empty_name() {
        let mut meta = sample();
        meta.name = "  ".to_string();
        assert_eq!(meta.validate(), Err(MetadataError::EmptyName));
    }

    #[test]
    fn created_at_accepts_rfc3339_and_rejects_garbage() {
        let mut meta = sample();
        meta.created_at = "2024-02-03T04:05:06+02:00".to_string();
        assert_eq!(
            meta.created_at_utc(),
            Ok(Utc.with_ymd_and_hms(2024, 2, 3, 2, 5, 6).unwrap())
        );

        meta.created_at = "yesterday".to_string();
        assert!(matches!(
            meta.validate(),
            Err(MetadataError::InvalidCreatedAt { .. })
        ));
    }
}
