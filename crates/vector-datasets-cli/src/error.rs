use arrow::error::ArrowError;
use vector_datasets_core::DatasetError;

use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Invalid --storage-option '{spec}': expected key=value"))]
    InvalidStorageOption { spec: String },

    #[snafu(display("Failed to list catalog at {base}: {source}"))]
    ListCatalog {
        base: String,
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },

    #[snafu(display("Failed to open dataset at {path}: {source}"))]
    OpenDataset {
        path: String,
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },

    #[snafu(display("Failed to read {table} of {path}: {source}"))]
    ReadTable {
        path: String,
        table: String,
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },

    #[snafu(display("Dataset at {path} is invalid: {source}"))]
    Validate {
        path: String,
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },

    #[snafu(display("Failed to copy {src} -> {dst}: {source}"))]
    Copy {
        src: String,
        dst: String,
        #[snafu(source(from(DatasetError, Box::new)))]
        source: Box<DatasetError>,
    },

    #[snafu(display("Failed to render table: {source}"))]
    Render { source: ArrowError },

    #[snafu(display("Failed to encode JSON output: {source}"))]
    EncodeJson { source: serde_json::Error },

    #[snafu(display("Failed to write output: {source}"))]
    WriteOutput { source: std::io::Error },
}
