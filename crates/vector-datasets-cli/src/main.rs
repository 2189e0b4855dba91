//! CLI tool for inspecting, validating and copying vector search datasets.

mod error;
mod output;

use std::io::Write;

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use snafu::ResultExt;
use tracing_subscriber::EnvFilter;
use vector_datasets_core::{
    Catalog, Dataset, DatasetOptions, StorageOptions, TableKind, config::DEFAULT_MAX_ROWS,
};

use crate::error::{
    CliResult, CopySnafu, EncodeJsonSnafu, InvalidStorageOptionSnafu, ListCatalogSnafu,
    OpenDatasetSnafu, ReadTableSnafu, ValidateSnafu, WriteOutputSnafu,
};
use crate::output::{print_json_line, print_table};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TableArg {
    Documents,
    Queries,
}

impl From<TableArg> for TableKind {
    fn from(v: TableArg) -> Self {
        match v {
            TableArg::Documents => TableKind::Documents,
            TableArg::Queries => TableKind::Queries,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the datasets of a catalog
    List {
        /// Catalog base path (default: $DATASETS_CATALOG_BASEPATH, then the public catalog)
        #[arg(long)]
        catalog: Option<String>,

        /// Print a table of every dataset's metadata instead of names only
        #[arg(long, default_value_t = false)]
        summary: bool,
    },

    /// Print a dataset's metadata as JSON
    Info { path: String },

    /// Print the first rows of a table
    Head {
        path: String,

        #[arg(short = 'n', long, default_value_t = 5)]
        rows: usize,

        #[arg(long, value_enum, default_value_t = TableArg::Documents)]
        table: TableArg,
    },

    /// Write a table as JSON lines (canonical columns only)
    Dump {
        path: String,

        #[arg(long, value_enum, default_value_t = TableArg::Documents)]
        table: TableArg,

        /// Documents per read batch
        #[arg(long, default_value_t = 1000, allow_negative_numbers = true)]
        batch_size: i64,
    },

    /// Check ids, vector dimensions and sparse vectors
    Validate { path: String },

    /// Load a dataset and persist it under a new location
    ///
    /// The last segment of <DST> must equal the dataset name.
    Copy { src: String, dst: String },
}

#[derive(Debug, Parser)]
#[command(name = "vdatasets", version)]
struct Cli {
    /// Backend option passed to object stores, e.g. region=us-east-1 (repeatable)
    #[arg(long = "storage-option", global = true, value_name = "KEY=VALUE")]
    storage_option: Vec<String>,

    /// Refuse to load tables with more rows than this
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_ROWS)]
    max_rows: u64,

    #[command(subcommand)]
    cmd: Command,
}

fn parse_storage_options(specs: &[String]) -> CliResult<StorageOptions> {
    let mut options = StorageOptions::new();
    for spec in specs {
        let Some((key, value)) = spec.split_once('=') else {
            return InvalidStorageOptionSnafu { spec: spec.clone() }.fail();
        };
        let key = key.trim();
        if key.is_empty() {
            return InvalidStorageOptionSnafu { spec: spec.clone() }.fail();
        }
        options.insert(key.to_string(), value.to_string());
    }
    Ok(options)
}

async fn open_dataset(path: &str, options: &DatasetOptions) -> CliResult<Dataset> {
    Dataset::from_path(path, options.clone())
        .await
        .context(OpenDatasetSnafu { path })
}

async fn cmd_list(catalog: Option<String>, summary: bool, options: DatasetOptions) -> CliResult<()> {
    let mut catalog = Catalog::from_env(catalog.as_deref(), options);
    let base = catalog.base_path().to_string();
    let mut out = std::io::stdout().lock();

    if summary {
        let table = catalog
            .summary()
            .await
            .context(ListCatalogSnafu { base })?;
        return print_table(&mut out, &table);
    }

    let ids = catalog
        .list_datasets()
        .await
        .context(ListCatalogSnafu { base })?;
    for id in ids {
        writeln!(out, "{id}").context(WriteOutputSnafu)?;
    }
    Ok(())
}

async fn cmd_info(path: &str, options: &DatasetOptions) -> CliResult<()> {
    let ds = open_dataset(path, options).await?;
    let metadata = ds.metadata().await.context(OpenDatasetSnafu { path })?;
    let json = metadata.to_json().context(EncodeJsonSnafu)?;
    println!("{json}");
    Ok(())
}

async fn cmd_head(path: &str, rows: usize, kind: TableKind, options: &DatasetOptions) -> CliResult<()> {
    let ds = open_dataset(path, options).await?;
    let table = ds.table(kind).await.context(ReadTableSnafu {
        path,
        table: kind.to_string(),
    })?;
    print_table(&mut std::io::stdout().lock(), &table.head(rows))
}

async fn cmd_dump(
    path: &str,
    kind: TableKind,
    batch_size: i64,
    options: &DatasetOptions,
) -> CliResult<()> {
    let ds = open_dataset(path, options).await?;
    let read_ctx = || ReadTableSnafu {
        path,
        table: kind.to_string(),
    };
    let mut out = std::io::stdout().lock();

    match kind {
        TableKind::Documents => {
            for batch in ds.iter_documents(batch_size).await.context(read_ctx())? {
                for record in batch.context(read_ctx())? {
                    print_json_line(&mut out, &record)?;
                }
            }
        }
        TableKind::Queries => {
            for record in ds.iter_queries().await.context(read_ctx())? {
                print_json_line(&mut out, &record.context(read_ctx())?)?;
            }
        }
    }
    out.flush().context(WriteOutputSnafu)
}

async fn cmd_validate(path: &str, options: &DatasetOptions) -> CliResult<()> {
    let ds = open_dataset(path, options).await?;
    ds.validate().await.context(ValidateSnafu { path })?;

    let documents = ds.len().await.context(ValidateSnafu { path })?;
    let queries = ds
        .queries()
        .await
        .context(ValidateSnafu { path })?
        .num_rows();
    println!("OK: {path} ({documents} documents, {queries} queries)");
    Ok(())
}

async fn cmd_copy(src: &str, dst: &str, options: &DatasetOptions) -> CliResult<()> {
    let ds = open_dataset(src, options).await?;
    ds.persist(dst, &options.storage)
        .await
        .context(CopySnafu { src, dst })?;
    info!("copied {src} to {dst}");
    println!("Copied {src} -> {dst}");
    Ok(())
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let options = DatasetOptions {
        storage: parse_storage_options(&cli.storage_option)?,
        max_rows: cli.max_rows,
        ..DatasetOptions::default()
    };

    match cli.cmd {
        Command::List { catalog, summary } => cmd_list(catalog, summary, options).await,
        Command::Info { path } => cmd_info(&path, &options).await,
        Command::Head { path, rows, table } => cmd_head(&path, rows, table.into(), &options).await,
        Command::Dump {
            path,
            table,
            batch_size,
        } => cmd_dump(&path, table.into(), batch_size, &options).await,
        Command::Validate { path } => cmd_validate(&path, &options).await,
        Command::Copy { src, dst } => cmd_copy(&src, &dst, &options).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(e) = run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
