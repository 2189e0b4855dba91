//! Rendering helpers shared by the subcommands.
use std::io::Write;

use arrow::util::pretty::pretty_format_batches;
use snafu::ResultExt;
use vector_datasets_core::{DataTable, Record};

use crate::error::{CliResult, EncodeJsonSnafu, RenderSnafu, WriteOutputSnafu};

/// Print `table` as an ASCII grid.
pub fn print_table(out: &mut impl Write, table: &DataTable) -> CliResult<()> {
    if table.batches().is_empty() {
        writeln!(out, "(empty table)").context(WriteOutputSnafu)?;
        return Ok(());
    }
    let rendered = pretty_format_batches(table.batches()).context(RenderSnafu)?;
    writeln!(out, "{rendered}").context(WriteOutputSnafu)?;
    writeln!(out, "{} row(s)", table.num_rows()).context(WriteOutputSnafu)
}

/// Print one record per line as compact JSON.
pub fn print_json_line(out: &mut impl Write, record: &Record) -> CliResult<()> {
    let line = serde_json::to_string(record).context(EncodeJsonSnafu)?;
    writeln!(out, "{line}").context(WriteOutputSnafu)
}
