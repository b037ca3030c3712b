//! # Dataset Loader
//!
//! Reads one delimited text file into a [`Table`]. The study ships its data as
//! Stata files; those are exported to CSV/TSV once, outside this crate, and this
//! module is the only place that touches the exported files.
//!
//! - Polars does the parsing. Empty cells arrive as nulls and become `None`.
//! - String columns stay text (identifiers, labels). Every other dtype is cast
//!   to `Float64`, which folds integer, boolean and category-code columns into
//!   one numeric representation.
//! - Types are inferred from every row, so a decimal deep in an otherwise
//!   integral column does not fail the parse.

use super::frame::{Column, Table, TableError};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Loads a `.csv`, `.tsv` or `.tab` file.
pub fn load_table(path: &Path) -> Result<Table, TableError> {
    let separator = separator_for(path)?;
    log::info!("Loading dataset from '{}'", path.display());

    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(None)
                .with_parse_options(CsvParseOptions::default().with_separator(separator)),
        )
        .finish()?;

    let table = table_from_frame(&df)?;
    log::info!(
        "Loaded {} rows x {} columns from '{}'",
        table.height(),
        table.width(),
        path.display()
    );
    Ok(table)
}

/// Converts an already materialized Polars frame.
pub fn table_from_frame(df: &DataFrame) -> Result<Table, TableError> {
    let mut columns = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        let name = column.name().to_string();
        let converted = match column.dtype() {
            DataType::String => {
                let values: Vec<Option<String>> = column
                    .str()?
                    .into_iter()
                    .map(|v| v.map(str::to_string))
                    .collect();
                Column::text(name, values)
            }
            _ => {
                let casted = column.cast(&DataType::Float64)?;
                let values: Vec<Option<f64>> = casted
                    .f64()?
                    .into_iter()
                    .map(|v| v.filter(|x| !x.is_nan()))
                    .collect();
                Column::numeric(name, values)
            }
        };
        columns.push(converted);
    }
    Table::new(columns)
}

fn separator_for(path: &Path) -> Result<u8, TableError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "tsv" | "tab" => Ok(b'\t'),
        "csv" => Ok(b','),
        other => Err(TableError::UnsupportedFormat(other.to_string())),
    }
}
