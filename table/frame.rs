//! # Record Table
//!
//! The in-memory table every pipeline stage consumes and produces. Columns keep
//! their insertion order and every transformation returns a fresh `Table`, so a
//! stage can never observe a later stage's edits.
//!
//! Cells are `Option`s: `None` is a missing value. Numeric columns hold `f64`
//! regardless of whether the source coded them as integers, 0/1 flags, or
//! category codes; text columns only exist for identifiers and labels.

use ahash::AHashSet;
use thiserror::Error;

/// Errors raised by table construction, loading, merging and cleaning.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] polars::prelude::PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("The required column '{column}' was not found in the {table} table.")]
    ColumnNotFound { column: String, table: String },
    #[error("The identifier column '{column}' is missing from the {table} table.")]
    IdentifierMissing { column: String, table: String },
    #[error("Identifier '{key}' appears more than once in the {table} table.")]
    DuplicateIdentifier { key: String, table: String },
    #[error("Column '{0}' appears more than once in the table.")]
    DuplicateColumn(String),
    #[error("Column '{column}' has {found} rows, but the table has {expected}.")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("Column '{column}' was expected to be numeric but holds text.")]
    ColumnWrongType { column: String },
    #[error("Column '{0}' has no observed values, so its mean is undefined.")]
    NoObservedValues(String),
    #[error("The sample is empty after {stage}.")]
    EmptySample { stage: String },
    #[error(
        "Unsupported dataset format '{0}'. Export the dataset to CSV or TSV before loading it."
    )]
    UnsupportedFormat(String),
}

/// The payload of a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(values) => values.len(),
            ColumnData::Text(values) => values.len(),
        }
    }

    /// Number of missing cells.
    pub fn null_count(&self) -> usize {
        match self {
            ColumnData::Numeric(values) => values.iter().filter(|v| v.is_none()).count(),
            ColumnData::Text(values) => values.iter().filter(|v| v.is_none()).count(),
        }
    }

    fn take(&self, indices: &[usize]) -> ColumnData {
        match self {
            ColumnData::Numeric(values) => {
                ColumnData::Numeric(indices.iter().map(|&i| values[i]).collect())
            }
            ColumnData::Text(values) => {
                ColumnData::Text(indices.iter().map(|&i| values[i].clone()).collect())
            }
        }
    }

    /// The join key of row `i`, or `None` when the cell is missing.
    ///
    /// Numeric identifiers render through `Display`, so `17.0` and the text
    /// `"17"` produce the same key.
    pub fn key_at(&self, i: usize) -> Option<String> {
        match self {
            ColumnData::Numeric(values) => values[i].map(|v| v.to_string()),
            ColumnData::Text(values) => values[i].clone(),
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Text(values),
        }
    }

    /// Convenience constructor for fully observed numeric data.
    pub fn dense(name: impl Into<String>, values: &[f64]) -> Self {
        Self::numeric(name, values.iter().copied().map(Some).collect())
    }
}

/// An ordered collection of equally long, uniquely named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    height: usize,
}

impl Table {
    /// Builds a table, rejecting ragged columns and repeated names.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let height = columns.first().map(|c| c.data.len()).unwrap_or(0);
        let mut seen = AHashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
            if column.data.len() != height {
                return Err(TableError::LengthMismatch {
                    column: column.name.clone(),
                    expected: height,
                    found: column.data.len(),
                });
            }
        }
        Ok(Self { columns, height })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, TableError> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| TableError::ColumnNotFound {
                column: name.to_string(),
                table: "input".to_string(),
            })
    }

    /// Borrows a numeric column's cells.
    pub fn numeric(&self, name: &str) -> Result<&[Option<f64>], TableError> {
        match &self.column(name)?.data {
            ColumnData::Numeric(values) => Ok(values),
            ColumnData::Text(_) => Err(TableError::ColumnWrongType {
                column: name.to_string(),
            }),
        }
    }

    /// Appends `column`, or replaces the column of the same name in place.
    pub fn with_column(&self, column: Column) -> Result<Table, TableError> {
        let mut columns = self.columns.clone();
        match columns.iter().position(|c| c.name == column.name) {
            Some(idx) => columns[idx] = column,
            None => columns.push(column),
        }
        if self.columns.is_empty() {
            return Table::new(columns);
        }
        let table = Table {
            columns,
            height: self.height,
        };
        table.check_lengths()?;
        Ok(table)
    }

    /// Adds a literal column of ones, as required by estimators that do not
    /// insert an intercept themselves.
    pub fn with_constant(&self, name: &str) -> Result<Table, TableError> {
        self.with_column(Column::numeric(name, vec![Some(1.0); self.height]))
    }

    /// Keeps the rows whose mask entry is `true`.
    pub fn filter(&self, mask: &[bool]) -> Result<Table, TableError> {
        if mask.len() != self.height {
            return Err(TableError::LengthMismatch {
                column: "<row mask>".to_string(),
                expected: self.height,
                found: mask.len(),
            });
        }
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        Ok(self.take(&indices))
    }

    /// Gathers rows by position. Indices must be in bounds.
    pub fn take(&self, indices: &[usize]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.take(indices),
                })
                .collect(),
            height: indices.len(),
        }
    }

    pub fn drop_columns(&self, names: &[&str]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .filter(|c| !names.contains(&c.name.as_str()))
                .cloned()
                .collect(),
            height: self.height,
        }
    }

    pub fn rename_column(&self, from: &str, to: &str) -> Result<Table, TableError> {
        self.column(from)?;
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let mut c = c.clone();
                if c.name == from {
                    c.name = to.to_string();
                }
                c
            })
            .collect();
        Table::new(columns)
    }

    /// Join keys for every row of `column`. A missing identifier yields `None`;
    /// such a row can never match and is left to the caller to drop.
    pub fn keys(&self, column: &str, table: &str) -> Result<Vec<Option<String>>, TableError> {
        let data = &self
            .columns
            .iter()
            .find(|c| c.name == column)
            .ok_or_else(|| TableError::IdentifierMissing {
                column: column.to_string(),
                table: table.to_string(),
            })?
            .data;
        Ok((0..self.height).map(|i| data.key_at(i)).collect())
    }

    fn check_lengths(&self) -> Result<(), TableError> {
        for column in &self.columns {
            if column.data.len() != self.height {
                return Err(TableError::LengthMismatch {
                    column: column.name.clone(),
                    expected: self.height,
                    found: column.data.len(),
                });
            }
        }
        Ok(())
    }
}
