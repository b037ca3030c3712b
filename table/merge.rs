//! # Merger / Reconciler
//!
//! Inner-joins the administrative and survey tables on the sample identifier,
//! then collapses the duplicate columns the join produces.
//!
//! Shared non-key columns are tagged with the primary suffix on the admin side
//! and the secondary suffix on the survey side. Reconciliation then deletes
//! every secondary-tagged column and strips the primary tag. The admin value
//! always wins; no comparison between the two versions is attempted.

use super::frame::{Column, Table, TableError};
use ahash::{AHashMap, AHashSet};

/// Column naming used by the join.
#[derive(Debug, Clone)]
pub struct JoinKeys<'a> {
    pub identifier: &'a str,
    pub primary_suffix: &'a str,
    pub secondary_suffix: &'a str,
}

/// The merged table plus the row counts that explain how much sample was lost.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub table: Table,
    pub primary_rows: usize,
    pub secondary_rows: usize,
    pub matched_rows: usize,
}

impl MergeOutcome {
    /// Admin records with no survey counterpart.
    pub fn unmatched_primary(&self) -> usize {
        self.primary_rows - self.matched_rows
    }
}

/// Joins and reconciles in one step.
pub fn merge(
    primary: &Table,
    secondary: &Table,
    keys: &JoinKeys<'_>,
) -> Result<MergeOutcome, TableError> {
    let joined = inner_join(primary, secondary, keys)?;
    let table = reconcile(&joined, keys)?;
    log::info!(
        "Merged {} admin rows with {} survey rows: {} matched on '{}'",
        primary.height(),
        secondary.height(),
        table.height(),
        keys.identifier
    );
    if table.height() < primary.height() {
        log::info!(
            "{} admin records have no survey counterpart and were dropped",
            primary.height() - table.height()
        );
    }
    Ok(MergeOutcome {
        table,
        primary_rows: primary.height(),
        secondary_rows: secondary.height(),
        matched_rows: joined.height(),
    })
}

/// Inner join that keeps the primary table's row order and tags shared columns.
pub fn inner_join(
    primary: &Table,
    secondary: &Table,
    keys: &JoinKeys<'_>,
) -> Result<Table, TableError> {
    let primary_keys = primary.keys(keys.identifier, "admin")?;
    let secondary_keys = secondary.keys(keys.identifier, "survey")?;
    ensure_unique(&primary_keys, "admin")?;
    ensure_unique(&secondary_keys, "survey")?;

    let secondary_index: AHashMap<&str, usize> = secondary_keys
        .iter()
        .enumerate()
        .filter_map(|(row, key)| key.as_deref().map(|k| (k, row)))
        .collect();

    // Rows with a blank identifier never match.
    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = primary_keys
        .iter()
        .enumerate()
        .filter_map(|(row, key)| {
            key.as_deref()
                .and_then(|k| secondary_index.get(k))
                .map(|&r| (row, r))
        })
        .unzip();

    let blank = primary_keys.iter().filter(|k| k.is_none()).count();
    if blank > 0 {
        log::warn!(
            "{blank} admin records have no '{}' value and cannot be matched",
            keys.identifier
        );
    }

    let left = primary.take(&left_rows);
    let right = secondary.take(&right_rows);

    let primary_names: AHashSet<&str> = primary.column_names().into_iter().collect();
    let secondary_names: AHashSet<&str> = secondary.column_names().into_iter().collect();

    let mut columns = Vec::with_capacity(left.width() + right.width());
    for column in left.columns() {
        let name = if column.name != keys.identifier && secondary_names.contains(column.name.as_str())
        {
            format!("{}{}", column.name, keys.primary_suffix)
        } else {
            column.name.clone()
        };
        columns.push(Column {
            name,
            data: column.data.clone(),
        });
    }
    for column in right.columns() {
        if column.name == keys.identifier {
            continue;
        }
        let name = if primary_names.contains(column.name.as_str()) {
            format!("{}{}", column.name, keys.secondary_suffix)
        } else {
            column.name.clone()
        };
        columns.push(Column {
            name,
            data: column.data.clone(),
        });
    }
    Table::new(columns)
}

/// Drops secondary-tagged columns and strips the primary tag from the rest.
///
/// Untagged columns pass through unchanged. A stripped name that collides with
/// an existing column is a schema error rather than a silent overwrite.
pub fn reconcile(table: &Table, keys: &JoinKeys<'_>) -> Result<Table, TableError> {
    let duplicates: Vec<&str> = table
        .column_names()
        .into_iter()
        .filter(|name| name.ends_with(keys.secondary_suffix))
        .collect();
    for name in &duplicates {
        log::debug!("Dropping join duplicate '{name}'");
    }
    let mut reconciled = table.drop_columns(&duplicates);

    let tagged: Vec<String> = reconciled
        .column_names()
        .into_iter()
        .filter(|name| name.ends_with(keys.primary_suffix))
        .map(str::to_string)
        .collect();
    for name in &tagged {
        if let Some(stripped) = name.strip_suffix(keys.primary_suffix) {
            reconciled = reconciled.rename_column(name, stripped)?;
        }
    }
    Ok(reconciled)
}

fn ensure_unique(keys: &[Option<String>], table: &str) -> Result<(), TableError> {
    let mut seen = AHashSet::with_capacity(keys.len());
    for key in keys.iter().flatten() {
        if !seen.insert(key.as_str()) {
            return Err(TableError::DuplicateIdentifier {
                key: key.clone(),
                table: table.to_string(),
            });
        }
    }
    Ok(())
}
