//! # Mean Imputation
//!
//! Fills missing covariate values with the column's own observed mean. Runs
//! after the merge and treatment restriction, before any regression, so the
//! means are computed over the analysis sample.

use super::frame::{Column, Table, TableError};

/// Returns a copy of `table` where every missing cell of `columns` holds that
/// column's mean. Columns not listed are untouched. Running it twice is a no-op
/// the second time.
pub fn impute_means(table: &Table, columns: &[String]) -> Result<Table, TableError> {
    let mut out = table.clone();
    for name in columns {
        let values = table.numeric(name)?;
        let missing = table.column(name)?.data.null_count();
        if missing == 0 {
            continue;
        }
        let mean = observed_mean(values).ok_or_else(|| TableError::NoObservedValues(name.clone()))?;
        log::debug!("Imputing {missing} missing values of '{name}' with mean {mean:.6}");
        let filled: Vec<Option<f64>> = values.iter().map(|v| Some(v.unwrap_or(mean))).collect();
        out = out.with_column(Column::numeric(name.as_str(), filled))?;
    }
    Ok(out)
}

fn observed_mean(values: &[Option<f64>]) -> Option<f64> {
    let (sum, n) = values
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}
