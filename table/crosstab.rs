//! # Treatment Dummy and Cross-tabulation
//!
//! Restricts the sample to respondents who gave a definite answer to the
//! belief question, derives the binary belief indicator, and cross-tabulates
//! it against the randomized assignment.

use super::frame::{Column, Table, TableError};
use ndarray::{Array1, Array2, Axis};
use serde::Serialize;

/// How the belief question maps onto the treatment indicator.
#[derive(Debug, Clone)]
pub struct TreatmentCoding<'a> {
    pub belief_field: &'a str,
    pub treatment: &'a str,
    /// Code that becomes `treatment = 1`.
    pub believed_code: f64,
    /// Code that becomes `treatment = 0`.
    pub not_believed_code: f64,
}

/// Keeps rows whose belief code is one of the two definite answers and appends
/// the 0/1 treatment column. Every other code, including "don't know" and
/// missing, is excluded from the returned table.
pub fn build_treatment(table: &Table, coding: &TreatmentCoding<'_>) -> Result<Table, TableError> {
    let belief = table.numeric(coding.belief_field)?;
    let mask: Vec<bool> = belief
        .iter()
        .map(|v| matches!(v, Some(code) if *code == coding.believed_code || *code == coding.not_believed_code))
        .collect();
    let restricted = table.filter(&mask)?;
    if restricted.height() == 0 {
        return Err(TableError::EmptySample {
            stage: format!(
                "restricting '{}' to codes {} and {}",
                coding.belief_field, coding.believed_code, coding.not_believed_code
            ),
        });
    }

    let indicator: Vec<Option<f64>> = restricted
        .numeric(coding.belief_field)?
        .iter()
        .map(|v| Some(if *v == Some(coding.believed_code) { 1.0 } else { 0.0 }))
        .collect();

    log::info!(
        "Treatment '{}' built on {} of {} rows",
        coding.treatment,
        restricted.height(),
        table.height()
    );
    restricted.with_column(Column::numeric(coding.treatment, indicator))
}

/// A two-way frequency table with inclusive margins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossTab {
    pub row_label: String,
    pub col_label: String,
    /// Distinct observed values of the row variable, ascending.
    pub row_levels: Vec<f64>,
    /// Distinct observed values of the column variable, ascending.
    pub col_levels: Vec<f64>,
    /// `counts[[i, j]]` is the number of rows with `row_levels[i]` and `col_levels[j]`.
    pub counts: Array2<usize>,
}

impl CrossTab {
    pub fn row_totals(&self) -> Array1<usize> {
        self.counts.sum_axis(Axis(1))
    }

    pub fn col_totals(&self) -> Array1<usize> {
        self.counts.sum_axis(Axis(0))
    }

    pub fn grand_total(&self) -> usize {
        self.counts.sum()
    }

    pub fn cell(&self, row_level: f64, col_level: f64) -> Option<usize> {
        let i = self.row_levels.iter().position(|v| *v == row_level)?;
        let j = self.col_levels.iter().position(|v| *v == col_level)?;
        Some(self.counts[[i, j]])
    }
}

/// Counts co-occurrences of `row_field` and `col_field`. Rows missing either
/// value are left out, as are their margins.
pub fn crosstab(
    table: &Table,
    row_field: &str,
    col_field: &str,
    row_label: &str,
    col_label: &str,
) -> Result<CrossTab, TableError> {
    let rows = table.numeric(row_field)?;
    let cols = table.numeric(col_field)?;

    let pairs: Vec<(f64, f64)> = rows
        .iter()
        .zip(cols)
        .filter_map(|(r, c)| Some(((*r)?, (*c)?)))
        .collect();

    let row_levels = distinct_sorted(pairs.iter().map(|p| p.0));
    let col_levels = distinct_sorted(pairs.iter().map(|p| p.1));
    let mut counts = Array2::<usize>::zeros((row_levels.len(), col_levels.len()));
    for (r, c) in &pairs {
        let i = level_index(&row_levels, *r);
        let j = level_index(&col_levels, *c);
        counts[[i, j]] += 1;
    }

    Ok(CrossTab {
        row_label: row_label.to_string(),
        col_label: col_label.to_string(),
        row_levels,
        col_levels,
        counts,
    })
}

fn distinct_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut levels: Vec<f64> = values.collect();
    levels.sort_by(f64::total_cmp);
    levels.dedup();
    levels
}

fn level_index(levels: &[f64], value: f64) -> usize {
    levels
        .binary_search_by(|probe| probe.total_cmp(&value))
        .unwrap_or_else(|insert_at| insert_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODING: TreatmentCoding<'static> = TreatmentCoding {
        belief_field: "fmi2",
        treatment: "TLyes",
        believed_code: 1.0,
        not_believed_code: 2.0,
    };

    fn merged() -> Table {
        Table::new(vec![
            Column::dense("sampleid", &[1.0, 2.0, 3.0]),
            Column::dense("e", &[1.0, 0.0, 1.0]),
            Column::dense("fmi2", &[1.0, 2.0, 3.0]),
        ])
        .unwrap()
    }

    #[test]
    fn dont_know_rows_are_excluded() {
        let treated = build_treatment(&merged(), &CODING).unwrap();
        assert_eq!(treated.height(), 2);
        assert_eq!(treated.numeric("sampleid").unwrap(), &[Some(1.0), Some(2.0)]);
        assert_eq!(treated.numeric("TLyes").unwrap(), &[Some(1.0), Some(0.0)]);
    }

    #[test]
    fn missing_codes_are_excluded() {
        let table = Table::new(vec![Column::numeric("fmi2", vec![None, Some(2.0)])]).unwrap();
        let treated = build_treatment(&table, &CODING).unwrap();
        assert_eq!(treated.height(), 1);
    }

    #[test]
    fn empty_restriction_fails_loudly() {
        let table = Table::new(vec![Column::dense("fmi2", &[3.0, 3.0])]).unwrap();
        let err = build_treatment(&table, &CODING).unwrap_err();
        assert!(matches!(err, TableError::EmptySample { .. }));
    }

    #[test]
    fn crosstab_of_assignment_against_belief() {
        let treated = build_treatment(&merged(), &CODING).unwrap();
        let tab = crosstab(&treated, "e", "TLyes", "Original Treatment", "Time Limit Belief")
            .unwrap();
        assert_eq!(tab.cell(1.0, 1.0), Some(1));
        assert_eq!(tab.cell(0.0, 0.0), Some(1));
        assert_eq!(tab.cell(1.0, 0.0), Some(0));
        assert_eq!(tab.row_totals().to_vec(), vec![1, 1]);
        assert_eq!(tab.col_totals().to_vec(), vec![1, 1]);
        assert_eq!(tab.grand_total(), 2);
    }

    #[test]
    fn margins_reconcile() {
        let table = Table::new(vec![
            Column::dense("a", &[0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 1.0]),
            Column::numeric(
                "b",
                vec![Some(0.0), Some(1.0), Some(1.0), Some(1.0), None, Some(0.0), Some(0.0)],
            ),
        ])
        .unwrap();
        let tab = crosstab(&table, "a", "b", "a", "b").unwrap();
        assert_eq!(tab.grand_total(), 6);
        assert_eq!(tab.row_totals().sum(), tab.grand_total());
        assert_eq!(tab.col_totals().sum(), tab.grand_total());
    }
}
