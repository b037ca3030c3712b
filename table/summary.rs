//! # Summary Reporter
//!
//! Counts responses to the time-limit belief question into the three fixed
//! categories, followed by the number of valid (non-missing) responses.

use super::frame::{Table, TableError};
use serde::Serialize;

/// The fixed category taxonomy, in reporting order.
pub const BELIEF_CATEGORIES: [(i64, &str); 3] =
    [(1, "Believed"), (2, "Did not believe"), (3, "Don't know")];

/// Label of the synthetic total row.
pub const VALID_TOTAL_LABEL: &str = "Valid Responses";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub label: String,
    pub code: Option<i64>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub field: String,
    /// The three category rows followed by the valid-total row.
    pub rows: Vec<CategoryCount>,
    /// Non-missing responses outside the category codes. Already included in
    /// the valid total.
    pub out_of_range: usize,
}

impl CategorySummary {
    pub fn valid_total(&self) -> usize {
        self.rows.last().map(|r| r.count).unwrap_or(0)
    }

    pub fn count_for(&self, code: i64) -> Option<usize> {
        self.rows
            .iter()
            .find(|r| r.code == Some(code))
            .map(|r| r.count)
    }
}

/// Tabulates `field` against [`BELIEF_CATEGORIES`].
///
/// Codes outside the taxonomy are counted in the valid total and in
/// `out_of_range`, and produce a warning.
pub fn summarize(table: &Table, field: &str) -> Result<CategorySummary, TableError> {
    let values = table.numeric(field)?;
    let mut counts = [0usize; BELIEF_CATEGORIES.len()];
    let mut valid = 0usize;
    let mut out_of_range = 0usize;

    for value in values.iter().flatten() {
        valid += 1;
        match BELIEF_CATEGORIES
            .iter()
            .position(|(code, _)| *code as f64 == *value)
        {
            Some(slot) => counts[slot] += 1,
            None => out_of_range += 1,
        }
    }

    if out_of_range > 0 {
        log::warn!(
            "{out_of_range} responses in '{field}' fall outside the recognized codes 1-3; they are counted as valid but belong to no category"
        );
    }

    let mut rows: Vec<CategoryCount> = BELIEF_CATEGORIES
        .iter()
        .zip(counts)
        .map(|((code, label), count)| CategoryCount {
            label: label.to_string(),
            code: Some(*code),
            count,
        })
        .collect();
    rows.push(CategoryCount {
        label: VALID_TOTAL_LABEL.to_string(),
        code: None,
        count: valid,
    });

    Ok(CategorySummary {
        field: field.to_string(),
        rows,
        out_of_range,
    })
}
