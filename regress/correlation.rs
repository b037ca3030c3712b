//! Instrument relevance checks run before trusting the IV estimates.

use super::design::{RegressionError, complete_rows, gather_vector};
use super::inference::FitResult;
use super::ols::fit_ols;
use crate::table::Table;

/// Pearson's r over the rows where both columns are observed.
pub fn pearson(table: &Table, x: &str, y: &str) -> Result<f64, RegressionError> {
    let rows = complete_rows(table, &[x, y])?;
    if rows.len() < 2 {
        return Err(RegressionError::EmptySample {
            model: format!("corr({x}, {y})"),
        });
    }
    let xs = gather_vector(table, &rows, x)?;
    let ys = gather_vector(table, &rows, y)?;
    let n = rows.len() as f64;
    let x_mean = xs.sum() / n;
    let y_mean = ys.sum() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in xs.iter().zip(ys.iter()) {
        let (dx, dy) = (a - x_mean, b - y_mean);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 {
        return Err(RegressionError::ZeroVariance(x.to_string()));
    }
    if syy == 0.0 {
        return Err(RegressionError::ZeroVariance(y.to_string()));
    }
    Ok((sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0))
}

/// Bivariate `treatment ~ 1 + instrument`, reported as a diagnostic only.
pub fn first_stage(
    table: &Table,
    instrument: &str,
    treatment: &str,
    level: f64,
) -> Result<FitResult, RegressionError> {
    fit_ols(table, treatment, &[instrument], level)
}
