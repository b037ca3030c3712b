//! # Design Matrices
//!
//! Turns named table columns into the dense `ndarray` structures the
//! estimators work on, and owns the least-squares kernel they share.
//!
//! Row-wise deletion happens here: a row enters a model only when the outcome
//! and every regressor are observed. Mean imputation upstream covers the
//! demographic covariates; anything else that is missing costs the row.

use crate::table::{Table, TableError};
use ndarray::{Array1, Array2};
use ndarray_linalg::{Inverse, QR};
use thiserror::Error;

/// Name given to the implicit constant of the OLS path.
pub const INTERCEPT: &str = "Intercept";

/// A diagonal entry of `R` smaller than this fraction of the largest one marks
/// its column as a linear combination of the columns before it.
pub const SINGULARITY_TOLERANCE: f64 = 1e-10;

#[derive(Error, Debug)]
pub enum RegressionError {
    #[error("{0}")]
    Table(#[from] TableError),

    #[error("Model '{model}' has no complete observations after row-wise deletion.")]
    EmptySample { model: String },

    #[error(
        "Model '{model}' has {n_obs} complete observations for {n_params} parameters; at least one residual degree of freedom is required."
    )]
    InsufficientDegreesOfFreedom {
        model: String,
        n_obs: usize,
        n_params: usize,
    },

    #[error(
        "Model '{model}' is singular: column '{column}' is constant or collinear with earlier regressors."
    )]
    Singular { model: String, column: String },

    #[error("Design matrix columns could not be stacked: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("A linear algebra routine failed: {0}")]
    LinearSystemSolveFailed(#[from] ndarray_linalg::error::LinalgError),

    #[error("Column '{0}' has zero variance in the analysis sample; the correlation is undefined.")]
    ZeroVariance(String),

    #[error(
        "Instrument '{instrument}' does not explain '{endogenous}' beyond the controls (partial R-squared {partial_r_squared:.3e}); the model is not identified."
    )]
    NotIdentified {
        instrument: String,
        endogenous: String,
        partial_r_squared: f64,
    },

    #[error("Regressor '{regressor}' is not part of model '{model}'.")]
    RegressorNotInModel { model: String, regressor: String },

    #[error("Reference distribution could not be constructed: {0}")]
    Distribution(String),
}

/// Outcome vector and regressor matrix over the complete cases of a model.
#[derive(Debug, Clone)]
pub struct Design {
    pub names: Vec<String>,
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

impl Design {
    pub fn n_obs(&self) -> usize {
        self.y.len()
    }

    pub fn n_params(&self) -> usize {
        self.x.ncols()
    }
}

/// Indices of rows where every listed column is observed.
pub fn complete_rows(table: &Table, columns: &[&str]) -> Result<Vec<usize>, RegressionError> {
    let data = columns
        .iter()
        .map(|c| table.numeric(c))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((0..table.height())
        .filter(|&i| data.iter().all(|col| col[i].is_some()))
        .collect())
}

/// Gathers `columns` at `rows` into an `n x k` matrix, optionally prefixed by a
/// column of ones. `rows` must come from [`complete_rows`] over a superset of
/// `columns`.
pub fn gather_matrix(
    table: &Table,
    rows: &[usize],
    columns: &[&str],
    intercept: bool,
) -> Result<Array2<f64>, RegressionError> {
    let data = columns
        .iter()
        .map(|c| table.numeric(c))
        .collect::<Result<Vec<_>, _>>()?;
    let offset = usize::from(intercept);
    let mut x = Array2::<f64>::zeros((rows.len(), columns.len() + offset));
    for (i, &row) in rows.iter().enumerate() {
        if intercept {
            x[[i, 0]] = 1.0;
        }
        for (j, col) in data.iter().enumerate() {
            x[[i, j + offset]] = col[row].unwrap_or(f64::NAN);
        }
    }
    Ok(x)
}

pub fn gather_vector(table: &Table, rows: &[usize], column: &str) -> Result<Array1<f64>, RegressionError> {
    let values = table.numeric(column)?;
    Ok(rows.iter().map(|&r| values[r].unwrap_or(f64::NAN)).collect())
}

/// Builds the design for `outcome ~ regressors`, with an implicit constant
/// named [`INTERCEPT`] when `intercept` is set.
pub fn build_design(
    table: &Table,
    outcome: &str,
    regressors: &[&str],
    intercept: bool,
) -> Result<Design, RegressionError> {
    let mut used: Vec<&str> = Vec::with_capacity(regressors.len() + 1);
    used.push(outcome);
    used.extend_from_slice(regressors);
    let rows = complete_rows(table, &used)?;

    let mut names = Vec::with_capacity(regressors.len() + 1);
    if intercept {
        names.push(INTERCEPT.to_string());
    }
    names.extend(regressors.iter().map(|r| r.to_string()));

    Ok(Design {
        names,
        x: gather_matrix(table, &rows, regressors, intercept)?,
        y: gather_vector(table, &rows, outcome)?,
    })
}

/// Rejects designs that cannot produce a residual variance.
pub fn check_sample(model: &str, n_obs: usize, n_params: usize) -> Result<(), RegressionError> {
    if n_obs == 0 {
        return Err(RegressionError::EmptySample {
            model: model.to_string(),
        });
    }
    if n_obs <= n_params {
        return Err(RegressionError::InsufficientDegreesOfFreedom {
            model: model.to_string(),
            n_obs,
            n_params,
        });
    }
    Ok(())
}

/// The pieces of a least-squares solve that inference needs.
#[derive(Debug, Clone)]
pub struct LeastSquares {
    pub beta: Array1<f64>,
    /// `(X'X)^{-1}`.
    pub xtx_inv: Array2<f64>,
    pub fitted: Array1<f64>,
}

/// Solves `min ||y - X b||` through a thin QR of `X`.
///
/// Works on `R` rather than the normal equations so collinear columns show up
/// as vanishing diagonal entries and can be named in the error.
pub fn solve_least_squares(
    x: &Array2<f64>,
    y: &Array1<f64>,
    names: &[String],
    model: &str,
) -> Result<LeastSquares, RegressionError> {
    let (q, r) = x.qr()?;
    let pivots: Vec<f64> = r.diag().iter().map(|v| v.abs()).collect();
    let largest = pivots.iter().copied().fold(0.0_f64, f64::max);
    for (j, pivot) in pivots.iter().enumerate() {
        if largest == 0.0 || *pivot <= SINGULARITY_TOLERANCE * largest {
            return Err(RegressionError::Singular {
                model: model.to_string(),
                column: names.get(j).cloned().unwrap_or_else(|| format!("x{j}")),
            });
        }
    }

    let r_inv = r.inv()?;
    let beta = r_inv.dot(&q.t().dot(y));
    let xtx_inv = r_inv.dot(&r_inv.t());
    let fitted = x.dot(&beta);
    Ok(LeastSquares {
        beta,
        xtx_inv,
        fitted,
    })
}

pub fn sum_of_squares(values: &Array1<f64>) -> f64 {
    values.dot(values)
}

pub fn centered_sum_of_squares(values: &Array1<f64>) -> f64 {
    match values.mean() {
        Some(mean) => values.iter().map(|v| (v - mean).powi(2)).sum(),
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn deletes_rows_with_any_missing_value() {
        let table = Table::new(vec![
            Column::numeric("y", vec![Some(1.0), Some(2.0), None, Some(4.0)]),
            Column::numeric("x", vec![Some(1.0), None, Some(3.0), Some(4.0)]),
            Column::numeric("unused", vec![None, None, None, None]),
        ])
        .unwrap();
        let design = build_design(&table, "y", &["x"], true).unwrap();
        assert_eq!(design.n_obs(), 2);
        assert_eq!(design.names, vec!["Intercept", "x"]);
        assert_eq!(design.x, array![[1.0, 1.0], [1.0, 4.0]]);
        assert_eq!(design.y, array![1.0, 4.0]);
    }

    #[test]
    fn recovers_exact_coefficients() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let y = array![1.0, 3.0, 5.0, 7.0];
        let names = vec!["Intercept".to_string(), "x".to_string()];
        let ls = solve_least_squares(&x, &y, &names, "test").unwrap();
        assert_abs_diff_eq!(ls.beta[0], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(ls.beta[1], 2.0, epsilon = 1e-10);
    }

    #[test]
    fn names_the_collinear_column() {
        let x = array![[1.0, 1.0, 2.0], [1.0, 2.0, 4.0], [1.0, 3.0, 6.0], [1.0, 5.0, 10.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let names: Vec<String> = ["Intercept", "a", "b"].iter().map(|s| s.to_string()).collect();
        let err = solve_least_squares(&x, &y, &names, "test").unwrap_err();
        assert!(matches!(err, RegressionError::Singular { column, .. } if column == "b"));
    }

    #[test]
    fn too_few_rows_are_rejected() {
        assert!(matches!(
            check_sample("m", 0, 2),
            Err(RegressionError::EmptySample { .. })
        ));
        assert!(matches!(
            check_sample("m", 2, 2),
            Err(RegressionError::InsufficientDegreesOfFreedom { .. })
        ));
        assert!(check_sample("m", 3, 2).is_ok());
    }
}
