//! # Ordinary Least Squares
//!
//! `outcome ~ 1 + regressors` with classical standard errors. The constant is
//! always added here; callers never list it.

use super::design::{
    RegressionError, build_design, centered_sum_of_squares, check_sample, solve_least_squares,
    sum_of_squares,
};
use super::inference::{EffectRow, EffectTable, FitResult, ReferenceDistribution, coefficient_rows};
use crate::table::Table;
use itertools::Itertools;
use rayon::prelude::*;

/// The regressors shared by every outcome of an OLS batch.
#[derive(Debug, Clone)]
pub struct OlsSpec<'a> {
    pub outcomes: &'a [String],
    pub treatment: &'a str,
    pub covariates: &'a [String],
}

impl OlsSpec<'_> {
    /// Treatment first, then covariates, as they appear in the formula.
    pub fn regressors(&self) -> Vec<&str> {
        std::iter::once(self.treatment)
            .chain(self.covariates.iter().map(String::as_str))
            .collect()
    }
}

/// Human-readable formula, e.g. `vrecc217 ~ TLyes + male + black`.
pub fn formula(outcome: &str, regressors: &[&str]) -> String {
    format!("{} ~ {}", outcome, regressors.iter().join(" + "))
}

/// Fits a single OLS model with an implicit intercept.
pub fn fit_ols(
    table: &Table,
    outcome: &str,
    regressors: &[&str],
    level: f64,
) -> Result<FitResult, RegressionError> {
    let model = formula(outcome, regressors);
    let design = build_design(table, outcome, regressors, true)?;
    let (n, k) = (design.n_obs(), design.n_params());
    check_sample(&model, n, k)?;

    let ls = solve_least_squares(&design.x, &design.y, &design.names, &model)?;
    let residuals = &design.y - &ls.fitted;
    let rss = sum_of_squares(&residuals);
    let tss = centered_sum_of_squares(&design.y);
    let df_resid = n - k;
    let sigma2 = rss / df_resid as f64;

    let std_errors = ls.xtx_inv.diag().mapv(|v| (sigma2 * v).max(0.0).sqrt());
    let reference = ReferenceDistribution::StudentT {
        df: df_resid as f64,
    };
    let coefficients = coefficient_rows(&design.names, &ls.beta, &std_errors, reference, level)?;

    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { f64::NAN };
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n - 1) as f64 / df_resid as f64;
    let f_stat = (k > 1 && rss > 0.0)
        .then(|| ((tss - rss) / (k - 1) as f64) / (rss / df_resid as f64));

    log::debug!("Fitted '{model}' on {n} observations, R-squared {r_squared:.4}");

    Ok(FitResult {
        model,
        outcome: outcome.to_string(),
        coefficients,
        n_obs: n,
        df_resid,
        r_squared,
        adj_r_squared,
        f_stat,
        reference,
    })
}

/// Fits one model per outcome and extracts the treatment row of each.
///
/// Outcomes are estimated independently, in parallel; the returned rows follow
/// `spec.outcomes` exactly.
pub fn fit_outcomes(
    table: &Table,
    spec: &OlsSpec<'_>,
    level: f64,
) -> Result<EffectTable, RegressionError> {
    let regressors = spec.regressors();
    log::info!(
        "Fitting {} OLS models on {} regressors plus intercept",
        spec.outcomes.len(),
        regressors.len()
    );
    let rows = spec
        .outcomes
        .par_iter()
        .map(|outcome| {
            let fit = fit_ols(table, outcome, &regressors, level)?;
            EffectRow::from_fit(&fit, spec.treatment)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(EffectTable {
        regressor: spec.treatment.to_string(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use approx::assert_abs_diff_eq;

    fn line_with_noise() -> Table {
        // y = 2 + 3x + e with a fixed residual pattern.
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let noise = [0.5, -0.5, 0.3, -0.3, 0.1, -0.1, 0.2, -0.2, 0.4, -0.4];
        let y: Vec<f64> = x.iter().zip(noise).map(|(x, e)| 2.0 + 3.0 * x + e).collect();
        Table::new(vec![Column::dense("y", &y), Column::dense("x", &x)]).unwrap()
    }

    #[test]
    fn formula_lists_regressors_in_order() {
        assert_eq!(formula("y", &["TLyes", "male"]), "y ~ TLyes + male");
    }

    #[test]
    fn simple_regression_matches_closed_form() {
        let table = line_with_noise();
        let fit = fit_ols(&table, "y", &["x"], 0.95).unwrap();
        assert_eq!(fit.names(), vec!["Intercept", "x"]);
        assert_eq!(fit.n_obs, 10);
        assert_eq!(fit.df_resid, 8);

        let x = table.numeric("x").unwrap();
        let y = table.numeric("y").unwrap();
        let xs: Vec<f64> = x.iter().flatten().copied().collect();
        let ys: Vec<f64> = y.iter().flatten().copied().collect();
        let xbar = xs.iter().sum::<f64>() / 10.0;
        let ybar = ys.iter().sum::<f64>() / 10.0;
        let sxx: f64 = xs.iter().map(|v| (v - xbar).powi(2)).sum();
        let sxy: f64 = xs.iter().zip(&ys).map(|(a, b)| (a - xbar) * (b - ybar)).sum();
        let slope = sxy / sxx;
        let intercept = ybar - slope * xbar;
        let rss: f64 = xs
            .iter()
            .zip(&ys)
            .map(|(a, b)| (b - intercept - slope * a).powi(2))
            .sum();
        let se_slope = (rss / 8.0 / sxx).sqrt();

        let row = fit.coefficient("x").unwrap();
        assert_abs_diff_eq!(row.estimate, slope, epsilon = 1e-10);
        assert_abs_diff_eq!(row.std_error, se_slope, epsilon = 1e-10);
        assert_abs_diff_eq!(
            fit.coefficient("Intercept").unwrap().estimate,
            intercept,
            epsilon = 1e-10
        );
        assert!(row.conf_low < slope && slope < row.conf_high);
        assert!(row.p_value < 1e-6);
        assert!(fit.r_squared > 0.99);
    }

    #[test]
    fn repeated_fits_are_identical() {
        let table = line_with_noise();
        let first = fit_ols(&table, "y", &["x"], 0.95).unwrap();
        let second = fit_ols(&table, "y", &["x"], 0.95).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn constant_regressor_is_singular() {
        let table = line_with_noise()
            .with_column(Column::dense("flat", &[1.0; 10]))
            .unwrap();
        let err = fit_ols(&table, "y", &["x", "flat"], 0.95).unwrap_err();
        assert!(matches!(err, RegressionError::Singular { column, .. } if column == "flat"));
    }

    #[test]
    fn all_missing_outcome_fails_loudly() {
        let table = line_with_noise()
            .with_column(Column::numeric("empty", vec![None; 10]))
            .unwrap();
        let err = fit_ols(&table, "empty", &["x"], 0.95).unwrap_err();
        assert!(matches!(err, RegressionError::EmptySample { .. }));
    }

    #[test]
    fn batch_preserves_outcome_order() {
        let table = line_with_noise();
        let y2: Vec<f64> = (0..10).map(|i| -(i as f64) + (i % 3) as f64).collect();
        let y3: Vec<f64> = (0..10).map(|i| 0.5 * i as f64 + (i % 2) as f64).collect();
        let treat: Vec<f64> = (0..10).map(|i| (i % 2) as f64).collect();
        let table = table
            .with_column(Column::dense("y2", &y2))
            .unwrap()
            .with_column(Column::dense("y3", &y3))
            .unwrap()
            .with_column(Column::dense("treat", &treat))
            .unwrap();

        let outcomes = vec!["y3".to_string(), "y".to_string(), "y2".to_string()];
        let covariates = vec!["x".to_string()];
        let spec = OlsSpec {
            outcomes: &outcomes,
            treatment: "treat",
            covariates: &covariates,
        };
        let effects = fit_outcomes(&table, &spec, 0.95).unwrap();
        assert_eq!(effects.outcomes(), vec!["y3", "y", "y2"]);
        for row in &effects.rows {
            assert!((row.coefficient / row.std_error - row.t_stat).abs() < 1e-9);
            let single = fit_ols(&table, &row.outcome, &["treat", "x"], 0.95).unwrap();
            assert_eq!(single.coefficient("treat").unwrap().estimate, row.coefficient);
        }
    }
}
