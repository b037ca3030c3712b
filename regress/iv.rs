//! # Instrumental Variables / Two-Stage Least Squares
//!
//! One endogenous regressor, one excluded instrument: the exactly identified
//! case, so no over-identification test exists or is attempted.
//!
//! Unlike [`super::ols`], this estimator adds no constant. The exogenous
//! control list must carry an explicit column of ones if the model needs an
//! intercept (see [`crate::table::Table::with_constant`]).
//!
//! Coefficients are ordered controls first, endogenous regressor last.
//! Inference is asymptotic (normal reference distribution), with either a
//! heteroskedasticity-robust or a homoskedastic covariance.
//!
//! # References
//!
//! - Wooldridge, *Econometric Analysis of Cross Section and Panel Data*, Ch. 5.
//! - Stock & Yogo (2005), "Testing for weak instruments in linear IV regression."

use super::design::{
    RegressionError, centered_sum_of_squares, check_sample, complete_rows, gather_matrix,
    gather_vector, solve_least_squares, sum_of_squares,
};
use super::inference::{EffectRow, EffectTable, FitResult, ReferenceDistribution, coefficient_rows};
use crate::table::Table;
use ndarray::{Array1, Array2, Axis, concatenate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Stock–Yogo critical value (10% maximal IV size) for one endogenous
/// regressor and one instrument.
pub const STOCK_YOGO_10_CRITICAL_F: f64 = 16.38;

/// Partial R² at or below which the instrument is treated as irrelevant.
pub const IDENTIFICATION_TOLERANCE: f64 = 1e-12;

/// Parameter covariance estimator for the second stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IvCovariance {
    /// White/HC0 sandwich.
    #[default]
    Robust,
    /// `sigma^2 (X_hat' X_hat)^{-1}` with `sigma^2 = RSS / n`.
    Unadjusted,
}

/// Variable roles of an IV batch.
#[derive(Debug, Clone)]
pub struct IvSpec<'a> {
    pub outcomes: &'a [String],
    /// Exogenous controls, including the explicit constant column.
    pub controls: &'a [String],
    pub endogenous: &'a str,
    pub instrument: &'a str,
    pub covariance: IvCovariance,
}

/// First-stage diagnostics for the single endogenous regressor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirstStageDiagnostics {
    /// F statistic for the excluded instrument.
    pub f_stat: f64,
    pub r_squared: f64,
    /// Share of the endogenous regressor's residual variation (after controls)
    /// explained by the instrument.
    pub partial_r_squared: f64,
    pub passes_stock_yogo_10: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IvFit {
    pub fit: FitResult,
    pub first_stage: FirstStageDiagnostics,
}

/// Fits `outcome ~ controls + [endogenous ~ instrument]` by 2SLS.
pub fn fit_2sls(
    table: &Table,
    outcome: &str,
    spec: &IvSpec<'_>,
    level: f64,
) -> Result<IvFit, RegressionError> {
    let controls: Vec<&str> = spec.controls.iter().map(String::as_str).collect();
    let model = format!(
        "{outcome} ~ {} + [{} ~ {}]",
        controls.join(" + "),
        spec.endogenous,
        spec.instrument
    );

    let mut used: Vec<&str> = Vec::with_capacity(controls.len() + 3);
    used.push(outcome);
    used.extend_from_slice(&controls);
    used.push(spec.endogenous);
    used.push(spec.instrument);
    let rows = complete_rows(table, &used)?;

    let k = controls.len() + 1;
    let n = rows.len();
    check_sample(&model, n, k)?;

    let w = gather_matrix(table, &rows, &controls, false)?;
    let d = gather_vector(table, &rows, spec.endogenous)?;
    let z = gather_vector(table, &rows, spec.instrument)?;
    let y = gather_vector(table, &rows, outcome)?;

    let mut names: Vec<String> = spec.controls.to_vec();
    names.push(spec.endogenous.to_string());
    let mut instrument_names: Vec<String> = spec.controls.to_vec();
    instrument_names.push(spec.instrument.to_string());

    // ---- First stage: endogenous on [controls | instrument] ----
    let z_full = append_column(&w, &z)?;
    // Controls come first, so a singular instrument column means it adds
    // nothing the controls do not already span.
    let unrestricted = solve_least_squares(&z_full, &d, &instrument_names, &model).map_err(
        |e| match e {
            RegressionError::Singular { column, .. } if column == spec.instrument => {
                RegressionError::NotIdentified {
                    instrument: spec.instrument.to_string(),
                    endogenous: spec.endogenous.to_string(),
                    partial_r_squared: 0.0,
                }
            }
            other => other,
        },
    )?;
    let d_hat = unrestricted.fitted;
    let rss_unrestricted = sum_of_squares(&(&d - &d_hat));

    let rss_restricted = if controls.is_empty() {
        sum_of_squares(&d)
    } else {
        let restricted = solve_least_squares(&w, &d, spec.controls, &model)?;
        sum_of_squares(&(&d - &restricted.fitted))
    };

    let partial_r_squared = if rss_restricted > 0.0 {
        (rss_restricted - rss_unrestricted) / rss_restricted
    } else {
        0.0
    };
    if partial_r_squared <= IDENTIFICATION_TOLERANCE {
        return Err(RegressionError::NotIdentified {
            instrument: spec.instrument.to_string(),
            endogenous: spec.endogenous.to_string(),
            partial_r_squared,
        });
    }

    let first_stage_dof = n.saturating_sub(k);
    let f_stat = if first_stage_dof == 0 {
        f64::NAN
    } else if rss_unrestricted > 0.0 {
        (rss_restricted - rss_unrestricted) / (rss_unrestricted / first_stage_dof as f64)
    } else {
        f64::INFINITY
    };
    let tss_d = centered_sum_of_squares(&d);
    let first_stage = FirstStageDiagnostics {
        f_stat,
        r_squared: if tss_d > 0.0 {
            1.0 - rss_unrestricted / tss_d
        } else {
            f64::NAN
        },
        partial_r_squared,
        passes_stock_yogo_10: f_stat > STOCK_YOGO_10_CRITICAL_F,
    };
    // ---- Second stage: outcome on [controls | fitted endogenous] ----
    let x_hat = append_column(&w, &d_hat)?;
    let second = solve_least_squares(&x_hat, &y, &names, &model)?;

    // Residuals use the observed endogenous regressor, not its fitted value.
    let x = append_column(&w, &d)?;
    let residuals = &y - &x.dot(&second.beta);
    let rss = sum_of_squares(&residuals);

    let covariance = match spec.covariance {
        IvCovariance::Unadjusted => second.xtx_inv.mapv(|v| v * rss / n as f64),
        IvCovariance::Robust => {
            let scores = &x_hat * &residuals.view().insert_axis(Axis(1));
            let meat = scores.t().dot(&scores);
            second.xtx_inv.dot(&meat).dot(&second.xtx_inv)
        }
    };
    let std_errors = covariance.diag().mapv(|v| v.max(0.0).sqrt());
    let coefficients = coefficient_rows(
        &names,
        &second.beta,
        &std_errors,
        ReferenceDistribution::Normal,
        level,
    )?;

    let tss = centered_sum_of_squares(&y);
    let df_resid = n - k;
    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { f64::NAN };
    log::debug!(
        "Fitted '{model}' on {n} observations, first-stage F {:.3}",
        first_stage.f_stat
    );

    Ok(IvFit {
        fit: FitResult {
            model,
            outcome: outcome.to_string(),
            coefficients,
            n_obs: n,
            df_resid,
            r_squared,
            adj_r_squared: 1.0 - (1.0 - r_squared) * (n - 1) as f64 / df_resid as f64,
            f_stat: None,
            reference: ReferenceDistribution::Normal,
        },
        first_stage,
    })
}

/// One row per outcome of the IV batch, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IvEffects {
    pub effects: EffectTable,
    pub first_stages: Vec<FirstStageDiagnostics>,
}

/// Fits the IV model for every outcome and extracts the endogenous row.
pub fn fit_iv(table: &Table, spec: &IvSpec<'_>, level: f64) -> Result<IvEffects, RegressionError> {
    log::info!(
        "Fitting {} IV models: '{}' instrumented by '{}' with {} controls",
        spec.outcomes.len(),
        spec.endogenous,
        spec.instrument,
        spec.controls.len()
    );
    let fits = spec
        .outcomes
        .par_iter()
        .map(|outcome| {
            let iv = fit_2sls(table, outcome, spec, level)?;
            let row = EffectRow::from_fit(&iv.fit, spec.endogenous)?;
            Ok((row, iv.first_stage))
        })
        .collect::<Result<Vec<_>, RegressionError>>()?;
    let (rows, first_stages): (Vec<_>, Vec<_>) = fits.into_iter().unzip();
    if let Some(weakest) = weakest_first_stage(&first_stages) {
        log::warn!(
            "Weak instrument '{}': first-stage F = {weakest:.3} is below the Stock-Yogo 10% critical value {STOCK_YOGO_10_CRITICAL_F}",
            spec.instrument
        );
    }
    Ok(IvEffects {
        effects: EffectTable {
            regressor: spec.endogenous.to_string(),
            rows,
        },
        first_stages,
    })
}

/// Smallest first-stage F among fits that miss the Stock–Yogo threshold.
pub fn weakest_first_stage(first_stages: &[FirstStageDiagnostics]) -> Option<f64> {
    first_stages
        .iter()
        .filter(|f| !f.passes_stock_yogo_10)
        .map(|f| f.f_stat)
        .reduce(f64::min)
}

fn append_column(matrix: &Array2<f64>, column: &Array1<f64>) -> Result<Array2<f64>, RegressionError> {
    let column = column.view().insert_axis(Axis(1));
    if matrix.ncols() == 0 {
        return Ok(column.to_owned());
    }
    Ok(concatenate(Axis(1), &[matrix.view(), column])?)
}
