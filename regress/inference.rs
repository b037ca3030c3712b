//! # Coefficient Inference
//!
//! Standard errors become t statistics, two-sided p-values and confidence
//! bounds here. OLS uses Student's t with the residual degrees of freedom;
//! 2SLS uses the normal approximation.

use super::design::RegressionError;
use ndarray::Array1;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// The distribution test statistics are referred to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ReferenceDistribution {
    StudentT { df: f64 },
    Normal,
}

impl ReferenceDistribution {
    fn cdf_and_quantile(self, statistic: f64, probability: f64) -> Result<(f64, f64), RegressionError> {
        match self {
            ReferenceDistribution::StudentT { df } => {
                let dist = StudentsT::new(0.0, 1.0, df)
                    .map_err(|e| RegressionError::Distribution(e.to_string()))?;
                Ok((dist.cdf(statistic), dist.inverse_cdf(probability)))
            }
            ReferenceDistribution::Normal => {
                let dist = Normal::new(0.0, 1.0)
                    .map_err(|e| RegressionError::Distribution(e.to_string()))?;
                Ok((dist.cdf(statistic), dist.inverse_cdf(probability)))
            }
        }
    }
}

/// One row of a coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoefficientRow {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    /// Always `estimate / std_error`.
    pub t_stat: f64,
    pub p_value: f64,
    pub conf_low: f64,
    pub conf_high: f64,
}

/// A fitted linear model. Built once per formula and never modified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub model: String,
    pub outcome: String,
    pub coefficients: Vec<CoefficientRow>,
    pub n_obs: usize,
    pub df_resid: usize,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    /// Overall F statistic against the intercept-only model. Only defined for
    /// OLS fits that include an intercept and at least one slope.
    pub f_stat: Option<f64>,
    pub reference: ReferenceDistribution,
}

impl FitResult {
    pub fn coefficient(&self, name: &str) -> Result<&CoefficientRow, RegressionError> {
        self.coefficients
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| RegressionError::RegressorNotInModel {
                model: self.model.clone(),
                regressor: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.coefficients.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Builds coefficient rows from point estimates and standard errors at the
/// given two-sided confidence `level`.
pub fn coefficient_rows(
    names: &[String],
    beta: &Array1<f64>,
    std_errors: &Array1<f64>,
    reference: ReferenceDistribution,
    level: f64,
) -> Result<Vec<CoefficientRow>, RegressionError> {
    let upper_tail = 1.0 - (1.0 - level) / 2.0;
    names
        .iter()
        .zip(beta.iter().zip(std_errors.iter()))
        .map(|(name, (&estimate, &std_error))| {
            let t_stat = estimate / std_error;
            let (cdf, critical) = reference.cdf_and_quantile(-t_stat.abs(), upper_tail)?;
            Ok(CoefficientRow {
                name: name.clone(),
                estimate,
                std_error,
                t_stat,
                p_value: (2.0 * cdf).min(1.0),
                conf_low: estimate - critical * std_error,
                conf_high: estimate + critical * std_error,
            })
        })
        .collect()
}

/// One row of a per-outcome effect table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectRow {
    pub outcome: String,
    pub n_obs: usize,
    pub coefficient: f64,
    pub std_error: f64,
    pub t_stat: f64,
    pub p_value: f64,
    pub conf_low: f64,
    pub conf_high: f64,
}

impl EffectRow {
    pub fn from_fit(fit: &FitResult, regressor: &str) -> Result<Self, RegressionError> {
        let row = fit.coefficient(regressor)?;
        Ok(Self {
            outcome: fit.outcome.clone(),
            n_obs: fit.n_obs,
            coefficient: row.estimate,
            std_error: row.std_error,
            t_stat: row.estimate / row.std_error,
            p_value: row.p_value,
            conf_low: row.conf_low,
            conf_high: row.conf_high,
        })
    }
}

/// The effect of one regressor across a list of outcomes, in outcome order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectTable {
    pub regressor: String,
    pub rows: Vec<EffectRow>,
}

impl EffectTable {
    pub fn outcomes(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.outcome.as_str()).collect()
    }

    pub fn row(&self, outcome: &str) -> Option<&EffectRow> {
        self.rows.iter().find(|r| r.outcome == outcome)
    }
}
