// ========================================================================================
//
//                         THE ANALYSIS PIPELINE: MERGE TO IV
//
// ========================================================================================
//
// One straight line, no feedback:
//
//   merge/reconcile -> category summary -> treatment + cross-tab -> mean imputation
//   -> OLS per outcome -> correlation + first stage -> 2SLS per outcome
//
// Each stage takes the previous stage's table by reference and returns a new one,
// so any stage can be exercised alone with a synthetic table. Any failure aborts
// the run; nothing is retried or skipped.

use crate::config::{AnalysisConfig, ConfigError};
use crate::regress::correlation::{first_stage, pearson};
use crate::regress::iv::{IvEffects, IvSpec, fit_iv};
use crate::regress::ols::{OlsSpec, fit_outcomes};
use crate::regress::{EffectTable, FitResult, RegressionError};
use crate::table::crosstab::{CrossTab, TreatmentCoding, build_treatment, crosstab};
use crate::table::impute::impute_means;
use crate::table::merge::{JoinKeys, merge};
use crate::table::summary::{CategorySummary, summarize};
use crate::table::{Table, TableError};
use thiserror::Error;

/// |r| below which the instrument is treated as uncorrelated with the treatment.
pub const ZERO_CORRELATION_TOLERANCE: f64 = 1e-12;

pub const ROW_AXIS_LABEL: &str = "Original Treatment";
pub const COL_AXIS_LABEL: &str = "Time Limit Belief";

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("{0}")]
    Table(#[from] TableError),
    #[error("{0}")]
    Regression(#[from] RegressionError),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error(
        "Instrument '{instrument}' is uncorrelated with '{treatment}' (r = {correlation:.3e}); IV estimates would be meaningless."
    )]
    UncorrelatedInstrument {
        instrument: String,
        treatment: String,
        correlation: f64,
    },
}

/// The failure taxonomy every error maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required column or identifier is absent or malformed.
    Schema,
    /// A filter or row-wise deletion left too few rows.
    SampleRestriction,
    /// Constant or collinear regressors.
    Singularity,
    /// The instrument carries no information about the endogenous regressor.
    Identification,
    /// Files, parsing, configuration.
    Io,
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Table(e) => table_kind(e),
            AnalysisError::Regression(e) => match e {
                RegressionError::Table(inner) => table_kind(inner),
                RegressionError::EmptySample { .. }
                | RegressionError::InsufficientDegreesOfFreedom { .. } => {
                    ErrorKind::SampleRestriction
                }
                RegressionError::Singular { .. }
                | RegressionError::LinearSystemSolveFailed(_)
                | RegressionError::Shape(_)
                | RegressionError::Distribution(_) => ErrorKind::Singularity,
                // Correlation is only computed to check instrument relevance.
                RegressionError::NotIdentified { .. } | RegressionError::ZeroVariance(_) => {
                    ErrorKind::Identification
                }
                RegressionError::RegressorNotInModel { .. } => ErrorKind::Schema,
            },
            AnalysisError::Config(ConfigError::Invalid(_)) => ErrorKind::Schema,
            AnalysisError::Config(_) => ErrorKind::Io,
            AnalysisError::UncorrelatedInstrument { .. } => ErrorKind::Identification,
        }
    }
}

fn table_kind(error: &TableError) -> ErrorKind {
    match error {
        TableError::PolarsError(_) | TableError::IoError(_) | TableError::UnsupportedFormat(_) => {
            ErrorKind::Io
        }
        TableError::EmptySample { .. } | TableError::NoObservedValues(_) => {
            ErrorKind::SampleRestriction
        }
        TableError::ColumnNotFound { .. }
        | TableError::IdentifierMissing { .. }
        | TableError::DuplicateIdentifier { .. }
        | TableError::DuplicateColumn(_)
        | TableError::LengthMismatch { .. }
        | TableError::ColumnWrongType { .. } => ErrorKind::Schema,
    }
}

/// Sample sizes through the merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeCounts {
    pub admin_rows: usize,
    pub survey_rows: usize,
    pub matched_rows: usize,
}

/// Every product of a run, in pipeline order.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub merge: MergeCounts,
    pub summary: CategorySummary,
    pub crosstab: CrossTab,
    /// Rows left after restricting to definite belief answers.
    pub analysis_rows: usize,
    pub ols: EffectTable,
    pub correlation: f64,
    pub first_stage: FitResult,
    pub iv: IvEffects,
}

/// Runs steps 2-8 on two loaded sources.
pub fn run_analysis(
    admin: &Table,
    survey: &Table,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, AnalysisError> {
    config.validate()?;
    let level = config.confidence_level;

    // --- Stage 2: merge and reconcile ---
    let keys = JoinKeys {
        identifier: &config.identifier,
        primary_suffix: &config.primary_suffix,
        secondary_suffix: &config.secondary_suffix,
    };
    let merged = merge(admin, survey, &keys)?;
    if merged.table.height() == 0 {
        return Err(TableError::EmptySample {
            stage: format!("joining on '{}'", config.identifier),
        }
        .into());
    }
    let counts = MergeCounts {
        admin_rows: merged.primary_rows,
        survey_rows: merged.secondary_rows,
        matched_rows: merged.matched_rows,
    };

    // --- Stage 3: category summary ---
    let summary = summarize(&merged.table, &config.belief_field)?;

    // --- Stage 4: treatment indicator and cross-tab ---
    let coding = TreatmentCoding {
        belief_field: &config.belief_field,
        treatment: &config.treatment,
        believed_code: config.believed_code,
        not_believed_code: config.not_believed_code,
    };
    let treated = build_treatment(&merged.table, &coding)?;
    let xtab = crosstab(
        &treated,
        &config.instrument,
        &config.treatment,
        ROW_AXIS_LABEL,
        COL_AXIS_LABEL,
    )?;

    // --- Stage 5: mean imputation ---
    let imputed = impute_means(&treated, &config.imputed_covariates)?;

    // --- Stage 6: OLS per outcome ---
    let ols_spec = OlsSpec {
        outcomes: &config.ols_outcomes,
        treatment: &config.treatment,
        covariates: &config.ols_covariates,
    };
    let ols = fit_outcomes(&imputed, &ols_spec, level)?;

    // --- Stage 7: instrument relevance ---
    let correlation = pearson(&imputed, &config.instrument, &config.treatment)?;
    log::info!(
        "Correlation between '{}' and '{}': {correlation:.4}",
        config.instrument,
        config.treatment
    );
    if correlation.abs() < ZERO_CORRELATION_TOLERANCE {
        return Err(AnalysisError::UncorrelatedInstrument {
            instrument: config.instrument.clone(),
            treatment: config.treatment.clone(),
            correlation,
        });
    }
    let first = first_stage(&imputed, &config.instrument, &config.treatment, level)?;

    // --- Stage 8: 2SLS per outcome ---
    let with_constant = imputed.with_constant(&config.constant_column)?;
    let iv_spec = IvSpec {
        outcomes: &config.iv_outcomes,
        controls: &config.iv_controls,
        endogenous: &config.treatment,
        instrument: &config.instrument,
        covariance: config.iv_covariance,
    };
    let iv = fit_iv(&with_constant, &iv_spec, level)?;

    Ok(AnalysisReport {
        merge: counts,
        summary,
        crosstab: xtab,
        analysis_rows: treated.height(),
        ols,
        correlation,
        first_stage: first,
        iv,
    })
}
