//! # Analysis Configuration
//!
//! Every column name the pipeline touches lives here rather than in the stage
//! code. `Default` reproduces the FTP time-limit study; a TOML file can
//! override any field, which is how tests substitute synthetic schemas.

use crate::regress::iv::IvCovariance;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Demographic covariates whose missing values are mean-imputed.
pub const IMPUTED_COVARIATES: [&str; 12] = [
    "male", "agelt20", "age2534", "age3544", "agege45", "black", "hisp", "otheth", "martog",
    "marapt", "nohsged", "applcant",
];

/// Pre-randomization employment, earnings and welfare history.
pub const HISTORY_COVARIATES: [&str; 11] = [
    "yremp", "emppq1", "yrearn", "yrearnsq", "pearn1", "recpc1", "yrrec", "yrkrec", "rfspc1",
    "yrrfs", "yrkrfs",
];

/// Quarterly employment rates, years 1-4 and beyond.
pub const EMPLOYMENT_OUTCOMES: [&str; 5] =
    ["vempq217", "vempq2t5", "vempq6t9", "vemp1013", "vemp1417"];

/// Quarterly welfare receipt rates.
pub const WELFARE_OUTCOMES: [&str; 5] =
    ["vrecc217", "vrecc2t5", "vrecc6t9", "vrec1013", "vrec1417"];

/// Total income.
pub const INCOME_OUTCOMES: [&str; 5] = ["tinc217", "tinc2t5", "tinc6t9", "tinc1013", "tinc1417"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Sample identifier shared by both sources.
    pub identifier: String,
    /// Appended by the join to shared admin columns; stripped afterwards.
    pub primary_suffix: String,
    /// Appended by the join to shared survey columns; those columns are dropped.
    pub secondary_suffix: String,

    /// Survey question: did the respondent believe they were subject to a time limit.
    pub belief_field: String,
    pub believed_code: f64,
    pub not_believed_code: f64,

    /// Derived belief indicator.
    pub treatment: String,
    /// Randomized assignment.
    pub instrument: String,

    pub imputed_covariates: Vec<String>,

    pub ols_outcomes: Vec<String>,
    /// OLS regressors besides the treatment. The intercept is implicit.
    pub ols_covariates: Vec<String>,

    pub iv_outcomes: Vec<String>,
    /// Exogenous IV controls. Must list `constant_column` explicitly.
    pub iv_controls: Vec<String>,
    /// Name of the literal ones column added before the IV stage.
    pub constant_column: String,
    pub iv_covariance: IvCovariance,

    /// Two-sided confidence level for reported intervals.
    pub confidence_level: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let covariates: Vec<String> = IMPUTED_COVARIATES
            .iter()
            .chain(HISTORY_COVARIATES.iter())
            .map(|s| s.to_string())
            .collect();
        let mut iv_controls = covariates.clone();
        iv_controls.push("CONSTANT".to_string());
        let iv_outcomes: Vec<String> = EMPLOYMENT_OUTCOMES
            .iter()
            .chain(WELFARE_OUTCOMES.iter())
            .chain(INCOME_OUTCOMES.iter())
            .map(|s| s.to_string())
            .collect();

        Self {
            identifier: "sampleid".to_string(),
            primary_suffix: "_x".to_string(),
            secondary_suffix: "_y".to_string(),
            belief_field: "fmi2".to_string(),
            believed_code: 1.0,
            not_believed_code: 2.0,
            treatment: "TLyes".to_string(),
            instrument: "e".to_string(),
            imputed_covariates: names(&IMPUTED_COVARIATES),
            ols_outcomes: names(&WELFARE_OUTCOMES),
            ols_covariates: covariates,
            iv_outcomes,
            iv_controls,
            constant_column: "CONSTANT".to_string(),
            iv_covariance: IvCovariance::Robust,
            confidence_level: 0.95,
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: AnalysisConfig = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Rejects configurations the pipeline could only fail on later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ols_outcomes.is_empty() {
            return Err(ConfigError::Invalid("ols_outcomes is empty".to_string()));
        }
        if self.iv_outcomes.is_empty() {
            return Err(ConfigError::Invalid("iv_outcomes is empty".to_string()));
        }
        if !self.iv_controls.contains(&self.constant_column) {
            return Err(ConfigError::Invalid(format!(
                "iv_controls must list the constant column '{}' explicitly",
                self.constant_column
            )));
        }
        if self.believed_code == self.not_believed_code {
            return Err(ConfigError::Invalid(
                "believed_code and not_believed_code must differ".to_string(),
            ));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "confidence_level must lie in (0, 1), got {}",
                self.confidence_level
            )));
        }
        if self.primary_suffix.is_empty() || self.secondary_suffix.is_empty() {
            return Err(ConfigError::Invalid(
                "join suffixes must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}
