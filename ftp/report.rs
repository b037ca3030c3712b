//! # Report Output
//!
//! Writes each product of an [`AnalysisReport`] as its own tab-separated file and
//! renders a plain-text overview for the terminal. Values and column order are
//! stable; the text layout is not.

use crate::pipeline::AnalysisReport;
use crate::regress::{CoefficientRow, EffectTable};
use crate::table::crosstab::CrossTab;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to encode TSV record: {0}")]
    CsvError(#[from] csv::Error),
}

pub const SUMMARY_FILE: &str = "summary.tsv";
pub const CROSSTAB_FILE: &str = "crosstab.tsv";
pub const OLS_FILE: &str = "ols.tsv";
pub const FIRST_STAGE_FILE: &str = "first_stage.tsv";
pub const IV_FILE: &str = "iv.tsv";

const TOTAL_LABEL: &str = "Total";

fn tsv_writer(path: &Path) -> Result<csv::Writer<fs::File>, ReportError> {
    Ok(csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)?)
}

impl AnalysisReport {
    /// Writes every table into `dir`, creating it if needed. Returns the paths written.
    pub fn write_tsv(&self, dir: &Path) -> Result<Vec<PathBuf>, ReportError> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(5);

        let path = dir.join(SUMMARY_FILE);
        let mut writer = tsv_writer(&path)?;
        for row in &self.summary.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        written.push(path);

        let path = dir.join(CROSSTAB_FILE);
        let mut writer = tsv_writer(&path)?;
        for record in crosstab_records(&self.crosstab) {
            writer.write_record(&record)?;
        }
        writer.flush()?;
        written.push(path);

        let path = dir.join(OLS_FILE);
        write_effects(&path, &self.ols)?;
        written.push(path);

        let path = dir.join(FIRST_STAGE_FILE);
        let mut writer = tsv_writer(&path)?;
        for row in &self.first_stage.coefficients {
            writer.serialize(row)?;
        }
        writer.flush()?;
        written.push(path);

        let path = dir.join(IV_FILE);
        let mut writer = tsv_writer(&path)?;
        writer.write_record([
            "outcome",
            "n_obs",
            "coefficient",
            "std_error",
            "t_stat",
            "p_value",
            "conf_low",
            "conf_high",
            "first_stage_f",
        ])?;
        for (row, first) in self.iv.effects.rows.iter().zip(&self.iv.first_stages) {
            writer.write_record([
                row.outcome.clone(),
                row.n_obs.to_string(),
                row.coefficient.to_string(),
                row.std_error.to_string(),
                row.t_stat.to_string(),
                row.p_value.to_string(),
                row.conf_low.to_string(),
                row.conf_high.to_string(),
                first.f_stat.to_string(),
            ])?;
        }
        writer.flush()?;
        written.push(path);

        log::info!("Wrote {} report tables to '{}'", written.len(), dir.display());
        Ok(written)
    }

    /// Plain-text overview of the whole run.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out).ok();
        out
    }

    fn render_into(&self, out: &mut String) -> std::fmt::Result {
        writeln!(
            out,
            "Sample: {} admin records, {} survey records, {} matched on the identifier.\n",
            self.merge.admin_rows, self.merge.survey_rows, self.merge.matched_rows
        )?;

        writeln!(out, "Responses to '{}':", self.summary.field)?;
        for row in &self.summary.rows {
            writeln!(out, "  {:<20} {:>8}", row.label, row.count)?;
        }
        if self.summary.out_of_range > 0 {
            writeln!(
                out,
                "  ({} responses carried unrecognized codes)",
                self.summary.out_of_range
            )?;
        }
        writeln!(out)?;

        writeln!(
            out,
            "Cross-tabulation of {} (rows) vs. {} (columns), {} respondents:",
            self.crosstab.row_label, self.crosstab.col_label, self.analysis_rows
        )?;
        for record in crosstab_records(&self.crosstab) {
            let cells: Vec<String> = record.iter().map(|c| format!("{c:>18}")).collect();
            writeln!(out, "{}", cells.join(""))?;
        }
        writeln!(out)?;

        writeln!(out, "OLS effect of '{}':", self.ols.regressor)?;
        render_effects(out, &self.ols)?;
        writeln!(out)?;

        writeln!(out, "Correlation of instrument and treatment: {:.6}", self.correlation)?;
        writeln!(out, "First stage: {}", self.first_stage.model)?;
        render_coefficients(out, &self.first_stage.coefficients)?;
        writeln!(
            out,
            "  n = {}, R-squared = {:.4}{}",
            self.first_stage.n_obs,
            self.first_stage.r_squared,
            self.first_stage
                .f_stat
                .map(|f| format!(", F = {f:.3}"))
                .unwrap_or_default()
        )?;
        writeln!(out)?;

        writeln!(out, "IV effect of '{}':", self.iv.effects.regressor)?;
        render_effects(out, &self.iv.effects)?;
        Ok(())
    }
}

fn write_effects(path: &Path, effects: &EffectTable) -> Result<(), ReportError> {
    let mut writer = tsv_writer(path)?;
    for row in &effects.rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Header row, one row per level with its total, then the column totals.
fn crosstab_records(tab: &CrossTab) -> Vec<Vec<String>> {
    let mut records = Vec::with_capacity(tab.row_levels.len() + 2);
    let mut header = vec![format!("{} \\ {}", tab.row_label, tab.col_label)];
    header.extend(tab.col_levels.iter().map(|l| l.to_string()));
    header.push(TOTAL_LABEL.to_string());
    records.push(header);

    let row_totals = tab.row_totals();
    for (i, level) in tab.row_levels.iter().enumerate() {
        let mut record = vec![level.to_string()];
        record.extend(tab.counts.row(i).iter().map(|c| c.to_string()));
        record.push(row_totals[i].to_string());
        records.push(record);
    }

    let mut totals = vec![TOTAL_LABEL.to_string()];
    totals.extend(tab.col_totals().iter().map(|c| c.to_string()));
    totals.push(tab.grand_total().to_string());
    records.push(totals);
    records
}

fn render_effects(out: &mut String, effects: &EffectTable) -> std::fmt::Result {
    writeln!(
        out,
        "  {:<10} {:>6} {:>11} {:>10} {:>8} {:>8} {:>11} {:>11}",
        "outcome", "n", "coef", "std err", "t", "p", "[low", "high]"
    )?;
    for row in &effects.rows {
        writeln!(
            out,
            "  {:<10} {:>6} {:>11.5} {:>10.5} {:>8.3} {:>8.4} {:>11.5} {:>11.5}",
            row.outcome,
            row.n_obs,
            row.coefficient,
            row.std_error,
            row.t_stat,
            row.p_value,
            row.conf_low,
            row.conf_high
        )?;
    }
    Ok(())
}

fn render_coefficients(out: &mut String, rows: &[CoefficientRow]) -> std::fmt::Result {
    for row in rows {
        writeln!(
            out,
            "  {:<10} {:>11.5} {:>10.5} {:>8.3} {:>8.4}",
            row.name, row.estimate, row.std_error, row.t_stat, row.p_value
        )?;
    }
    Ok(())
}
