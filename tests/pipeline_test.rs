use approx::assert_abs_diff_eq;
use ftp_analysis::config::AnalysisConfig;
use ftp_analysis::pipeline::{ErrorKind, run_analysis};
use ftp_analysis::regress::iv::IvCovariance;
use ftp_analysis::report::{CROSSTAB_FILE, FIRST_STAGE_FILE, IV_FILE, OLS_FILE, SUMMARY_FILE};
use ftp_analysis::table::crosstab::{TreatmentCoding, build_treatment, crosstab};
use ftp_analysis::table::impute::impute_means;
use ftp_analysis::table::load::load_table;
use ftp_analysis::table::merge::{JoinKeys, merge};
use ftp_analysis::table::{Column, Table};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const TRUE_EFFECT: f64 = 2.0;

fn keys() -> JoinKeys<'static> {
    JoinKeys {
        identifier: "sampleid",
        primary_suffix: "_x",
        secondary_suffix: "_y",
    }
}

fn coding() -> TreatmentCoding<'static> {
    TreatmentCoding {
        belief_field: "fmi2",
        treatment: "TLyes",
        believed_code: 1.0,
        not_believed_code: 2.0,
    }
}

/// A small schema with the same shape as the study: one imputed covariate,
/// one fully observed covariate, two outcomes, one column present in both files.
fn synthetic_config() -> AnalysisConfig {
    let s = |v: &[&str]| v.iter().map(|c| c.to_string()).collect::<Vec<_>>();
    AnalysisConfig {
        imputed_covariates: s(&["age"]),
        ols_outcomes: s(&["y1", "y2"]),
        ols_covariates: s(&["age", "prior"]),
        iv_outcomes: s(&["y1", "y2"]),
        iv_controls: s(&["age", "prior", "CONSTANT"]),
        ..AnalysisConfig::default()
    }
}

/// Writes an admin TSV and a survey CSV. Assignment shifts the chance of
/// believing in the time limit; belief shifts both outcomes by `TRUE_EFFECT`.
fn write_sources(dir: &Path, n: usize, seed: u64) -> (std::path::PathBuf, std::path::PathBuf) {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 1.0).unwrap();

    let mut admin = String::from("sampleid\te\tage\tprior\tcohort\ty1\ty2\n");
    let mut survey = String::from("sampleid,fmi2,cohort\n");

    for id in 1..=n {
        let e = if rng.r#gen::<f64>() < 0.5 { 1.0 } else { 0.0 };
        let believe_prob = 0.2 + 0.5 * e;
        let u: f64 = rng.r#gen();
        let fmi2 = if u < believe_prob {
            1
        } else if u < 0.9 {
            2
        } else {
            3
        };
        let tl = if fmi2 == 1 { 1.0 } else { 0.0 };
        let age: f64 = 20.0 + 30.0 * rng.r#gen::<f64>();
        let prior: f64 = noise.sample(&mut rng);
        let y1 = 1.0 + TRUE_EFFECT * tl + 0.05 * age + 0.5 * prior + noise.sample(&mut rng);
        let y2 = -1.0 + TRUE_EFFECT * tl - 0.02 * age + noise.sample(&mut rng);

        let age_cell = if id % 10 == 0 {
            String::new()
        } else {
            format!("{age}")
        };
        writeln!(admin, "{id}\t{e}\t{age_cell}\t{prior}\t1\t{y1}\t{y2}").unwrap();
        writeln!(survey, "{id},{fmi2},2").unwrap();
    }
    // Survey-only respondents never reach the analysis.
    for id in (n + 1)..=(n + 5) {
        writeln!(survey, "{id},1,2").unwrap();
    }

    let admin_path = dir.join("admin.tsv");
    let survey_path = dir.join("survey.csv");
    fs::write(&admin_path, admin).unwrap();
    fs::write(&survey_path, survey).unwrap();
    (admin_path, survey_path)
}

#[test]
fn merge_treatment_and_crosstab_follow_the_worked_example() {
    let admin = Table::new(vec![
        Column::dense("sampleid", &[1.0, 2.0, 3.0]),
        Column::dense("e", &[1.0, 0.0, 1.0]),
    ])
    .unwrap();
    let survey = Table::new(vec![
        Column::dense("sampleid", &[1.0, 2.0, 3.0]),
        Column::dense("fmi2", &[1.0, 2.0, 3.0]),
    ])
    .unwrap();

    let merged = merge(&admin, &survey, &keys()).unwrap();
    assert_eq!(merged.table.height(), 3);

    let treated = build_treatment(&merged.table, &coding()).unwrap();
    assert_eq!(treated.height(), 2);
    assert_eq!(
        treated.numeric("TLyes").unwrap(),
        &[Some(1.0), Some(0.0)][..]
    );

    let tab = crosstab(&treated, "e", "TLyes", "Original Treatment", "Time Limit Belief").unwrap();
    assert_eq!(tab.cell(1.0, 1.0), Some(1));
    assert_eq!(tab.cell(0.0, 0.0), Some(1));
    assert_eq!(tab.cell(1.0, 0.0), Some(0));
    assert_eq!(tab.row_totals().to_vec(), vec![1, 1]);
    assert_eq!(tab.col_totals().to_vec(), vec![1, 1]);
    assert_eq!(tab.grand_total(), 2);
}

#[test]
fn imputation_fills_the_observed_mean() {
    let table = Table::new(vec![Column::numeric(
        "age",
        vec![Some(20.0), None, Some(40.0)],
    )])
    .unwrap();
    let imputed = impute_means(&table, &["age".to_string()]).unwrap();
    assert_eq!(
        imputed.numeric("age").unwrap(),
        &[Some(20.0), Some(30.0), Some(40.0)][..]
    );
}

#[test]
fn full_run_from_files_recovers_the_belief_effect() {
    let dir = tempdir().unwrap();
    let n = 2000;
    let (admin_path, survey_path) = write_sources(dir.path(), n, 7);

    let admin = load_table(&admin_path).unwrap();
    let survey = load_table(&survey_path).unwrap();
    let config = synthetic_config();
    let report = run_analysis(&admin, &survey, &config).unwrap();

    assert_eq!(report.merge.admin_rows, n);
    assert_eq!(report.merge.survey_rows, n + 5);
    assert_eq!(report.merge.matched_rows, n);
    assert_eq!(report.summary.valid_total(), n);
    assert_eq!(report.summary.out_of_range, 0);
    assert_eq!(report.crosstab.grand_total(), report.analysis_rows);
    assert!(report.analysis_rows < n);

    // Mean imputation keeps every analysis row in the OLS sample.
    for row in &report.ols.rows {
        assert_eq!(row.n_obs, report.analysis_rows);
        assert_abs_diff_eq!(row.coefficient, TRUE_EFFECT, epsilon = 0.3);
        assert!(row.p_value < 1e-6);
    }

    assert!(report.correlation > 0.2);
    assert!(report.first_stage.coefficient("e").unwrap().estimate > 0.3);

    assert_eq!(report.iv.effects.outcomes(), vec!["y1", "y2"]);
    for (row, fs) in report.iv.effects.rows.iter().zip(&report.iv.first_stages) {
        assert_abs_diff_eq!(row.coefficient, TRUE_EFFECT, epsilon = 0.6);
        assert!(row.conf_low < row.coefficient && row.coefficient < row.conf_high);
        assert!(fs.passes_stock_yogo_10);
    }

    let out = dir.path().join("results");
    let written = report.write_tsv(&out).unwrap();
    assert_eq!(written.len(), 5);
    for name in [SUMMARY_FILE, CROSSTAB_FILE, OLS_FILE, FIRST_STAGE_FILE, IV_FILE] {
        assert!(out.join(name).exists(), "missing {name}");
    }
    let iv = fs::read_to_string(out.join(IV_FILE)).unwrap();
    let lines: Vec<&str> = iv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("first_stage_f"));
    assert!(lines[1].starts_with("y1\t"));

    let rendered = report.render();
    assert!(rendered.contains("Time Limit Belief"));
    assert!(rendered.contains("y2"));
}

#[test]
fn repeated_runs_are_identical() {
    let dir = tempdir().unwrap();
    let (admin_path, survey_path) = write_sources(dir.path(), 300, 11);
    let admin = load_table(&admin_path).unwrap();
    let survey = load_table(&survey_path).unwrap();
    let config = synthetic_config();

    let first = run_analysis(&admin, &survey, &config).unwrap();
    let second = run_analysis(&admin, &survey, &config).unwrap();
    assert_eq!(first.ols, second.ols);
    assert_eq!(first.iv, second.iv);
}

#[test]
fn unadjusted_covariance_keeps_point_estimates() {
    let dir = tempdir().unwrap();
    let (admin_path, survey_path) = write_sources(dir.path(), 500, 3);
    let admin = load_table(&admin_path).unwrap();
    let survey = load_table(&survey_path).unwrap();

    let robust = run_analysis(&admin, &survey, &synthetic_config()).unwrap();
    let unadjusted_config = AnalysisConfig {
        iv_covariance: IvCovariance::Unadjusted,
        ..synthetic_config()
    };
    let unadjusted = run_analysis(&admin, &survey, &unadjusted_config).unwrap();

    for (a, b) in robust.iv.effects.rows.iter().zip(&unadjusted.iv.effects.rows) {
        assert_abs_diff_eq!(a.coefficient, b.coefficient, epsilon = 1e-12);
        assert!(a.std_error > 0.0 && b.std_error > 0.0);
    }
}

#[test]
fn unassigned_instrument_is_an_identification_failure() {
    let n = 40;
    let ids: Vec<f64> = (1..=n).map(f64::from).collect();
    let admin = Table::new(vec![
        Column::dense("sampleid", &ids),
        Column::dense("e", &vec![1.0; n as usize]),
        Column::dense("age", &(0..n).map(f64::from).collect::<Vec<_>>()),
        Column::dense("prior", &(0..n).map(|i| f64::from(i % 7)).collect::<Vec<_>>()),
        Column::dense("y1", &(0..n).map(|i| f64::from(i % 5)).collect::<Vec<_>>()),
        Column::dense("y2", &(0..n).map(|i| f64::from(i % 3)).collect::<Vec<_>>()),
    ])
    .unwrap();
    let survey = Table::new(vec![
        Column::dense("sampleid", &ids),
        Column::dense("fmi2", &(0..n).map(|i| f64::from(1 + i % 2)).collect::<Vec<_>>()),
    ])
    .unwrap();

    let err = run_analysis(&admin, &survey, &synthetic_config()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Identification);
}

#[test]
fn missing_outcome_column_is_a_schema_failure() {
    let dir = tempdir().unwrap();
    let (admin_path, survey_path) = write_sources(dir.path(), 100, 5);
    let admin = load_table(&admin_path).unwrap();
    let survey = load_table(&survey_path).unwrap();

    let mut config = synthetic_config();
    config.ols_outcomes.push("not_a_column".to_string());
    let err = run_analysis(&admin, &survey, &config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
}
