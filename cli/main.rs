#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use ftp_analysis::config::AnalysisConfig;
use ftp_analysis::pipeline::run_analysis;
use ftp_analysis::table::load::load_table;

#[derive(Parser)]
#[command(
    name = "ftp-analysis",
    version,
    about = "Effect of believing in a welfare time limit: merge, OLS and IV estimates for the FTP study"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full analysis on an administrative and a survey file
    #[command(about = "Run the analysis (outputs: summary.tsv, crosstab.tsv, ols.tsv, first_stage.tsv, iv.tsv)")]
    Run {
        /// Administrative records, CSV or TSV
        #[arg(value_name = "ADMIN")]
        admin: PathBuf,

        /// Survey responses, CSV or TSV
        #[arg(value_name = "SURVEY")]
        survey: PathBuf,

        /// TOML file overriding the study's column names and settings
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Directory receiving the result tables
        #[arg(long, value_name = "DIR", default_value = "ftp_results")]
        out_dir: PathBuf,
    },

    /// Write the default configuration as TOML
    #[command(about = "Write the default configuration (outputs: ftp_config.toml)")]
    DefaultConfig {
        #[arg(long, value_name = "FILE", default_value = "ftp_config.toml")]
        out: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Run {
            admin,
            survey,
            config,
            out_dir,
        }) => run(admin, survey, config, out_dir),
        Some(Commands::DefaultConfig { out }) => write_default_config(out),
        None => Cli::command()
            .print_help()
            .map(|_| println!())
            .map_err(|e| e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(
    admin_path: PathBuf,
    survey_path: PathBuf,
    config_path: Option<PathBuf>,
    out_dir: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => {
            log::info!("Loading configuration from '{}'", path.display());
            AnalysisConfig::load(&path)?
        }
        None => AnalysisConfig::default(),
    };

    let admin = load_table(&admin_path)?;
    let survey = load_table(&survey_path)?;

    let report = match run_analysis(&admin, &survey, &config) {
        Ok(report) => report,
        Err(e) => {
            log::error!("Analysis failed ({:?} error)", e.kind());
            return Err(e.into());
        }
    };

    print!("{}", report.render());
    let written = report.write_tsv(&out_dir)?;
    for path in written {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn write_default_config(out: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    AnalysisConfig::default().save(&out)?;
    println!("Default configuration written to {}", out.display());
    Ok(())
}
