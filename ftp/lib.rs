#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
pub mod config;
pub mod pipeline;
pub mod report;

#[path = "../table/mod.rs"]
pub mod table;

#[path = "../regress/mod.rs"]
pub mod regress;

pub use config::AnalysisConfig;
pub use pipeline::{AnalysisError, AnalysisReport, ErrorKind, run_analysis};
