#![deny(dead_code)]
#![deny(unused_imports)]

pub mod correlation;
pub mod design;
pub mod inference;
pub mod iv;
pub mod ols;

pub use design::RegressionError;
pub use inference::{CoefficientRow, EffectRow, EffectTable, FitResult};
