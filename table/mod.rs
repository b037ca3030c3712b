#![deny(dead_code)]
#![deny(unused_imports)]

pub mod crosstab;
pub mod frame;
pub mod impute;
pub mod load;
pub mod merge;
pub mod summary;

pub use frame::{Column, ColumnData, Table, TableError};
