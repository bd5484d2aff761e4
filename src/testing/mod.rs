//! Per-gene hypothesis tests and the results table they produce

mod fdr;
mod lrt;
mod pvalue;
mod table;
mod wald;

pub use fdr::benjamini_hochberg;
pub use lrt::nested_lrt;
pub use pvalue::{calculate_pvalue, chi_squared_pvalue};
pub use table::{ContrastSpec, ResultsSummary, ResultsTable, TestKind};
pub use wald::results;
