//! Log fold change shrinkage for display
//!
//! Shrunken estimates are kept apart from the results table: the table's
//! fold changes and statistics remain the maximum-likelihood values that
//! were tested.

mod normal;

pub use normal::{shrink_lfc_normal, ShrunkenLfc, UPPER_QUANTILE};
