//! Independent filtering and ranking of results tables

mod independent;
mod ranking;

pub use independent::{independent_filtering, FilterOutcome, FilterParams};
pub use ranking::{rank_by_padj, top_n};
