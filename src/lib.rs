//! rnaseq_de: negative-binomial differential expression for RNA-seq counts
//!
//! Counts and a sample sheet are reconciled into [`data::PreparedData`], a
//! [`glm::Design`] with explicit level order is fit by
//! [`model::run_pipeline`] (or stage by stage on [`model::FittedModel`]),
//! and results are extracted per contrast, filtered, ranked, annotated and
//! turned into plot-ready tables.
//!
//! # Example
//!
//! ```ignore
//! use rnaseq_de::prelude::*;
//!
//! let counts = read_count_table("GenewiseCounts.txt")?;
//! let samples = read_sample_info("SampleInfo.txt", "FileName")?;
//! let data = reconcile(counts, samples, &LoadOptions::default())?;
//!
//! let design = Design::new()
//!     .factor("CellType", &["basal", "luminal"])
//!     .factor("Status", &["virgin", "pregnant", "lactate"]);
//! let model = run_pipeline(data, design)?;
//!
//! let mut res = results(&model, &ContrastSpec::levels("Status", "pregnant", "virgin"))?;
//! independent_filtering(&mut res, &FilterParams::default());
//! let top = res.reorder(&top_n(&res, 100));
//! ```

pub mod annotation;
pub mod cli;
pub mod data;
pub mod dispersion;
pub mod error;
pub mod filter;
pub mod glm;
pub mod io;
pub mod linalg;
pub mod model;
pub mod normalization;
pub mod plots;
pub mod shrinkage;
pub mod stats;
pub mod testing;

#[cfg(test)]
mod fixtures;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::annotation::{annotate, AnnotatedResults, AnnotationRecord, AnnotationSource, AnnotationTable};
    pub use crate::data::{reconcile, CountMatrix, LoadOptions, PreparedData, SampleInfo};
    pub use crate::dispersion::{DispersionEstimates, DispersionParams, TrendFitMethod};
    pub use crate::error::{DeError, Result};
    pub use crate::filter::{independent_filtering, rank_by_padj, top_n, FilterOutcome, FilterParams};
    pub use crate::glm::{Design, DesignInfo, Factor, GlmFitParams};
    pub use crate::io::{
        load_bundle, load_inputs, read_count_table, read_sample_info, save_bundle, write_annotated_results, write_heatmap,
        write_pca, write_points, write_results_table, write_summary_json, AnalysisBundle,
    };
    pub use crate::model::{run_pipeline, run_pipeline_with, FittedModel, PipelineParams};
    pub use crate::normalization::SizeFactorMethod;
    pub use crate::plots::{gene_counts, heatmap_matrix, ma_points, pca, volcano_points};
    pub use crate::shrinkage::{shrink_lfc_normal, ShrunkenLfc};
    pub use crate::testing::{nested_lrt, results, ContrastSpec, ResultsSummary, ResultsTable, TestKind};
}
