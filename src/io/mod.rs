//! Reading inputs, writing result tables and persisting bundles

mod bundle;
mod tables;

pub use bundle::{load_bundle, save_bundle, AnalysisBundle};
pub use tables::{
    load_inputs, read_count_table, read_sample_info, write_annotated_results, write_heatmap, write_pca, write_points,
    write_results_table, write_summary_json, FEATURE_COUNTS_COLUMNS,
};

/// Text written for values that do not apply
pub const NA: &str = "NA";

pub(crate) fn format_value(v: f64) -> String {
    if v.is_finite() {
        v.to_string()
    } else {
        NA.to_string()
    }
}
