//! Count data, sample annotations and the pre-processing bundle

mod count_matrix;
mod prepared;
mod sample_info;

pub use count_matrix::CountMatrix;
pub use prepared::{reconcile, strip_sample_suffix, LoadOptions, PreparedData};
pub use sample_info::SampleInfo;
