//! Negative binomial generalized linear models

mod design;
mod fitting;
mod negative_binomial;

pub use design::{check_full_rank, Design, DesignInfo, Factor};
pub use fitting::{fit_gene, fit_nb_glm, GeneFit, GlmFit, GlmFitParams, RIDGE_LAMBDA};
pub use negative_binomial::{nb_log_likelihood, nb_mean, nb_variance, nb_weight, MAX_BETA, MIN_MU};
