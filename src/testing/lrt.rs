//! Likelihood ratio test between nested designs

use std::f64::consts::LN_2;

use super::fdr::benjamini_hochberg;
use super::pvalue::chi_squared_pvalue;
use super::table::{ResultsTable, TestKind};
use crate::error::{DeError, Result};
use crate::glm::fit_nb_glm;
use crate::model::FittedModel;

/// Compare a fitted model with a reduced model over the same data.
///
/// The reduced design must drop at least one coefficient of the full design
/// and add none. It is refit here with the full model's size factors and
/// dispersions and GLM parameters, so `reduced` only contributes its design
/// and may be unfitted.
/// The log fold change columns report the last coefficient of the full
/// model.
pub fn nested_lrt(full: &FittedModel, reduced: &FittedModel) -> Result<ResultsTable> {
    let full_fit = full.require_fit()?;
    if full.data() != reduced.data() {
        return Err(DeError::InvalidComparison {
            reason: "the two models were built from different counts or sample info".to_string(),
        });
    }
    let (full_info, reduced_info) = (full.design_info(), reduced.design_info());
    if !reduced_info.is_strict_subset_of(full_info) {
        return Err(DeError::InvalidComparison {
            reason: format!(
                "{} is not nested in {}: reduced coefficients [{}], full coefficients [{}]",
                reduced.design().formula(),
                full.design().formula(),
                reduced_info.coef_names.join(", "),
                full_info.coef_names.join(", ")
            ),
        });
    }

    let size_factors = full.size_factors().ok_or_else(|| DeError::StageOrder {
        reason: "the full model has no size factors".to_string(),
    })?;
    let dispersions = full.dispersions().ok_or_else(|| DeError::StageOrder {
        reason: "the full model has no dispersions".to_string(),
    })?;

    let glm_params = full.glm_params().cloned().unwrap_or_default();
    let reduced_fit = fit_nb_glm(
        full.counts().counts(),
        reduced.model_matrix(),
        size_factors.view(),
        dispersions.dispersions.view(),
        &glm_params,
    );

    let df = (full_info.n_coefs() - reduced_info.n_coefs()) as f64;
    let last = full_info.n_coefs() - 1;
    let n_genes = full_fit.coefficients.nrows();

    let mut stat = vec![f64::NAN; n_genes];
    let mut log2_fold_changes = vec![f64::NAN; n_genes];
    let mut lfc_se = vec![f64::NAN; n_genes];
    for i in 0..n_genes {
        let (ll_full, ll_reduced) = (full_fit.log_likelihood[i], reduced_fit.log_likelihood[i]);
        if ll_full.is_finite() && ll_reduced.is_finite() {
            stat[i] = 2.0 * (ll_full - ll_reduced);
            log2_fold_changes[i] = full_fit.coefficients[[i, last]] / LN_2;
            lfc_se[i] = full_fit.standard_errors[[i, last]] / LN_2;
        }
    }

    let pvalues: Vec<f64> = stat.iter().map(|&s| chi_squared_pvalue(s, df)).collect();
    let padj = benjamini_hochberg(&pvalues);

    let description = format!(
        "LRT {} vs {}; log2 fold change (MLE): {}",
        full.design().formula(),
        reduced.design().formula(),
        full_info.coef_names[last]
    );
    log::info!("{}: {} degrees of freedom", description, df);

    Ok(ResultsTable {
        gene_ids: full.gene_ids().to_vec(),
        base_means: full.base_means()?,
        log2_fold_changes,
        lfc_se,
        stat,
        pvalues,
        padj,
        dispersions: dispersions.dispersions.to_vec(),
        description,
        test: TestKind::LikelihoodRatio,
    })
}
