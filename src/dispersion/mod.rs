//! Dispersion estimation for negative binomial models
//!
//! Three passes over the genes: a per-gene maximum of the Cox-Reid adjusted
//! likelihood, a mean-dispersion trend fit across genes, and a shrinkage step
//! that pulls each gene towards the trend with an empirical normal prior on
//! `log(alpha)`.

mod gene_wise;
mod map;
mod posterior;
mod trend;

pub use gene_wise::{estimate_gene_dispersions, GeneDispersions};
pub use map::{estimate_map_dispersions, estimate_prior_variance, MapDispersions, PriorVariance};
pub use trend::{fit_dispersion_trend, DispersionTrend, TrendFitMethod};

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{DeError, Result};

/// Settings for the three dispersion passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispersionParams {
    /// Smallest dispersion reported for any gene
    pub min_disp: f64,
    /// Change in log posterior that stops the line search
    pub disp_tol: f64,
    /// Initial line search step
    pub kappa_0: f64,
    /// Line search iteration limit
    pub maxit: usize,
    /// Genes whose log gene-wise estimate lies this many prior SDs above the
    /// trend keep their gene-wise value
    pub outlier_sd: f64,
    pub trend: TrendFitMethod,
}

impl Default for DispersionParams {
    fn default() -> Self {
        Self {
            min_disp: 1e-8,
            disp_tol: 1e-6,
            kappa_0: 1.0,
            maxit: 100,
            outlier_sd: 2.0,
            trend: TrendFitMethod::Parametric,
        }
    }
}

impl DispersionParams {
    /// Upper bound on dispersion for `n_samples` samples
    pub fn max_disp(&self, n_samples: usize) -> f64 {
        (n_samples as f64).max(10.0)
    }
}

/// Every intermediate and final dispersion, one entry per gene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispersionEstimates {
    pub gene_wise: Array1<f64>,
    pub trended: Array1<f64>,
    pub map: Array1<f64>,
    /// Values used for testing: the shrunken estimate, or the gene-wise one
    /// for outliers
    pub dispersions: Array1<f64>,
    pub trend: DispersionTrend,
    pub prior_var: f64,
    pub var_log_disp_ests: f64,
    pub outliers: Vec<bool>,
}

/// Run all three dispersion passes.
///
/// Fails when the design leaves no residual degrees of freedom.
pub fn estimate_dispersions(
    counts: ArrayView2<f64>,
    size_factors: ArrayView1<f64>,
    design: ArrayView2<f64>,
    params: &DispersionParams,
) -> Result<DispersionEstimates> {
    let n_samples = design.nrows();
    if counts.ncols() != n_samples {
        return Err(DeError::DimensionMismatch {
            expected: format!("{} count columns", n_samples),
            got: format!("{} count columns", counts.ncols()),
        });
    }

    let gene = estimate_gene_dispersions(counts, size_factors, design, params)?;
    let base_means = crate::normalization::base_means(counts, size_factors);
    let trend = fit_dispersion_trend(&base_means, &gene.dispersions, params);
    let trended = trend.predict(&base_means);
    let map = estimate_map_dispersions(counts, design, &gene, &trended, params);

    log::info!(
        "dispersions: trend {}, prior variance {:.4}, {} outliers",
        trend,
        map.prior.prior_var,
        map.outliers.iter().filter(|&&o| o).count()
    );

    Ok(DispersionEstimates {
        gene_wise: gene.dispersions,
        trended,
        dispersions: map.final_dispersions,
        map: map.map,
        trend,
        prior_var: map.prior.prior_var,
        var_log_disp_ests: map.prior.var_log_disp_ests,
        outliers: map.outliers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_no_residual_degrees_of_freedom() {
        let counts = array![[10.0, 20.0], [5.0, 7.0]];
        let sf = Array1::ones(2);
        let design = array![[1.0, 0.0], [1.0, 1.0]];
        let err = estimate_dispersions(counts.view(), sf.view(), design.view(), &DispersionParams::default())
            .unwrap_err();
        assert!(matches!(err, DeError::InvalidDesign { .. }));
    }

    #[test]
    fn test_estimates_are_bounded_and_ordered() {
        // 40 genes over 6 samples with a spread of expression levels
        let n_genes = 40;
        let mut counts = Array2::zeros((n_genes, 6));
        for g in 0..n_genes {
            let base = 5.0 + 12.0 * g as f64;
            let wobble = [0.7, 1.2, 1.0, 0.8, 1.3, 1.05];
            for s in 0..6 {
                let shift = if s >= 3 && g % 4 == 0 { 2.0 } else { 1.0 };
                counts[[g, s]] = (base * wobble[(s + g) % 6] * shift).round();
            }
        }
        counts.row_mut(7).fill(0.0);
        let sf = Array1::ones(6);
        let design = array![[1.0, 0.0], [1.0, 0.0], [1.0, 0.0], [1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        let params = DispersionParams::default();
        let est = estimate_dispersions(counts.view(), sf.view(), design.view(), &params).unwrap();

        assert_eq!(est.dispersions.len(), n_genes);
        assert!(est.dispersions[7].is_nan());
        assert!(est.gene_wise[7].is_nan());
        for (i, &d) in est.dispersions.iter().enumerate() {
            if i == 7 {
                continue;
            }
            assert!(d >= params.min_disp && d <= params.max_disp(6), "gene {} dispersion {}", i, d);
        }
        assert!(est.prior_var >= 0.25);
        assert_eq!(est.outliers.len(), n_genes);
    }
}
