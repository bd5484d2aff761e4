//! Empirical Bayes shrinkage of gene-wise dispersions towards the trend

use ndarray::{Array1, ArrayView2};
use rayon::prelude::*;

use super::gene_wise::GeneDispersions;
use super::posterior::{grid_search, line_search, LogNormalPrior};
use super::DispersionParams;
use crate::stats::{mad, trigamma};

/// Floor on the prior variance of `log(alpha)`
const MIN_PRIOR_VAR: f64 = 0.25;

/// Spread of the log residuals around the trend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorVariance {
    /// `mad(log(gene) - log(trend))^2`
    pub var_log_disp_ests: f64,
    /// Residual spread minus its sampling variance, floored at 0.25
    pub prior_var: f64,
}

/// Prior variance from the residuals of genes above the lower boundary.
///
/// The sampling variance of a log dispersion estimate with `m - p` residual
/// degrees of freedom is `trigamma((m - p) / 2)`.
pub fn estimate_prior_variance(
    gene_dispersions: &[f64],
    trended: &[f64],
    n_samples: usize,
    n_coefs: usize,
    min_disp: f64,
) -> PriorVariance {
    let residuals: Vec<f64> = gene_dispersions
        .iter()
        .zip(trended)
        .filter(|(&g, &t)| g.is_finite() && t.is_finite() && g >= 100.0 * min_disp && t > 0.0)
        .map(|(&g, &t)| g.ln() - t.ln())
        .collect();

    if residuals.is_empty() {
        return PriorVariance {
            var_log_disp_ests: MIN_PRIOR_VAR,
            prior_var: MIN_PRIOR_VAR,
        };
    }

    let var_log_disp_ests = mad(&residuals).powi(2);
    if n_samples <= n_coefs {
        return PriorVariance {
            var_log_disp_ests,
            prior_var: MIN_PRIOR_VAR,
        };
    }

    let expected = trigamma((n_samples - n_coefs) as f64 / 2.0);
    PriorVariance {
        var_log_disp_ests,
        prior_var: (var_log_disp_ests - expected).max(MIN_PRIOR_VAR),
    }
}

/// Output of the shrinkage pass
#[derive(Debug, Clone)]
pub struct MapDispersions {
    /// Posterior modes
    pub map: Array1<f64>,
    /// Posterior modes, with outliers replaced by their gene-wise estimate
    pub final_dispersions: Array1<f64>,
    pub outliers: Vec<bool>,
    pub prior: PriorVariance,
}

fn map_gene(
    counts: &[f64],
    design: ArrayView2<f64>,
    mu: &[f64],
    gene_disp: f64,
    trend_disp: f64,
    prior_var: f64,
    params: &DispersionParams,
) -> f64 {
    if !gene_disp.is_finite() || !trend_disp.is_finite() || trend_disp <= 0.0 {
        return f64::NAN;
    }
    let max_disp = params.max_disp(counts.len());
    let prior = LogNormalPrior {
        mean: trend_disp.ln(),
        var: prior_var,
    };
    let start = if gene_disp > 0.1 * trend_disp { gene_disp } else { trend_disp };

    let search = line_search(counts, design, mu, start.ln(), Some(prior), params);
    let estimate = if search.converged {
        search.log_alpha.exp()
    } else {
        grid_search(counts, design, mu, params.min_disp, max_disp, Some(prior))
    };
    estimate.clamp(params.min_disp, max_disp)
}

/// Shrink every gene towards its trended value and flag high outliers.
pub fn estimate_map_dispersions(
    counts: ArrayView2<f64>,
    design: ArrayView2<f64>,
    gene: &GeneDispersions,
    trended: &Array1<f64>,
    params: &DispersionParams,
) -> MapDispersions {
    let (n_samples, n_coefs) = design.dim();
    let prior = estimate_prior_variance(
        &gene.dispersions.to_vec(),
        &trended.to_vec(),
        n_samples,
        n_coefs,
        params.min_disp,
    );
    log::debug!(
        "dispersion prior: varLogDispEsts={:.4}, prior variance={:.4}",
        prior.var_log_disp_ests,
        prior.prior_var
    );

    let map: Array1<f64> = (0..counts.nrows())
        .into_par_iter()
        .map(|i| {
            let y = counts.row(i).to_vec();
            let mu = gene.mu.row(i).to_vec();
            map_gene(&y, design, &mu, gene.dispersions[i], trended[i], prior.prior_var, params)
        })
        .collect::<Vec<f64>>()
        .into();

    let threshold = params.outlier_sd * prior.var_log_disp_ests.sqrt();
    let outliers: Vec<bool> = gene
        .dispersions
        .iter()
        .zip(trended.iter())
        .map(|(&g, &t)| g.is_finite() && t.is_finite() && g > 0.0 && t > 0.0 && g.ln() - t.ln() > threshold)
        .collect();

    let final_dispersions: Array1<f64> = map
        .iter()
        .zip(&outliers)
        .zip(gene.dispersions.iter())
        .map(|((&m, &outlier), &g)| if outlier { g } else { m })
        .collect();

    MapDispersions {
        map,
        final_dispersions,
        outliers,
        prior,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_prior_variance_floor_and_formula() {
        // identical residuals: mad is zero, so the floor applies
        let pv = estimate_prior_variance(&[0.2, 0.2, 0.2], &[0.1, 0.1, 0.1], 6, 2, 1e-8);
        assert_eq!(pv.var_log_disp_ests, 0.0);
        assert_eq!(pv.prior_var, 0.25);

        let gene: Vec<f64> = (0..9).map(|i| 0.1 * (i as f64 - 4.0).exp()).collect();
        let trend = vec![0.1; 9];
        let pv = estimate_prior_variance(&gene, &trend, 20, 2, 1e-8);
        let expected = (mad(&(0..9).map(|i| i as f64 - 4.0).collect::<Vec<_>>()).powi(2) - trigamma(9.0)).max(0.25);
        assert!((pv.prior_var - expected).abs() < 1e-10);
    }

    #[test]
    fn test_no_degrees_of_freedom_uses_floor() {
        let gene = [0.05, 0.5, 5.0];
        let pv = estimate_prior_variance(&gene, &[0.5; 3], 2, 2, 1e-8);
        assert_eq!(pv.prior_var, 0.25);
        assert!(pv.var_log_disp_ests > 0.25);
    }

    #[test]
    fn test_shrinks_towards_trend_and_keeps_outliers() {
        let counts = array![
            [40.0, 55.0, 48.0, 60.0, 45.0, 52.0],
            [5.0, 300.0, 20.0, 2.0, 250.0, 40.0],
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
        ];
        let design = array![[1.0, 0.0], [1.0, 0.0], [1.0, 0.0], [1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        let mu = array![
            [47.7, 47.7, 47.7, 52.3, 52.3, 52.3],
            [108.3, 108.3, 108.3, 97.3, 97.3, 97.3],
            [f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN]
        ];
        let gene = GeneDispersions {
            dispersions: array![0.3, 2.5, f64::NAN],
            mu: mu.clone(),
            iterations: vec![5, 5, 0],
            converged: vec![true, true, false],
        };
        let trended = array![0.05, 0.05, 0.05];
        let params = DispersionParams::default();
        let out = estimate_map_dispersions(counts.view(), design.view(), &gene, &trended, &params);

        // pulled between the data and the trend
        assert!(out.map[0] < 0.3 && out.map[0] > 0.0);
        assert!(out.map[2].is_nan());
        assert!(out.final_dispersions[2].is_nan());
        assert_eq!(out.outliers.len(), 3);
        for i in 0..2 {
            if out.outliers[i] {
                assert_eq!(out.final_dispersions[i], gene.dispersions[i]);
            } else {
                assert_eq!(out.final_dispersions[i], out.map[i]);
            }
        }
    }
}
