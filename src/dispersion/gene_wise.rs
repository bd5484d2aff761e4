//! Gene-wise dispersion estimates

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;

use super::posterior::{grid_search, line_search};
use super::DispersionParams;
use crate::error::{DeError, Result};
use crate::glm::{fit_gene, GlmFitParams, MIN_MU};
use crate::linalg::{solve_spd, weighted_crossprod};
use crate::stats::sample_variance;

/// Gene-wise estimates and the fitted means they were computed against
#[derive(Debug, Clone)]
pub struct GeneDispersions {
    pub dispersions: Array1<f64>,
    /// genes x samples; reused by the shrinkage pass
    pub mu: Array2<f64>,
    pub iterations: Vec<usize>,
    pub converged: Vec<bool>,
}

/// True when the design is a one-way group model, i.e. it has exactly as
/// many distinct rows as columns. Then least squares on the normalized counts
/// gives the group means directly.
pub(crate) fn is_group_design(design: ArrayView2<f64>) -> bool {
    let mut distinct: Vec<Vec<i64>> = Vec::new();
    for row in design.rows() {
        let key: Vec<i64> = row.iter().map(|v| (v * 1000.0).round() as i64).collect();
        if !distinct.contains(&key) {
            distinct.push(key);
        }
    }
    distinct.len() == design.ncols()
}

/// Least-squares fitted values of `y` on `design`
fn least_squares_fit(y: &[f64], design: ArrayView2<f64>) -> Vec<f64> {
    let xtx = weighted_crossprod(design, &vec![1.0; design.nrows()]);
    let xty = design.t().dot(&ArrayView1::from(y));
    let beta = solve_spd(xtx.view(), xty.view());
    design.dot(&beta).to_vec()
}

fn normalize(counts: ArrayView1<f64>, size_factors: ArrayView1<f64>) -> Vec<f64> {
    counts
        .iter()
        .zip(size_factors.iter())
        .map(|(&c, &s)| c / s)
        .collect()
}

/// Squared-residual estimate against the linear-model means
fn rough_estimate(normalized: &[f64], design: ArrayView2<f64>) -> f64 {
    let (m, p) = design.dim();
    let mu = least_squares_fit(normalized, design);
    let total: f64 = normalized
        .iter()
        .zip(&mu)
        .map(|(&y, &mu)| {
            let mu = mu.max(1.0);
            ((y - mu).powi(2) - mu) / (mu * mu)
        })
        .sum();
    (total / (m - p) as f64).max(0.0)
}

/// Method-of-moments estimate ignoring the design
fn moments_estimate(normalized: &[f64], mean_inv_size_factor: f64) -> f64 {
    let n = normalized.len() as f64;
    let base_mean = normalized.iter().sum::<f64>() / n;
    let base_var = sample_variance(normalized);
    (base_var - mean_inv_size_factor * base_mean) / (base_mean * base_mean)
}

struct GeneEstimate {
    dispersion: f64,
    mu: Vec<f64>,
    iterations: usize,
    converged: bool,
}

fn estimate_gene(
    counts: ArrayView1<f64>,
    size_factors: ArrayView1<f64>,
    design: ArrayView2<f64>,
    group_design: bool,
    mean_inv_size_factor: f64,
    params: &DispersionParams,
) -> GeneEstimate {
    let n_samples = counts.len();
    if counts.iter().all(|&c| c == 0.0) {
        return GeneEstimate {
            dispersion: f64::NAN,
            mu: vec![f64::NAN; n_samples],
            iterations: 0,
            converged: false,
        };
    }

    let min_disp = params.min_disp;
    let max_disp = params.max_disp(n_samples);
    let normalized = normalize(counts, size_factors);

    let rough = rough_estimate(&normalized, design);
    let moments = moments_estimate(&normalized, mean_inv_size_factor);
    let alpha_init = rough.min(moments).clamp(min_disp, max_disp);

    let mu: Vec<f64> = if group_design {
        least_squares_fit(&normalized, design)
            .iter()
            .zip(size_factors.iter())
            .map(|(&m, &s)| (m * s).max(MIN_MU))
            .collect()
    } else {
        let fit = fit_gene(counts, design, size_factors, alpha_init, &GlmFitParams::default());
        fit.mu.to_vec()
    };

    let counts_vec = counts.to_vec();
    let search = line_search(&counts_vec, design, &mu, alpha_init.ln(), None, params);

    // keep the starting value when the search could not improve on it
    let no_increase = search.final_lp < search.initial_lp + search.initial_lp.abs() / 1e6;
    let mut dispersion = if no_increase { alpha_init } else { search.log_alpha.exp() };

    let converged = search.converged && search.iterations != 1;
    if !converged && dispersion > min_disp * 10.0 {
        dispersion = grid_search(&counts_vec, design, &mu, min_disp, max_disp, None);
    }

    GeneEstimate {
        dispersion: dispersion.clamp(min_disp, max_disp),
        mu,
        iterations: search.iterations,
        converged,
    }
}

/// Maximise the Cox-Reid adjusted likelihood of every gene independently.
///
/// All-zero genes get `NaN`. Fails when the design leaves no residual
/// degrees of freedom.
pub fn estimate_gene_dispersions(
    counts: ArrayView2<f64>,
    size_factors: ArrayView1<f64>,
    design: ArrayView2<f64>,
    params: &DispersionParams,
) -> Result<GeneDispersions> {
    let (n_genes, n_samples) = counts.dim();
    let n_coefs = design.ncols();
    if design.nrows() <= n_coefs {
        return Err(DeError::InvalidDesign {
            reason: format!(
                "design has {} coefficients for {} samples; no replicates for dispersion estimation",
                n_coefs,
                design.nrows()
            ),
        });
    }
    let group_design = is_group_design(design);
    let mean_inv_size_factor = size_factors.iter().map(|s| 1.0 / s).sum::<f64>() / n_samples as f64;

    let estimates: Vec<GeneEstimate> = (0..n_genes)
        .into_par_iter()
        .map(|i| {
            estimate_gene(
                counts.row(i),
                size_factors,
                design,
                group_design,
                mean_inv_size_factor,
                params,
            )
        })
        .collect();

    let mut dispersions = Array1::zeros(n_genes);
    let mut mu = Array2::zeros((n_genes, n_samples));
    let mut iterations = Vec::with_capacity(n_genes);
    let mut converged = Vec::with_capacity(n_genes);
    for (i, est) in estimates.into_iter().enumerate() {
        dispersions[i] = est.dispersion;
        mu.row_mut(i).assign(&ArrayView1::from(&est.mu));
        iterations.push(est.iterations);
        converged.push(est.converged);
    }

    let n_grid = converged.iter().zip(dispersions.iter()).filter(|(c, d)| !**c && d.is_finite()).count();
    log::debug!(
        "gene-wise dispersions: {} genes, {} finished on the grid",
        n_genes,
        n_grid
    );

    Ok(GeneDispersions {
        dispersions,
        mu,
        iterations,
        converged,
    })
}
