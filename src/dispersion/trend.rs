//! Dispersion-mean trend

use std::fmt;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::DispersionParams;

/// Shape of the dispersion-mean trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendFitMethod {
    /// `alpha = a0 + a1 / mean`, falling back to `Mean` if the fit fails
    Parametric,
    /// A single trimmed mean of the gene-wise estimates
    Mean,
}

/// Fitted trend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DispersionTrend {
    Parametric { asymptotic: f64, extra_poisson: f64 },
    Mean(f64),
}

impl DispersionTrend {
    /// Trend value at each base mean
    pub fn predict(&self, base_means: &[f64]) -> Array1<f64> {
        base_means.iter().map(|&m| self.at(m)).collect()
    }

    pub fn at(&self, base_mean: f64) -> f64 {
        match *self {
            DispersionTrend::Parametric {
                asymptotic,
                extra_poisson,
            } => {
                if base_mean > 0.0 {
                    asymptotic + extra_poisson / base_mean
                } else {
                    asymptotic
                }
            }
            DispersionTrend::Mean(value) => value,
        }
    }
}

impl fmt::Display for DispersionTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispersionTrend::Parametric {
                asymptotic,
                extra_poisson,
            } => write!(f, "{:.4} + {:.4}/mean", asymptotic, extra_poisson),
            DispersionTrend::Mean(v) => write!(f, "mean {:.4}", v),
        }
    }
}

/// Fit the trend through the gene-wise estimates.
///
/// Genes at the lower dispersion boundary or with zero mean are left out of
/// the fit but still get a trended value.
pub fn fit_dispersion_trend(base_means: &[f64], gene_dispersions: &Array1<f64>, params: &DispersionParams) -> DispersionTrend {
    let usable: Vec<(f64, f64)> = base_means
        .iter()
        .zip(gene_dispersions.iter())
        .filter(|(&m, &d)| m > 0.0 && d.is_finite() && d > 100.0 * params.min_disp)
        .map(|(&m, &d)| (m, d))
        .collect();

    match params.trend {
        TrendFitMethod::Parametric => match fit_parametric(&usable) {
            Some(trend) => trend,
            None => {
                log::warn!("parametric dispersion trend failed, using the mean of gene-wise estimates");
                mean_trend(gene_dispersions, params.min_disp)
            }
        },
        TrendFitMethod::Mean => mean_trend(gene_dispersions, params.min_disp),
    }
}

/// Trimmed mean of the estimates away from the lower boundary
fn mean_trend(gene_dispersions: &Array1<f64>, min_disp: f64) -> DispersionTrend {
    let mut usable: Vec<f64> = gene_dispersions
        .iter()
        .copied()
        .filter(|&d| d.is_finite() && d > 10.0 * min_disp)
        .collect();
    if usable.is_empty() {
        let finite: Vec<f64> = gene_dispersions.iter().copied().filter(|d| d.is_finite()).collect();
        let mean = if finite.is_empty() {
            0.1
        } else {
            finite.iter().sum::<f64>() / finite.len() as f64
        };
        return DispersionTrend::Mean(mean);
    }
    usable.sort_by(|a, b| a.total_cmp(b));
    let trim = (usable.len() as f64 * 0.001).floor() as usize;
    let kept = &usable[trim..usable.len() - trim];
    DispersionTrend::Mean(kept.iter().sum::<f64>() / kept.len() as f64)
}

/// Iterated gamma GLM with identity link, dropping genes whose ratio to the
/// current fit leaves `(1e-4, 15)`. `None` on non-convergence or when a
/// coefficient is not positive.
fn fit_parametric(data: &[(f64, f64)]) -> Option<DispersionTrend> {
    const ROUNDS: usize = 10;
    let mut coefs = (0.1_f64, 1.0_f64);

    for round in 0..ROUNDS {
        let kept: Vec<(f64, f64)> = data
            .iter()
            .copied()
            .filter(|&(mean, disp)| {
                let fitted = coefs.0 + coefs.1 / mean;
                let ratio = disp / fitted;
                fitted > 0.0 && ratio > 1e-4 && ratio < 15.0
            })
            .collect();
        if kept.len() < 3 {
            return None;
        }

        let previous = coefs;
        let (next, glm_converged) = gamma_identity_glm(&kept, coefs);
        coefs = next;
        if !(coefs.0 > 0.0 && coefs.1 > 0.0) {
            log::debug!("parametric trend coefficients not positive: {:?}", coefs);
            return None;
        }

        let change = (coefs.0 / previous.0).ln().powi(2) + (coefs.1 / previous.1).ln().powi(2);
        log::debug!(
            "parametric trend round {}: {} genes, a0={:.6}, a1={:.6}",
            round + 1,
            kept.len(),
            coefs.0,
            coefs.1
        );
        if change < 1e-6 && glm_converged {
            return Some(DispersionTrend::Parametric {
                asymptotic: coefs.0,
                extra_poisson: coefs.1,
            });
        }
    }
    None
}

fn gamma_deviance(data: &[(f64, f64)], a0: f64, a1: f64) -> f64 {
    data.iter()
        .map(|&(mean, disp)| {
            let mu = (a0 + a1 / mean).max(1e-8);
            2.0 * (-(disp / mu).ln() + (disp - mu) / mu)
        })
        .sum()
}

/// IRLS for `disp ~ 1 + 1/mean` with gamma variance
fn gamma_identity_glm(data: &[(f64, f64)], start: (f64, f64)) -> ((f64, f64), bool) {
    let (mut a0, mut a1) = start;
    let mut dev_old = gamma_deviance(data, a0, a1);

    for _ in 0..25 {
        let (mut sw, mut swx, mut swz, mut swxx, mut swxz) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for &(mean, disp) in data {
            let x = 1.0 / mean;
            let mu = (a0 + a1 * x).max(1e-8);
            let w = 1.0 / (mu * mu);
            sw += w;
            swx += w * x;
            swz += w * disp;
            swxx += w * x * x;
            swxz += w * x * disp;
        }
        let det = sw * swxx - swx * swx;
        if det.abs() < 1e-300 {
            return ((a0, a1), false);
        }
        a0 = (swxx * swz - swx * swxz) / det;
        a1 = (sw * swxz - swx * swz) / det;

        let dev = gamma_deviance(data, a0, a1);
        if (dev_old - dev).abs() / (0.1 + dev.abs()) < 1e-8 {
            return ((a0, a1), true);
        }
        dev_old = dev;
    }
    ((a0, a1), false)
}
