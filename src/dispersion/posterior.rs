//! Cox-Reid adjusted (log-)posterior of a gene's dispersion and its optimiser
//!
//! Both the gene-wise and the shrunken estimates maximise the same
//! objective over `log(alpha)` with fitted means held fixed; the shrunken
//! estimate adds a normal prior on `log(alpha)`.

use ndarray::ArrayView2;

use super::DispersionParams;
use crate::linalg::{invert_spd, log_det_spd, weighted_crossprod};
use crate::stats::{digamma, ln_gamma};

/// Hard bounds on proposed `log(alpha)` values
const LOG_ALPHA_FLOOR: f64 = -30.0;
const LOG_ALPHA_CEILING: f64 = 10.0;
/// Armijo sufficient-increase constant
const ARMIJO_EPSILON: f64 = 1e-4;

/// Normal prior on `log(alpha)`
#[derive(Debug, Clone, Copy)]
pub(super) struct LogNormalPrior {
    pub mean: f64,
    pub var: f64,
}

fn cox_reid_weights(mu: &[f64], alpha: f64) -> Vec<f64> {
    mu.iter().map(|&m| 1.0 / (1.0 / m.max(1e-10) + alpha)).collect()
}

/// Profile log-likelihood plus Cox-Reid adjustment plus optional prior
pub(super) fn log_posterior(
    counts: &[f64],
    design: ArrayView2<f64>,
    mu: &[f64],
    log_alpha: f64,
    prior: Option<LogNormalPrior>,
) -> f64 {
    let alpha = log_alpha.exp();
    let size = 1.0 / alpha;

    let mut ll = 0.0;
    for (&y, &m) in counts.iter().zip(mu) {
        let m = m.max(1e-10);
        ll += ln_gamma(y + size) - ln_gamma(size) - y * (m + size).ln() - size * (1.0 + m * alpha).ln();
    }

    let xtwx = weighted_crossprod(design, &cox_reid_weights(mu, alpha));
    let cr = log_det_spd(xtwx.view()).map(|d| -0.5 * d).unwrap_or(0.0);

    let prior_term = prior
        .map(|p| -0.5 * (log_alpha - p.mean).powi(2) / p.var)
        .unwrap_or(0.0);

    ll + cr + prior_term
}

/// Derivative of [`log_posterior`] with respect to `log(alpha)`
pub(super) fn d_log_posterior(
    counts: &[f64],
    design: ArrayView2<f64>,
    mu: &[f64],
    log_alpha: f64,
    prior: Option<LogNormalPrior>,
) -> f64 {
    let alpha = log_alpha.exp();
    let alpha_sq = alpha * alpha;
    let size = 1.0 / alpha;

    let mut dll = 0.0;
    for (&y, &m) in counts.iter().zip(mu) {
        let m = m.max(1e-10);
        dll += -digamma(y + size) / alpha_sq + digamma(size) / alpha_sq + y / (alpha_sq * (m + size))
            + (1.0 + m * alpha).ln() / alpha_sq
            - m / (alpha * (1.0 + m * alpha));
    }

    // d/dalpha of -0.5 log|X'WX| = -0.5 tr((X'WX)^-1 X' dW X), dW = -w^2
    let w = cox_reid_weights(mu, alpha);
    let dw: Vec<f64> = w.iter().map(|wi| -wi * wi).collect();
    let b = weighted_crossprod(design, &w);
    let db = weighted_crossprod(design, &dw);
    let dcr = if log_det_spd(b.view()).is_some() {
        let b_inv = invert_spd(b.view());
        -0.5 * b_inv.dot(&db).diag().sum()
    } else {
        0.0
    };

    let prior_term = prior.map(|p| -(log_alpha - p.mean) / p.var).unwrap_or(0.0);

    (dll + dcr) * alpha + prior_term
}

/// Outcome of the line search
#[derive(Debug, Clone, Copy)]
pub(super) struct LineSearch {
    pub log_alpha: f64,
    pub initial_lp: f64,
    pub final_lp: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Gradient ascent on `log(alpha)` with Armijo backtracking
pub(super) fn line_search(
    counts: &[f64],
    design: ArrayView2<f64>,
    mu: &[f64],
    start_log_alpha: f64,
    prior: Option<LogNormalPrior>,
    params: &DispersionParams,
) -> LineSearch {
    let min_log_alpha = (params.min_disp / 10.0).ln();
    let mut log_alpha = start_log_alpha.clamp(LOG_ALPHA_FLOOR, LOG_ALPHA_CEILING);
    let initial_lp = log_posterior(counts, design, mu, log_alpha, prior);
    let mut lp = initial_lp;
    let mut dlp = d_log_posterior(counts, design, mu, log_alpha, prior);
    let mut kappa = params.kappa_0;
    let mut accepted = 0;

    for iter in 0..params.maxit {
        let proposal = log_alpha + kappa * dlp;
        if proposal < LOG_ALPHA_FLOOR && dlp != 0.0 {
            kappa = (LOG_ALPHA_FLOOR - log_alpha) / dlp;
        }
        if proposal > LOG_ALPHA_CEILING && dlp != 0.0 {
            kappa = (LOG_ALPHA_CEILING - log_alpha) / dlp;
        }
        let proposal = log_alpha + kappa * dlp;
        let lp_new = log_posterior(counts, design, mu, proposal, prior);

        if lp_new >= lp + kappa * ARMIJO_EPSILON * dlp * dlp {
            accepted += 1;
            let change = lp_new - lp;
            log_alpha = proposal;
            lp = lp_new;
            if change < params.disp_tol || log_alpha < min_log_alpha {
                return LineSearch {
                    log_alpha,
                    initial_lp,
                    final_lp: lp,
                    iterations: iter + 1,
                    converged: true,
                };
            }
            dlp = d_log_posterior(counts, design, mu, log_alpha, prior);
            kappa = (kappa * 1.1).min(params.kappa_0);
            if accepted % 5 == 0 {
                kappa /= 2.0;
            }
        } else {
            kappa /= 2.0;
        }
    }

    LineSearch {
        log_alpha,
        initial_lp,
        final_lp: lp,
        iterations: params.maxit,
        converged: false,
    }
}

/// Coarse-then-fine grid over `log(alpha)` in `[min_disp, max_disp]`
pub(super) fn grid_search(
    counts: &[f64],
    design: ArrayView2<f64>,
    mu: &[f64],
    min_disp: f64,
    max_disp: f64,
    prior: Option<LogNormalPrior>,
) -> f64 {
    const N_GRID: usize = 20;
    let best_on = |lo: f64, hi: f64| -> f64 {
        let step = (hi - lo) / (N_GRID - 1) as f64;
        (0..N_GRID)
            .map(|i| lo + i as f64 * step)
            .map(|a| (a, log_posterior(counts, design, mu, a, prior)))
            .filter(|(_, lp)| lp.is_finite())
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(a, _)| a)
            .unwrap_or(lo)
    };

    let (lo, hi) = (min_disp.ln(), max_disp.ln());
    let delta = (hi - lo) / (N_GRID - 1) as f64;
    let coarse = best_on(lo, hi);
    best_on(coarse - delta, coarse + delta).exp()
}
