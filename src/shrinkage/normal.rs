//! Zero-centred normal prior on the log2 fold changes of one contrast

use serde::{Deserialize, Serialize};

use crate::stats::match_weighted_upper_quantile_for_variance;
use crate::testing::ResultsTable;

/// Upper tail of `|LFC|` matched by the prior
pub const UPPER_QUANTILE: f64 = 0.05;

/// Fold changes beyond this are left out of the prior fit
const MAX_PRIOR_LFC: f64 = 10.0;

/// Posterior fold changes, one per row of the table they were derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShrunkenLfc {
    pub gene_ids: Vec<String>,
    pub log2_fold_changes: Vec<f64>,
    pub lfc_se: Vec<f64>,
    /// Variance of the normal prior on the log2 scale
    pub prior_var: f64,
}

impl ShrunkenLfc {
    pub fn get(&self, gene_id: &str) -> Option<f64> {
        self.gene_ids
            .iter()
            .position(|g| g == gene_id)
            .map(|i| self.log2_fold_changes[i])
    }
}

/// Shrink the fold changes of `results` toward zero.
///
/// The prior variance is chosen so that a zero-mean normal has the same
/// upper 5% quantile as the observed `|LFC|`, with each gene weighted by
/// `1 / (1/baseMean + dispersion)` so that noisy low-count genes count less.
/// Each gene then gets the normal-normal posterior mean and standard
/// deviation given its own standard error. Genes without a finite estimate
/// stay `NaN`.
pub fn shrink_lfc_normal(results: &ResultsTable) -> ShrunkenLfc {
    let n = results.n_genes();
    let mut prior_lfc = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    for i in 0..n {
        let (lfc, mean, disp) = (results.log2_fold_changes[i], results.base_means[i], results.dispersions[i]);
        if lfc.is_finite() && lfc.abs() < MAX_PRIOR_LFC && mean > 0.0 && disp.is_finite() {
            prior_lfc.push(lfc);
            weights.push(1.0 / (1.0 / mean + disp));
        }
    }

    let prior_var = if prior_lfc.is_empty() {
        log::warn!("no finite fold changes to fit a shrinkage prior; estimates are unchanged");
        f64::INFINITY
    } else {
        match_weighted_upper_quantile_for_variance(&prior_lfc, &weights, UPPER_QUANTILE)
    };
    log::debug!("LFC prior variance {:.6} from {} genes", prior_var, prior_lfc.len());

    let (log2_fold_changes, lfc_se) = results
        .log2_fold_changes
        .iter()
        .zip(&results.lfc_se)
        .map(|(&lfc, &se)| posterior(lfc, se, prior_var))
        .unzip();

    ShrunkenLfc {
        gene_ids: results.gene_ids.clone(),
        log2_fold_changes,
        lfc_se,
        prior_var,
    }
}

fn posterior(lfc: f64, se: f64, prior_var: f64) -> (f64, f64) {
    if !lfc.is_finite() || !se.is_finite() {
        return (f64::NAN, f64::NAN);
    }
    if prior_var.is_infinite() {
        return (lfc, se);
    }
    let se2 = se * se;
    let shrink = prior_var / (prior_var + se2);
    (lfc * shrink, (se2 * shrink).sqrt())
}
