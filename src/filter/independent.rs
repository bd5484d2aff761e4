//! Independent filtering on mean expression
//!
//! Low-count genes have little chance of reaching significance, so leaving
//! them out of the multiple-testing adjustment increases power. The mean of
//! normalized counts is independent of the test statistic under the null,
//! which keeps the adjustment valid.

use serde::{Deserialize, Serialize};

use crate::stats::quantile_type7;
use crate::testing::{benjamini_hochberg, ResultsTable};

/// Parameters for [`independent_filtering`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    /// Significance level whose rejection count is maximised
    pub alpha: f64,
    /// When false, every tested gene is adjusted together
    pub enabled: bool,
    /// Number of candidate quantiles
    pub n_thetas: usize,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            alpha: 0.10,
            enabled: true,
            n_thetas: 50,
        }
    }
}

/// The threshold chosen by [`independent_filtering`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOutcome {
    /// Quantile of the base means used as the threshold
    pub theta: f64,
    /// Genes with a base mean below this value were filtered
    pub threshold: f64,
    pub rejections: usize,
    /// Tested genes whose adjusted p-value was set to NA
    pub filtered: usize,
    /// `(theta, threshold, rejections)` for every candidate
    pub curve: Vec<(f64, f64, usize)>,
}

impl FilterOutcome {
    fn unfiltered(results: &ResultsTable, alpha: f64) -> Self {
        Self {
            theta: 0.0,
            threshold: 0.0,
            rejections: count_rejections(&results.padj, alpha),
            filtered: 0,
            curve: Vec::new(),
        }
    }
}

fn count_rejections(padj: &[f64], alpha: f64) -> usize {
    padj.iter().filter(|&&p| p.is_finite() && p < alpha).count()
}

/// BH over the genes at or above `cutoff`; the rest get NaN
fn adjust_above(results: &ResultsTable, cutoff: f64) -> Vec<f64> {
    let kept: Vec<f64> = results
        .pvalues
        .iter()
        .zip(&results.base_means)
        .map(|(&p, &m)| if m >= cutoff { p } else { f64::NAN })
        .collect();
    benjamini_hochberg(&kept)
}

/// Choose a base-mean threshold and rewrite `results.padj`.
///
/// Candidate thresholds are `n_thetas` evenly spaced quantiles of the base
/// means, from the fraction of zero means up to 0.95. The one with the most
/// adjusted p-values below `alpha` wins; on a tie the lowest threshold is
/// kept. Filtered genes stay in the table with `padj = NaN`.
pub fn independent_filtering(results: &mut ResultsTable, params: &FilterParams) -> FilterOutcome {
    results.padj = benjamini_hochberg(&results.pvalues);
    let n = results.n_genes();
    if !params.enabled || n == 0 || params.n_thetas == 0 {
        return FilterOutcome::unfiltered(results, params.alpha);
    }

    let mut sorted_means: Vec<f64> = results.base_means.iter().copied().filter(|m| m.is_finite()).collect();
    if sorted_means.is_empty() {
        return FilterOutcome::unfiltered(results, params.alpha);
    }
    sorted_means.sort_by(|a, b| a.total_cmp(b));

    let lower = results.base_means.iter().filter(|&&m| m == 0.0).count() as f64 / n as f64;
    let upper = if lower < 0.95 { 0.95 } else { 1.0 };
    let thetas: Vec<f64> = if params.n_thetas == 1 {
        vec![lower]
    } else {
        (0..params.n_thetas)
            .map(|j| lower + (upper - lower) * j as f64 / (params.n_thetas - 1) as f64)
            .collect()
    };

    let mut best: Option<(usize, usize, Vec<f64>)> = None;
    let mut curve = Vec::with_capacity(thetas.len());
    for (j, &theta) in thetas.iter().enumerate() {
        let cutoff = quantile_type7(&sorted_means, theta);
        let padj = adjust_above(results, cutoff);
        let rejections = count_rejections(&padj, params.alpha);
        curve.push((theta, cutoff, rejections));
        if best.as_ref().map_or(true, |(_, r, _)| rejections > *r) {
            best = Some((j, rejections, padj));
        }
    }

    let Some((j, rejections, padj)) = best else {
        return FilterOutcome::unfiltered(results, params.alpha);
    };
    let (theta, threshold, _) = curve[j];
    let filtered = results
        .pvalues
        .iter()
        .zip(&padj)
        .filter(|(p, q)| p.is_finite() && q.is_nan())
        .count();
    results.padj = padj;

    for (theta, cutoff, rej) in curve.iter().step_by(5) {
        log::debug!("  theta={:.3}, threshold={:.2}, rejections={}", theta, cutoff, rej);
    }
    log::info!(
        "independent filtering: threshold {:.3} (theta {:.3}) removes {} genes, {} rejections at alpha {}",
        threshold,
        theta,
        filtered,
        rejections,
        params.alpha
    );

    FilterOutcome {
        theta,
        threshold,
        rejections,
        filtered,
        curve,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestKind;

    /// Means 1..=100; the 50 lowest genes are noise, the 50 highest carry
    /// p-values `0.0015 * k`, which survive BH only when at most 66 genes
    /// are adjusted together.
    fn mixed_table() -> ResultsTable {
        let n = 100;
        ResultsTable {
            gene_ids: (0..n).map(|i| format!("gene_{}", i)).collect(),
            base_means: (0..n).map(|i| (i + 1) as f64).collect(),
            log2_fold_changes: vec![1.0; n],
            lfc_se: vec![0.5; n],
            stat: vec![2.0; n],
            pvalues: (0..n)
                .map(|i| if i < 50 { 0.5 + i as f64 * 0.005 } else { 0.0015 * (i - 49) as f64 })
                .collect(),
            padj: vec![f64::NAN; n],
            dispersions: vec![0.1; n],
            description: "treatment treated vs control".to_string(),
            test: TestKind::Wald,
        }
    }

    #[test]
    fn test_threshold_maximises_rejections() {
        let mut results = mixed_table();
        let unfiltered = benjamini_hochberg(&results.pvalues);
        assert_eq!(count_rejections(&unfiltered, 0.1), 0);

        let outcome = independent_filtering(&mut results, &FilterParams::default());
        assert_eq!(outcome.rejections, 50);
        assert_eq!(outcome.curve.len(), 50);
        assert!(outcome.curve.iter().all(|&(_, _, r)| r <= outcome.rejections));
        // the lowest threshold keeping at most 66 genes
        assert!(outcome.threshold > 35.0 && outcome.threshold < 36.0, "{}", outcome.threshold);
        assert_eq!(outcome.filtered, 35);

        assert_eq!(results.n_genes(), 100);
        for i in 0..100 {
            if results.base_means[i] < outcome.threshold {
                assert!(results.padj[i].is_nan());
                assert!(results.pvalues[i].is_finite());
            } else {
                assert!(results.padj[i].is_finite());
            }
        }
        assert!(results.padj[50..].iter().all(|&p| p < 0.1));
    }

    #[test]
    fn test_disabled_is_plain_bh() {
        let mut results = mixed_table();
        let params = FilterParams {
            enabled: false,
            ..FilterParams::default()
        };
        let outcome = independent_filtering(&mut results, &params);
        assert_eq!(outcome.filtered, 0);
        assert_eq!(results.padj, benjamini_hochberg(&results.pvalues));
    }

    #[test]
    fn test_untested_genes_stay_na() {
        let mut results = mixed_table();
        results.pvalues[70] = f64::NAN;
        results.base_means[0] = 0.0;
        let outcome = independent_filtering(&mut results, &FilterParams::default());
        assert!(results.padj[70].is_nan());
        // the zero-mean gene sets the lowest candidate quantile
        assert!((outcome.curve[0].0 - 0.01).abs() < 1e-12);
    }
}
