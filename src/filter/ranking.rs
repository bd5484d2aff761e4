//! Ordering genes by adjusted p-value

use crate::stats::cmp_nan_last;
use crate::testing::ResultsTable;

/// Row indices by ascending `padj`, NA last.
///
/// The sort is stable, so ties keep their original row order.
pub fn rank_by_padj(results: &ResultsTable) -> Vec<usize> {
    let mut order: Vec<usize> = (0..results.n_genes()).collect();
    order.sort_by(|&a, &b| cmp_nan_last(results.padj[a], results.padj[b]));
    order
}

/// The first `n` ranked rows that have an adjusted p-value
pub fn top_n(results: &ResultsTable, n: usize) -> Vec<usize> {
    rank_by_padj(results)
        .into_iter()
        .filter(|&i| results.padj[i].is_finite())
        .take(n)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestKind;

    fn table(padj: Vec<f64>) -> ResultsTable {
        let n = padj.len();
        ResultsTable {
            gene_ids: (0..n).map(|i| format!("G{}", i + 1)).collect(),
            base_means: vec![100.0; n],
            log2_fold_changes: vec![0.5; n],
            lfc_se: vec![0.2; n],
            stat: vec![2.5; n],
            pvalues: padj.clone(),
            padj,
            dispersions: vec![0.05; n],
            description: "CellType luminal vs basal".to_string(),
            test: TestKind::Wald,
        }
    }

    #[test]
    fn test_ties_keep_row_order() {
        let results = table(vec![0.05, f64::NAN, 0.01, 0.05, 0.01, f64::NAN, 0.2]);
        assert_eq!(rank_by_padj(&results), vec![2, 4, 0, 3, 6, 1, 5]);
    }

    #[test]
    fn test_top_n_is_prefix_without_na() {
        let results = table(vec![0.05, f64::NAN, 0.01, 0.05, 0.01, f64::NAN, 0.2]);
        assert_eq!(top_n(&results, 3), vec![2, 4, 0]);
        assert_eq!(top_n(&results, 100), vec![2, 4, 0, 3, 6]);
        let ranked = rank_by_padj(&results);
        assert_eq!(top_n(&results, 4)[..], ranked[..4]);
        assert!(top_n(&results, 0).is_empty());
    }

    #[test]
    fn test_reorder_materialises_ranking() {
        let results = table(vec![0.3, 0.001, 0.02]);
        let ranked = results.reorder(&rank_by_padj(&results));
        assert_eq!(ranked.gene_ids, vec!["G2", "G3", "G1"]);
    }
}
