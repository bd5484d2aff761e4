//! Benjamini-Hochberg adjustment for multiple testing

use crate::stats::cmp_nan_last;

/// Benjamini-Hochberg adjusted p-values.
///
/// `NaN` p-values are not counted as tests and stay `NaN`.
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    let n = pvalues.len();
    let m = pvalues.iter().filter(|p| p.is_finite()).count();
    if m == 0 {
        return vec![f64::NAN; n];
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| cmp_nan_last(pvalues[a], pvalues[b]));

    let mut padj = vec![f64::NAN; n];
    let mut running_min = f64::INFINITY;
    let mut rank = m;
    for &i in order.iter().rev() {
        let p = pvalues[i];
        if p.is_finite() {
            running_min = running_min.min((p * m as f64 / rank as f64).min(1.0));
            padj[i] = running_min;
            rank -= 1;
        }
    }
    padj
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bh_known_values() {
        let padj = benjamini_hochberg(&[0.01, 0.04, 0.03, 0.02]);
        for adj in &padj {
            assert!((adj - 0.04).abs() < 1e-12);
        }
        let padj = benjamini_hochberg(&[0.001, 0.01, 0.05, 0.1]);
        let expected = [0.004, 0.02, 0.05 * 4.0 / 3.0, 0.1];
        for (a, e) in padj.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "{} vs {}", a, e);
        }
    }

    #[test]
    fn test_bh_nan_is_not_a_test() {
        let padj = benjamini_hochberg(&[0.01, f64::NAN, 0.03, 0.02]);
        assert!(padj[1].is_nan());
        // three tests, not four
        assert!((padj[0] - 0.03).abs() < 1e-12);
        assert!(benjamini_hochberg(&[f64::NAN, f64::NAN]).iter().all(|p| p.is_nan()));
        assert!(benjamini_hochberg(&[]).is_empty());
    }

    #[test]
    fn test_bh_monotone_in_p() {
        let pvalues = [0.2, 0.001, 0.04, 0.5, 0.01];
        let padj = benjamini_hochberg(&pvalues);
        for i in 0..pvalues.len() {
            for j in 0..pvalues.len() {
                if pvalues[i] <= pvalues[j] {
                    assert!(padj[i] <= padj[j]);
                }
            }
        }
    }
}
