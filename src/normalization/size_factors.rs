//! Size factor estimation using the median of ratios method

use ndarray::{Array1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{DeError, Result};
use crate::stats::median;

/// Method for size factor estimation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeFactorMethod {
    /// Standard median of ratios over genes with no zero count
    #[default]
    Ratio,
    /// Geometric means over positive counts only, for data where every gene
    /// has a zero somewhere
    PosCounts,
}

/// Estimate one size factor per sample.
///
/// Accounts for both sequencing depth and RNA composition.
pub fn estimate_size_factors(counts: ArrayView2<f64>, method: SizeFactorMethod) -> Result<Array1<f64>> {
    let (n_genes, n_samples) = counts.dim();
    if n_genes == 0 || n_samples == 0 {
        return Err(DeError::EmptyData {
            reason: "count matrix is empty".to_string(),
        });
    }

    let size_factors = match method {
        SizeFactorMethod::Ratio => ratio(counts)?,
        SizeFactorMethod::PosCounts => poscounts(counts)?,
    };

    if size_factors.iter().any(|&x| x <= 0.0 || !x.is_finite()) {
        return Err(DeError::SizeFactorFailed {
            reason: format!("invalid size factors computed: {:?}", size_factors.to_vec()),
        });
    }
    log::debug!("size factors ({:?}): {:?}", method, size_factors.to_vec());
    Ok(size_factors)
}

/// Median over genes of `count / geo_mean`, skipping zero counts
fn median_ratios(counts: ArrayView2<f64>, geo_means: &[Option<f64>]) -> Vec<Option<f64>> {
    counts
        .axis_iter(Axis(1))
        .map(|sample| {
            let ratios: Vec<f64> = sample
                .iter()
                .zip(geo_means)
                .filter_map(|(&count, geo)| match geo {
                    Some(g) if count > 0.0 && *g > 0.0 => Some(count / g),
                    _ => None,
                })
                .collect();
            if ratios.is_empty() {
                None
            } else {
                Some(median(&ratios))
            }
        })
        .collect()
}

fn ratio(counts: ArrayView2<f64>) -> Result<Array1<f64>> {
    let n_samples = counts.ncols() as f64;
    let geo_means: Vec<Option<f64>> = counts
        .axis_iter(Axis(0))
        .map(|row| {
            if row.iter().all(|&x| x > 0.0) {
                Some((row.iter().map(|x| x.ln()).sum::<f64>() / n_samples).exp())
            } else {
                None
            }
        })
        .collect();

    if geo_means.iter().all(Option::is_none) {
        return Err(DeError::SizeFactorFailed {
            reason: "every gene contains at least one zero; use the positive-counts method".to_string(),
        });
    }

    median_ratios(counts, &geo_means)
        .into_iter()
        .enumerate()
        .map(|(j, sf)| {
            sf.ok_or_else(|| DeError::SizeFactorFailed {
                reason: format!("no valid ratios for sample {}", j),
            })
        })
        .collect()
}

fn poscounts(counts: ArrayView2<f64>) -> Result<Array1<f64>> {
    let n_samples = counts.ncols() as f64;
    // the log sum over positive counts is still divided by the full sample count
    let geo_means: Vec<Option<f64>> = counts
        .axis_iter(Axis(0))
        .map(|row| {
            let log_sum: f64 = row.iter().filter(|&&x| x > 0.0).map(|x| x.ln()).sum();
            if row.iter().any(|&x| x > 0.0) {
                Some((log_sum / n_samples).exp())
            } else {
                None
            }
        })
        .collect();

    if geo_means.iter().all(Option::is_none) {
        return Err(DeError::SizeFactorFailed {
            reason: "no gene has a positive count".to_string(),
        });
    }

    let raw: Vec<f64> = median_ratios(counts, &geo_means)
        .into_iter()
        .map(|sf| sf.unwrap_or(1.0))
        .collect();
    let center = (raw.iter().map(|x| x.ln()).sum::<f64>() / n_samples).exp();
    Ok(raw.iter().map(|x| x / center).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_size_factor_estimation() {
        // second sample sequenced twice as deep
        let counts = array![
            [10.0, 20.0, 10.0],
            [50.0, 100.0, 50.0],
            [7.0, 14.0, 7.0],
            [3.0, 6.0, 3.0]
        ];
        let sf = estimate_size_factors(counts.view(), SizeFactorMethod::Ratio).unwrap();
        assert!((sf[1] / sf[0] - 2.0).abs() < 1e-10);
        assert!((sf[2] - sf[0]).abs() < 1e-10);
    }

    #[test]
    fn test_ratio_needs_a_gene_without_zeros() {
        let counts = array![[0.0, 5.0], [4.0, 0.0]];
        let err = estimate_size_factors(counts.view(), SizeFactorMethod::Ratio).unwrap_err();
        assert!(matches!(err, DeError::SizeFactorFailed { .. }));

        let sf = estimate_size_factors(counts.view(), SizeFactorMethod::PosCounts).unwrap();
        assert!(sf.iter().all(|&s| s > 0.0));
        // centred to geometric mean one
        assert!((sf.iter().map(|s| s.ln()).sum::<f64>()).abs() < 1e-10);
    }

    #[test]
    fn test_gene_order_and_zero_rows_do_not_matter() {
        let counts = array![
            [10.0, 30.0, 12.0],
            [0.0, 0.0, 0.0],
            [40.0, 55.0, 35.0],
            [7.0, 16.0, 9.0],
            [120.0, 210.0, 95.0]
        ];
        let permuted = counts.select(Axis(0), &[4, 1, 3, 0, 2]);
        let without_zero = counts.select(Axis(0), &[0, 2, 3, 4]);

        for method in [SizeFactorMethod::Ratio, SizeFactorMethod::PosCounts] {
            let sf = estimate_size_factors(counts.view(), method).unwrap();
            let sf_permuted = estimate_size_factors(permuted.view(), method).unwrap();
            let sf_without_zero = estimate_size_factors(without_zero.view(), method).unwrap();
            for j in 0..3 {
                assert!((sf[j] - sf_permuted[j]).abs() < 1e-12, "{:?} sample {}", method, j);
                assert!((sf[j] - sf_without_zero[j]).abs() < 1e-12, "{:?} sample {}", method, j);
            }
        }
    }

    #[test]
    fn test_empty_matrix() {
        let counts = ndarray::Array2::<f64>::zeros((0, 3));
        assert!(matches!(
            estimate_size_factors(counts.view(), SizeFactorMethod::Ratio),
            Err(DeError::EmptyData { .. })
        ));
    }
}
