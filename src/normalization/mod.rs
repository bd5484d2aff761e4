//! Normalization of RNA-seq count data

mod size_factors;

pub use size_factors::{estimate_size_factors, SizeFactorMethod};

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

/// Counts divided by their sample's size factor
pub fn normalized_counts(counts: ArrayView2<f64>, size_factors: ArrayView1<f64>) -> Array2<f64> {
    let mut normalized = counts.to_owned();
    for (mut column, &sf) in normalized.axis_iter_mut(Axis(1)).zip(size_factors.iter()) {
        column.mapv_inplace(|c| c / sf);
    }
    normalized
}

/// Mean normalized count of each gene
pub fn base_means(counts: ArrayView2<f64>, size_factors: ArrayView1<f64>) -> Vec<f64> {
    let n_samples = counts.ncols() as f64;
    counts
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .zip(size_factors.iter())
                .map(|(&c, &s)| c / s)
                .sum::<f64>()
                / n_samples
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_normalized_counts_and_base_means() {
        let counts = array![[10.0, 40.0], [0.0, 8.0]];
        let sf = array![1.0, 2.0];
        let norm = normalized_counts(counts.view(), sf.view());
        assert_eq!(norm, array![[10.0, 20.0], [0.0, 4.0]]);
        assert_eq!(base_means(counts.view(), sf.view()), vec![15.0, 2.0]);
    }
}
