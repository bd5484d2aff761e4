//! Gene x sample read count matrix

use std::collections::HashSet;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{DeError, Result};

/// Raw read counts, genes in rows and samples in columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountMatrix {
    counts: Array2<f64>,
    gene_ids: Vec<String>,
    sample_ids: Vec<String>,
}

fn check_unique(ids: &[String], what: &str) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(DeError::InvalidCountMatrix {
                reason: format!("duplicate {} identifier '{}'", what, id),
            });
        }
    }
    Ok(())
}

impl CountMatrix {
    /// Create a count matrix, validating shape, values and identifier uniqueness
    pub fn new(counts: Array2<f64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (n_genes, n_samples) = counts.dim();

        if gene_ids.len() != n_genes {
            return Err(DeError::DimensionMismatch {
                expected: format!("{} gene IDs", n_genes),
                got: format!("{} gene IDs", gene_ids.len()),
            });
        }
        if sample_ids.len() != n_samples {
            return Err(DeError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }

        if counts.iter().any(|&x| x < 0.0 || !x.is_finite()) {
            return Err(DeError::InvalidCountMatrix {
                reason: "Counts must be non-negative finite values".to_string(),
            });
        }
        if counts.iter().any(|&x| x != x.round()) {
            log::warn!("Some count values are not integers; the negative binomial model expects integer counts");
        }

        check_unique(&gene_ids, "gene")?;
        check_unique(&sample_ids, "sample")?;

        Ok(Self {
            counts,
            gene_ids,
            sample_ids,
        })
    }

    pub fn n_genes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    /// Raw counts as a view
    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Index of a gene by identifier
    pub fn gene_index(&self, gene_id: &str) -> Option<usize> {
        self.gene_ids.iter().position(|g| g == gene_id)
    }

    /// Total count of each gene across samples
    pub fn row_totals(&self) -> Array1<f64> {
        self.counts.sum_axis(Axis(1))
    }

    /// Total count of each sample (library size)
    pub fn library_sizes(&self) -> Array1<f64> {
        self.counts.sum_axis(Axis(0))
    }

    /// Keep genes whose total count across all samples is strictly above `min_total`.
    ///
    /// Applying the same threshold again returns the same gene set.
    pub fn filter_low_counts(&self, min_total: f64) -> CountMatrix {
        let keep: Vec<usize> = self
            .row_totals()
            .iter()
            .enumerate()
            .filter(|(_, &total)| total > min_total)
            .map(|(i, _)| i)
            .collect();

        let dropped = self.n_genes() - keep.len();
        log::info!(
            "Low-count filter (total > {}): kept {} of {} genes, dropped {}",
            min_total,
            keep.len(),
            self.n_genes(),
            dropped
        );

        self.subset_genes(&keep)
    }

    /// Subset to the given gene indices, in the given order
    pub fn subset_genes(&self, indices: &[usize]) -> CountMatrix {
        CountMatrix {
            counts: self.counts.select(Axis(0), indices),
            gene_ids: indices.iter().map(|&i| self.gene_ids[i].clone()).collect(),
            sample_ids: self.sample_ids.clone(),
        }
    }

    /// Reorder (or subset) columns to match the given sample identifiers
    pub fn select_samples(&self, sample_ids: &[String]) -> Result<CountMatrix> {
        let indices = sample_ids
            .iter()
            .map(|id| {
                self.sample_ids
                    .iter()
                    .position(|s| s == id)
                    .ok_or_else(|| DeError::InputMismatch {
                        reason: format!("sample '{}' is not a column of the count matrix", id),
                    })
            })
            .collect::<Result<Vec<usize>>>()?;

        Ok(CountMatrix {
            counts: self.counts.select(Axis(1), &indices),
            gene_ids: self.gene_ids.clone(),
            sample_ids: sample_ids.to_vec(),
        })
    }

    /// Replace the sample identifiers, keeping column order
    pub(crate) fn with_sample_ids(mut self, sample_ids: Vec<String>) -> Result<CountMatrix> {
        if sample_ids.len() != self.n_samples() {
            return Err(DeError::DimensionMismatch {
                expected: format!("{} sample IDs", self.n_samples()),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }
        self.sample_ids = sample_ids;
        Ok(self)
    }
}
