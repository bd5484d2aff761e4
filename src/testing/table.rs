//! Per-gene results table and contrast specifications

use std::fmt;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{DeError, Result};
use crate::glm::DesignInfo;

/// Which test produced the statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestKind {
    Wald,
    LikelihoodRatio,
}

/// What to compare.
///
/// Orientation is always explicit: a level contrast names both its numerator
/// and its denominator, and a coefficient is reported as named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContrastSpec {
    /// A single coefficient from [`crate::model::FittedModel::results_names`]
    Coefficient(String),
    /// `numerator` vs `denominator` of one factor; neither needs to be the
    /// reference level
    Levels {
        factor: String,
        numerator: String,
        denominator: String,
    },
    /// Weights on the coefficients, one per coefficient
    Numeric(Vec<f64>),
}

impl ContrastSpec {
    pub fn coefficient(name: &str) -> Self {
        ContrastSpec::Coefficient(name.to_string())
    }

    pub fn levels(factor: &str, numerator: &str, denominator: &str) -> Self {
        ContrastSpec::Levels {
            factor: factor.to_string(),
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
        }
    }

    pub fn numeric(weights: Vec<f64>) -> Self {
        ContrastSpec::Numeric(weights)
    }

    /// Contrast vector over the coefficients of `info`
    pub fn resolve(&self, info: &DesignInfo) -> Result<Array1<f64>> {
        match self {
            ContrastSpec::Coefficient(name) => {
                let idx = info.coefficient_index(name)?;
                let mut c = Array1::zeros(info.n_coefs());
                c[idx] = 1.0;
                Ok(c)
            }
            ContrastSpec::Levels {
                factor,
                numerator,
                denominator,
            } => info.level_contrast(factor, numerator, denominator),
            ContrastSpec::Numeric(weights) => {
                if weights.len() != info.n_coefs() {
                    return Err(DeError::InvalidContrast {
                        reason: format!(
                            "numeric contrast has {} weights but the model has {} coefficients ({})",
                            weights.len(),
                            info.n_coefs(),
                            info.coef_names.join(", ")
                        ),
                    });
                }
                if weights.iter().any(|w| !w.is_finite()) || weights.iter().all(|&w| w == 0.0) {
                    return Err(DeError::InvalidContrast {
                        reason: "numeric contrast must be finite and not all zero".to_string(),
                    });
                }
                Ok(Array1::from(weights.clone()))
            }
        }
    }

    /// Human-readable label, e.g. `Status pregnant vs virgin`
    pub fn description(&self) -> String {
        match self {
            ContrastSpec::Coefficient(name) => name.clone(),
            ContrastSpec::Levels {
                factor,
                numerator,
                denominator,
            } => format!("{} {} vs {}", factor, numerator, denominator),
            ContrastSpec::Numeric(weights) => format!("numeric contrast {:?}", weights),
        }
    }
}

/// One row per gene, in count-matrix order unless reordered.
///
/// `NaN` marks a value that does not apply (written as `NA`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsTable {
    pub gene_ids: Vec<String>,
    pub base_means: Vec<f64>,
    pub log2_fold_changes: Vec<f64>,
    pub lfc_se: Vec<f64>,
    pub stat: Vec<f64>,
    pub pvalues: Vec<f64>,
    pub padj: Vec<f64>,
    /// Dispersion each gene was tested with
    pub dispersions: Vec<f64>,
    pub description: String,
    pub test: TestKind,
}

impl ResultsTable {
    pub fn n_genes(&self) -> usize {
        self.gene_ids.len()
    }

    pub fn gene_index(&self, gene_id: &str) -> Option<usize> {
        self.gene_ids.iter().position(|g| g == gene_id)
    }

    /// Rows in the given order; indices may repeat or omit rows
    pub fn reorder(&self, order: &[usize]) -> ResultsTable {
        let pick = |v: &Vec<f64>| order.iter().map(|&i| v[i]).collect::<Vec<f64>>();
        ResultsTable {
            gene_ids: order.iter().map(|&i| self.gene_ids[i].clone()).collect(),
            base_means: pick(&self.base_means),
            log2_fold_changes: pick(&self.log2_fold_changes),
            lfc_se: pick(&self.lfc_se),
            stat: pick(&self.stat),
            pvalues: pick(&self.pvalues),
            padj: pick(&self.padj),
            dispersions: pick(&self.dispersions),
            description: self.description.clone(),
            test: self.test,
        }
    }

    fn is_significant(&self, i: usize, alpha: f64) -> bool {
        self.padj[i].is_finite() && self.padj[i] < alpha
    }

    pub fn significant_genes(&self, alpha: f64) -> Vec<&str> {
        (0..self.n_genes())
            .filter(|&i| self.is_significant(i, alpha))
            .map(|i| self.gene_ids[i].as_str())
            .collect()
    }

    pub fn summary(&self, alpha: f64) -> ResultsSummary {
        let n = self.n_genes();
        let significant: Vec<usize> = (0..n).filter(|&i| self.is_significant(i, alpha)).collect();
        ResultsSummary {
            description: self.description.clone(),
            total_genes: n,
            genes_tested: self.pvalues.iter().filter(|p| p.is_finite()).count(),
            filtered: (0..n)
                .filter(|&i| self.pvalues[i].is_finite() && self.padj[i].is_nan())
                .count(),
            significant: significant.len(),
            upregulated: significant.iter().filter(|&&i| self.log2_fold_changes[i] > 0.0).count(),
            downregulated: significant.iter().filter(|&&i| self.log2_fold_changes[i] < 0.0).count(),
            alpha,
        }
    }
}

/// Counts of tested and significant genes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub description: String,
    pub total_genes: usize,
    pub genes_tested: usize,
    /// Tested genes whose adjusted p-value was removed by independent filtering
    pub filtered: usize,
    pub significant: usize,
    pub upregulated: usize,
    pub downregulated: usize,
    pub alpha: f64,
}

impl fmt::Display for ResultsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.description)?;
        writeln!(f, "Total genes: {}", self.total_genes)?;
        writeln!(f, "Genes tested: {}", self.genes_tested)?;
        writeln!(f, "Removed by independent filtering: {}", self.filtered)?;
        writeln!(f, "Significant (FDR < {}): {}", self.alpha, self.significant)?;
        writeln!(f, "  Up: {}", self.upregulated)?;
        writeln!(f, "  Down: {}", self.downregulated)?;
        Ok(())
    }
}
