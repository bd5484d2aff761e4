//! Plot-ready tables for the usual diagnostic figures
//!
//! Nothing here draws; each function returns the numbers a plotting tool
//! needs, in a shape that serialises to one row per point.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{DeError, Result};
use crate::linalg::symmetric_eigen;
use crate::model::FittedModel;
use crate::shrinkage::ShrunkenLfc;
use crate::stats::sample_variance;
use crate::testing::ResultsTable;

/// Largest `-log10(padj)` reported; `padj = 0` maps here
pub const MAX_NEG_LOG10_PADJ: f64 = 300.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaPoint {
    pub gene_id: String,
    pub base_mean: f64,
    pub log2_fold_change: f64,
    pub significant: bool,
}

/// Mean expression against fold change, shrunken when `shrunk` is given.
///
/// `shrunk` must be row-aligned with `results`. Genes with zero mean or no
/// fold change are left out.
pub fn ma_points(results: &ResultsTable, alpha: f64, shrunk: Option<&ShrunkenLfc>) -> Vec<MaPoint> {
    (0..results.n_genes())
        .filter_map(|i| {
            let lfc = shrunk.map_or(results.log2_fold_changes[i], |s| s.log2_fold_changes[i]);
            let base_mean = results.base_means[i];
            if base_mean <= 0.0 || !lfc.is_finite() {
                return None;
            }
            Some(MaPoint {
                gene_id: results.gene_ids[i].clone(),
                base_mean,
                log2_fold_change: lfc,
                significant: results.padj[i] < alpha,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolcanoPoint {
    pub gene_id: String,
    pub log2_fold_change: f64,
    pub neg_log10_padj: f64,
    pub significant: bool,
}

/// Fold change against `-log10(padj)` for genes with an adjusted p-value
pub fn volcano_points(results: &ResultsTable, alpha: f64) -> Vec<VolcanoPoint> {
    (0..results.n_genes())
        .filter(|&i| results.padj[i].is_finite() && results.log2_fold_changes[i].is_finite())
        .map(|i| VolcanoPoint {
            gene_id: results.gene_ids[i].clone(),
            log2_fold_change: results.log2_fold_changes[i],
            neg_log10_padj: (-results.padj[i].log10()).min(MAX_NEG_LOG10_PADJ),
            significant: results.padj[i] < alpha,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountPoint {
    pub sample_id: String,
    pub level: String,
    pub normalized_count: f64,
}

/// Normalized counts of one gene per sample, labelled by a sample column
pub fn gene_counts(model: &FittedModel, gene_id: &str, factor: &str) -> Result<Vec<CountPoint>> {
    let gene = model.counts().gene_index(gene_id).ok_or_else(|| DeError::InvalidInput {
        reason: format!("gene '{}' is not in the count matrix", gene_id),
    })?;
    let levels = model.sample_info().column(factor).ok_or_else(|| DeError::InvalidInput {
        reason: format!("sample info has no column '{}'", factor),
    })?;
    let sf = model.size_factors().ok_or_else(|| DeError::StageOrder {
        reason: "size factors are needed for normalized counts".to_string(),
    })?;
    let counts = model.counts().counts();
    Ok(model
        .sample_info()
        .sample_ids()
        .iter()
        .enumerate()
        .map(|(j, sample_id)| CountPoint {
            sample_id: sample_id.clone(),
            level: levels[j].clone(),
            normalized_count: counts[[gene, j]] / sf[j],
        })
        .collect())
}

/// `log2(normalized + 1)`, genes by samples
fn log_expression(model: &FittedModel) -> Result<Array2<f64>> {
    Ok(model.normalized_counts()?.mapv(|x| (x + 1.0).log2()))
}

/// Principal components of the samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pca {
    pub sample_ids: Vec<String>,
    /// Samples by components
    pub scores: Array2<f64>,
    /// Percent of the total variance of the selected genes per component
    pub percent_variance: Vec<f64>,
    /// Number of genes used
    pub n_genes: usize,
}

/// PCA of `log2(normalized + 1)` over the `n_top` most variable genes.
///
/// Component signs are fixed so that the largest absolute score is positive.
pub fn pca(model: &FittedModel, n_top: usize, n_components: usize) -> Result<Pca> {
    let expr = log_expression(model)?;
    let n_samples = expr.ncols();
    if n_samples < 2 {
        return Err(DeError::InvalidInput {
            reason: "PCA needs at least two samples".to_string(),
        });
    }

    let variances: Vec<f64> = expr
        .axis_iter(Axis(0))
        .map(|row| sample_variance(&row.to_vec()))
        .collect();
    let mut order: Vec<usize> = (0..expr.nrows()).collect();
    order.sort_by(|&a, &b| variances[b].total_cmp(&variances[a]));
    order.truncate(n_top.min(order.len()));

    // samples by selected genes, centred per gene
    let mut x = expr.select(Axis(0), &order).reversed_axes();
    let means = x.mean_axis(Axis(0)).ok_or_else(|| DeError::EmptyData {
        reason: "no genes selected for PCA".to_string(),
    })?;
    x -= &means;

    let gram = x.dot(&x.t());
    let (values, vectors) = symmetric_eigen(gram.view());
    let total: f64 = values.iter().map(|v| v.max(0.0)).sum();
    let k = n_components.min(n_samples);

    let mut scores = Array2::zeros((n_samples, k));
    let mut percent_variance = Vec::with_capacity(k);
    for c in 0..k {
        let lambda = values[c].max(0.0);
        let v = vectors.column(c);
        let pivot = v.iter().fold(0.0_f64, |acc, &x| if x.abs() > acc.abs() { x } else { acc });
        let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
        scores.column_mut(c).assign(&v.mapv(|x| sign * x * lambda.sqrt()));
        percent_variance.push(if total > 0.0 { 100.0 * lambda / total } else { 0.0 });
    }

    log::debug!("PCA over {} genes: {:?}% variance", order.len(), percent_variance);
    Ok(Pca {
        sample_ids: model.sample_info().sample_ids().to_vec(),
        scores,
        percent_variance,
        n_genes: order.len(),
    })
}

/// Row-scaled expression for a heatmap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heatmap {
    pub gene_ids: Vec<String>,
    pub sample_ids: Vec<String>,
    /// Genes by samples, each row z-scored
    pub values: Array2<f64>,
}

/// z-scored `log2(normalized + 1)` of the given count-matrix rows.
///
/// A gene with constant expression gets a row of zeros.
pub fn heatmap_matrix(model: &FittedModel, genes: &[usize]) -> Result<Heatmap> {
    let n_genes = model.gene_ids().len();
    if let Some(&bad) = genes.iter().find(|&&g| g >= n_genes) {
        return Err(DeError::InvalidInput {
            reason: format!("gene row {} is out of range ({} genes)", bad, n_genes),
        });
    }
    let mut values = log_expression(model)?.select(Axis(0), genes);
    for mut row in values.axis_iter_mut(Axis(0)) {
        let mean = row.mean().unwrap_or(0.0);
        let sd = sample_variance(&row.to_vec()).sqrt();
        if sd > 0.0 && sd.is_finite() {
            row.mapv_inplace(|x| (x - mean) / sd);
        } else {
            row.fill(0.0);
        }
    }
    Ok(Heatmap {
        gene_ids: genes.iter().map(|&g| model.gene_ids()[g].clone()).collect(),
        sample_ids: model.sample_info().sample_ids().to_vec(),
        values,
    })
}
