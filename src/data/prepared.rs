//! Aligning count columns with sample records and pre-filtering genes

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{CountMatrix, SampleInfo};
use crate::error::{DeError, Result};

/// Options controlling how raw inputs are reconciled
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Genes with a total count at or below this value are dropped
    pub min_total_count: f64,
    /// Suffixes removed from count column names before matching (first match wins)
    pub strip_suffixes: Vec<String>,
    /// Sample sheet column holding the count table's column names
    pub sample_id_column: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            min_total_count: 5.0,
            strip_suffixes: vec![".bam".to_string(), ".sam".to_string(), ".cram".to_string()],
            sample_id_column: "FileName".to_string(),
        }
    }
}

/// Filtered counts plus sample info in count-column order.
///
/// This is the bundle handed from pre-processing to model fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedData {
    pub counts: CountMatrix,
    pub sample_info: SampleInfo,
}

impl PreparedData {
    /// Pair counts and sample info that are already aligned column-for-record
    pub fn new(counts: CountMatrix, sample_info: SampleInfo) -> Result<Self> {
        if counts.sample_ids() != sample_info.sample_ids() {
            return Err(DeError::InputMismatch {
                reason: format!(
                    "count columns {:?} do not match sample info records {:?}",
                    counts.sample_ids(),
                    sample_info.sample_ids()
                ),
            });
        }
        Ok(Self { counts, sample_info })
    }

    pub fn n_genes(&self) -> usize {
        self.counts.n_genes()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.n_samples()
    }
}

/// Remove the first matching suffix from a count column name
pub fn strip_sample_suffix<'a>(name: &'a str, suffixes: &[String]) -> &'a str {
    suffixes
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix.as_str()))
        .unwrap_or(name)
}

/// Align count columns to sample records and apply the low-count filter.
///
/// Column names are matched after suffix stripping and must equal the sample
/// info identifiers as a set; any disagreement is an [`DeError::InputMismatch`].
/// Sample info is reordered to follow the count columns.
pub fn reconcile(counts: CountMatrix, sample_info: SampleInfo, options: &LoadOptions) -> Result<PreparedData> {
    let stripped: Vec<String> = counts
        .sample_ids()
        .iter()
        .map(|id| strip_sample_suffix(id, &options.strip_suffixes).to_string())
        .collect();

    let mut seen = HashSet::with_capacity(stripped.len());
    for id in &stripped {
        if !seen.insert(id.as_str()) {
            return Err(DeError::InputMismatch {
                reason: format!("count column '{}' appears more than once after suffix stripping", id),
            });
        }
    }

    let info_ids: HashSet<&str> = sample_info.sample_ids().iter().map(|s| s.as_str()).collect();
    let missing_in_info: Vec<&str> = stripped
        .iter()
        .map(|s| s.as_str())
        .filter(|id| !info_ids.contains(id))
        .collect();
    let missing_in_counts: Vec<&str> = sample_info
        .sample_ids()
        .iter()
        .map(|s| s.as_str())
        .filter(|id| !seen.contains(id))
        .collect();

    if !missing_in_info.is_empty() || !missing_in_counts.is_empty() {
        let mut msg = String::from("sample identifiers do not match between counts and sample info.");
        if !missing_in_info.is_empty() {
            msg.push_str(&format!(" In counts but not sample info: {:?}.", missing_in_info));
        }
        if !missing_in_counts.is_empty() {
            msg.push_str(&format!(" In sample info but not counts: {:?}.", missing_in_counts));
        }
        return Err(DeError::InputMismatch { reason: msg });
    }

    let counts = counts.with_sample_ids(stripped.clone())?;
    let sample_info = sample_info.reorder(&stripped)?;
    let counts = counts.filter_low_counts(options.min_total_count);

    if counts.n_genes() == 0 {
        return Err(DeError::EmptyData {
            reason: format!("no gene has a total count above {}", options.min_total_count),
        });
    }

    PreparedData::new(counts, sample_info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn raw_counts() -> CountMatrix {
        CountMatrix::new(
            array![
                [0.0, 1.0, 2.0, 1.0],
                [10.0, 20.0, 30.0, 40.0],
                [7.0, 0.0, 0.0, 0.0]
            ],
            vec!["G1".into(), "G2".into(), "G3".into()],
            vec!["MCL1.DG.bam".into(), "MCL1.DH.bam".into(), "MCL1.LA.bam".into(), "MCL1.LB.bam".into()],
        )
        .unwrap()
    }

    fn info(ids: &[&str]) -> SampleInfo {
        let status = ["virgin", "virgin", "lactate", "lactate"];
        SampleInfo::new(ids.iter().map(|s| s.to_string()).collect())
            .unwrap()
            .with_column("Status", &status[..ids.len()])
            .unwrap()
    }

    #[test]
    fn test_strip_suffix() {
        let suffixes = LoadOptions::default().strip_suffixes;
        assert_eq!(strip_sample_suffix("MCL1.DG.bam", &suffixes), "MCL1.DG");
        assert_eq!(strip_sample_suffix("MCL1.DG", &suffixes), "MCL1.DG");
    }

    #[test]
    fn test_reconcile_reorders_and_filters() {
        let sample_info = info(&["MCL1.LB", "MCL1.DG", "MCL1.LA", "MCL1.DH"]);
        let prepared = reconcile(raw_counts(), sample_info, &LoadOptions::default()).unwrap();

        assert_eq!(prepared.counts.gene_ids(), &["G2", "G3"]);
        assert_eq!(prepared.counts.sample_ids(), prepared.sample_info.sample_ids());
        assert_eq!(prepared.sample_info.sample_ids()[0], "MCL1.DG");
        // MCL1.DG was the second record and carried "virgin"
        assert_eq!(prepared.sample_info.value("Status", 0).unwrap(), "virgin");
    }

    #[test]
    fn test_reconcile_mismatch_is_input_mismatch() {
        let sample_info = info(&["MCL1.DG", "MCL1.DH", "MCL1.LA", "MCL1.XX"]);
        let err = reconcile(raw_counts(), sample_info, &LoadOptions::default()).unwrap_err();
        match err {
            DeError::InputMismatch { reason } => {
                assert!(reason.contains("MCL1.LB"));
                assert!(reason.contains("MCL1.XX"));
            }
            other => panic!("expected InputMismatch, got {:?}", other),
        }

        let fewer = info(&["MCL1.DG", "MCL1.DH", "MCL1.LA"]);
        assert!(matches!(
            reconcile(raw_counts(), fewer, &LoadOptions::default()),
            Err(DeError::InputMismatch { .. })
        ));
    }

    #[test]
    fn test_prepared_data_requires_alignment() {
        let counts = CountMatrix::new(array![[1.0, 2.0]], vec!["g".into()], vec!["a".into(), "b".into()]).unwrap();
        let sample_info = SampleInfo::new(vec!["b".into(), "a".into()]).unwrap();
        assert!(matches!(
            PreparedData::new(counts, sample_info),
            Err(DeError::InputMismatch { .. })
        ));
    }
}
