//! Per-sample categorical annotations used to build designs

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{DeError, Result};

/// One record per sample with categorical columns (e.g. CellType, Status)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleInfo {
    sample_ids: Vec<String>,
    columns: BTreeMap<String, Vec<String>>,
}

impl SampleInfo {
    /// Create sample info with no columns. Sample identifiers must be unique.
    pub fn new(sample_ids: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(sample_ids.len());
        for id in &sample_ids {
            if !seen.insert(id.as_str()) {
                return Err(DeError::InvalidSampleInfo {
                    reason: format!("duplicate sample identifier '{}'", id),
                });
            }
        }
        Ok(Self {
            sample_ids,
            columns: BTreeMap::new(),
        })
    }

    /// Add a categorical column (one value per sample, in sample order)
    pub fn add_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.sample_ids.len() {
            return Err(DeError::DimensionMismatch {
                expected: format!("{} values for column '{}'", self.sample_ids.len(), name),
                got: format!("{} values", values.len()),
            });
        }
        self.columns.insert(name.to_string(), values);
        Ok(())
    }

    /// Builder-style variant of [`SampleInfo::add_column`]
    pub fn with_column(mut self, name: &str, values: &[&str]) -> Result<Self> {
        self.add_column(name, values.iter().map(|v| v.to_string()).collect())?;
        Ok(self)
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Values of a column, in sample order
    pub fn column(&self, name: &str) -> Option<&[String]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    /// Value of a column for one sample
    pub fn value(&self, name: &str, sample_idx: usize) -> Result<&str> {
        self.columns
            .get(name)
            .and_then(|v| v.get(sample_idx))
            .map(|s| s.as_str())
            .ok_or_else(|| DeError::InvalidInput {
                reason: format!("column '{}' or sample index {} not found", name, sample_idx),
            })
    }

    /// Distinct values of a column in order of first appearance.
    ///
    /// This is informational only; designs always take an explicit level order.
    pub fn observed_levels(&self, name: &str) -> Option<Vec<String>> {
        self.columns.get(name).map(|values| {
            let mut seen = HashSet::new();
            values
                .iter()
                .filter(|v| seen.insert(v.as_str()))
                .cloned()
                .collect()
        })
    }

    /// Samples carrying a given level of a column
    pub fn samples_with_level(&self, name: &str, level: &str) -> Vec<usize> {
        self.columns
            .get(name)
            .map(|values| {
                values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| *v == level)
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reorder records to the given sample order. Every id must be present.
    pub fn reorder(&self, sample_ids: &[String]) -> Result<SampleInfo> {
        let indices = sample_ids
            .iter()
            .map(|id| {
                self.sample_ids
                    .iter()
                    .position(|s| s == id)
                    .ok_or_else(|| DeError::InputMismatch {
                        reason: format!("sample '{}' has no sample info record", id),
                    })
            })
            .collect::<Result<Vec<usize>>>()?;

        let columns = self
            .columns
            .iter()
            .map(|(name, values)| {
                let reordered = indices.iter().map(|&i| values[i].clone()).collect();
                (name.clone(), reordered)
            })
            .collect();

        Ok(SampleInfo {
            sample_ids: sample_ids.to_vec(),
            columns,
        })
    }
}
