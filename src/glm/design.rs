//! Designs with explicit factor-level ordering and their model matrices

use std::collections::{BTreeMap, HashSet};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::data::SampleInfo;
use crate::error::{DeError, Result};
use crate::linalg::qr_rank;

/// A categorical factor with an explicit level order. The first level is the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Factor {
    pub name: String,
    pub levels: Vec<String>,
}

impl Factor {
    pub fn new(name: &str, levels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            levels: levels.iter().map(|l| l.to_string()).collect(),
        }
    }

    /// Reference (baseline) level
    pub fn reference(&self) -> &str {
        self.levels.first().map(|s| s.as_str()).unwrap_or("")
    }

    fn position(&self, level: &str) -> Option<usize> {
        self.levels.iter().position(|l| l == level)
    }
}

/// Additive design over ordered factors, optionally with the pairwise
/// interaction of two factors.
///
/// Designs are plain values: a fitted model keeps its own copy, and a
/// different design always produces a different model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Design {
    factors: Vec<Factor>,
    interaction: bool,
}

impl Design {
    /// Intercept-only design (`~1`); add factors with [`Design::factor`]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factor(self, name: &str, levels: &[&str]) -> Self {
        self.with_factor(Factor::new(name, levels))
    }

    pub fn with_factor(mut self, factor: Factor) -> Self {
        self.factors.push(factor);
        self
    }

    /// Include the interaction of the two factors (`~A * B`)
    pub fn with_interaction(mut self) -> Self {
        self.interaction = true;
        self
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn has_interaction(&self) -> bool {
        self.interaction
    }

    /// Formula rendering, e.g. `~CellType + Status` or `~CellType * Status`
    pub fn formula(&self) -> String {
        if self.factors.is_empty() {
            return "~1".to_string();
        }
        let sep = if self.interaction { " * " } else { " + " };
        let names: Vec<&str> = self.factors.iter().map(|f| f.name.as_str()).collect();
        format!("~{}", names.join(sep))
    }

    /// Structural checks that do not need sample data
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for factor in &self.factors {
            if !names.insert(factor.name.as_str()) {
                return Err(DeError::InvalidDesign {
                    reason: format!("factor '{}' appears more than once", factor.name),
                });
            }
            if factor.levels.is_empty() {
                return Err(DeError::InvalidDesign {
                    reason: format!("factor '{}' has no levels", factor.name),
                });
            }
            let mut seen = HashSet::new();
            for level in &factor.levels {
                if !seen.insert(level.as_str()) {
                    return Err(DeError::InvalidDesign {
                        reason: format!("level '{}' listed twice for factor '{}'", level, factor.name),
                    });
                }
            }
        }
        if self.interaction && self.factors.len() != 2 {
            return Err(DeError::InvalidDesign {
                reason: format!(
                    "an interaction needs exactly two factors, design has {}",
                    self.factors.len()
                ),
            });
        }
        Ok(())
    }

    /// Build the treatment-coded model matrix for the given samples.
    ///
    /// Columns: intercept, one indicator per non-reference level of each
    /// factor in order, then the interaction indicators if requested.
    pub fn model_matrix(&self, samples: &SampleInfo) -> Result<(Array2<f64>, DesignInfo)> {
        self.validate()?;
        let n_samples = samples.n_samples();

        // level index of every sample for every factor
        let mut level_idx: Vec<Vec<usize>> = Vec::with_capacity(self.factors.len());
        for factor in &self.factors {
            let values = samples.column(&factor.name).ok_or_else(|| DeError::InvalidDesign {
                reason: format!("factor '{}' is not a sample info column", factor.name),
            })?;
            let idx = values
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    factor.position(v).ok_or_else(|| DeError::InvalidDesign {
                        reason: format!(
                            "sample '{}' has {} = '{}', which is not among the declared levels {:?}",
                            samples.sample_ids()[i],
                            factor.name,
                            v,
                            factor.levels
                        ),
                    })
                })
                .collect::<Result<Vec<usize>>>()?;
            level_idx.push(idx);
        }

        let mut coef_names = vec!["Intercept".to_string()];
        let mut factor_columns = BTreeMap::new();
        for factor in &self.factors {
            let mut cols = Vec::with_capacity(factor.levels.len() - 1);
            for level in factor.levels.iter().skip(1) {
                cols.push(coef_names.len());
                coef_names.push(format!("{}_{}_vs_{}", factor.name, level, factor.reference()));
            }
            factor_columns.insert(factor.name.clone(), cols);
        }
        if self.interaction {
            let (f1, f2) = (&self.factors[0], &self.factors[1]);
            for l1 in f1.levels.iter().skip(1) {
                for l2 in f2.levels.iter().skip(1) {
                    coef_names.push(format!("{}_{}_x_{}_{}", f1.name, l1, f2.name, l2));
                }
            }
        }

        let n_coefs = coef_names.len();
        let mut matrix = Array2::zeros((n_samples, n_coefs));
        for i in 0..n_samples {
            matrix[[i, 0]] = 1.0;
            for (f, factor) in self.factors.iter().enumerate() {
                let level = level_idx[f][i];
                if level > 0 {
                    matrix[[i, factor_columns[&factor.name][level - 1]]] = 1.0;
                }
            }
            if self.interaction {
                let n2 = self.factors[1].levels.len() - 1;
                let (a, b) = (level_idx[0][i], level_idx[1][i]);
                if a > 0 && b > 0 {
                    let base = 1 + (self.factors[0].levels.len() - 1) + n2;
                    matrix[[i, base + (a - 1) * n2 + (b - 1)]] = 1.0;
                }
            }
        }

        check_full_rank(&matrix)?;

        let info = DesignInfo {
            coef_names,
            factors: self.factors.clone(),
            factor_columns,
        };
        Ok((matrix, info))
    }
}

/// Resolved coefficient layout of a design
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignInfo {
    /// Coefficient names in model-matrix column order
    pub coef_names: Vec<String>,
    pub factors: Vec<Factor>,
    /// Model-matrix columns of each factor's non-reference levels
    pub factor_columns: BTreeMap<String, Vec<usize>>,
}

impl DesignInfo {
    pub fn n_coefs(&self) -> usize {
        self.coef_names.len()
    }

    /// Column of a named coefficient
    pub fn coefficient_index(&self, name: &str) -> Result<usize> {
        self.coef_names
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DeError::InvalidContrast {
                reason: format!(
                    "coefficient '{}' is not in the model; available: {}",
                    name,
                    self.coef_names.join(", ")
                ),
            })
    }

    /// Contrast vector comparing two levels of one factor (`numerator - denominator`).
    ///
    /// Works for any pair of levels: the reference level contributes a zero
    /// column, so two non-reference levels give the difference of their
    /// coefficients.
    pub fn level_contrast(&self, factor: &str, numerator: &str, denominator: &str) -> Result<Array1<f64>> {
        let spec = self
            .factors
            .iter()
            .find(|f| f.name == factor)
            .ok_or_else(|| DeError::InvalidContrast {
                reason: format!("factor '{}' is not part of the design", factor),
            })?;
        if numerator == denominator {
            return Err(DeError::InvalidContrast {
                reason: format!("numerator and denominator are both '{}'", numerator),
            });
        }
        let lookup = |level: &str| {
            spec.position(level).ok_or_else(|| DeError::InvalidContrast {
                reason: format!(
                    "level '{}' is not a level of factor '{}' (levels: {:?})",
                    level, factor, spec.levels
                ),
            })
        };
        let num = lookup(numerator)?;
        let den = lookup(denominator)?;

        let cols = &self.factor_columns[&spec.name];
        let mut contrast = Array1::zeros(self.n_coefs());
        if num > 0 {
            contrast[cols[num - 1]] += 1.0;
        }
        if den > 0 {
            contrast[cols[den - 1]] -= 1.0;
        }
        Ok(contrast)
    }

    /// True when every coefficient of `self` is also in `other` and `other` has more
    pub fn is_strict_subset_of(&self, other: &DesignInfo) -> bool {
        let theirs: HashSet<&str> = other.coef_names.iter().map(|s| s.as_str()).collect();
        self.coef_names.len() < other.coef_names.len()
            && self.coef_names.iter().all(|c| theirs.contains(c.as_str()))
    }
}

/// Reject model matrices without full column rank
pub fn check_full_rank(matrix: &Array2<f64>) -> Result<()> {
    let (nrow, ncol) = matrix.dim();
    if nrow == 0 || ncol == 0 {
        return Err(DeError::InvalidDesign {
            reason: "model matrix has zero rows or columns".to_string(),
        });
    }
    if qr_rank(matrix.view()) < ncol {
        let zero_column = (0..ncol).any(|j| matrix.column(j).iter().all(|&v| v == 0.0));
        let reason = if zero_column {
            "the model matrix is not full rank: some levels or level combinations have no samples"
        } else {
            "the model matrix is not full rank: some terms are linear combinations of others"
        };
        return Err(DeError::InvalidDesign {
            reason: reason.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> SampleInfo {
        SampleInfo::new((1..=6).map(|i| format!("s{}", i)).collect())
            .unwrap()
            .with_column("CellType", &["basal", "basal", "basal", "luminal", "luminal", "luminal"])
            .unwrap()
            .with_column("Status", &["virgin", "pregnant", "lactate", "virgin", "pregnant", "lactate"])
            .unwrap()
    }

    fn status() -> Factor {
        Factor::new("Status", &["virgin", "pregnant", "lactate"])
    }

    #[test]
    fn test_formula() {
        assert_eq!(Design::new().formula(), "~1");
        let d = Design::new().factor("CellType", &["basal", "luminal"]).with_factor(status());
        assert_eq!(d.formula(), "~CellType + Status");
        assert_eq!(d.with_interaction().formula(), "~CellType * Status");
    }

    #[test]
    fn test_additive_model_matrix() {
        let design = Design::new().factor("CellType", &["basal", "luminal"]).with_factor(status());
        let (x, info) = design.model_matrix(&samples()).unwrap();

        assert_eq!(
            info.coef_names,
            vec![
                "Intercept",
                "CellType_luminal_vs_basal",
                "Status_pregnant_vs_virgin",
                "Status_lactate_vs_virgin"
            ]
        );
        assert_eq!(x.dim(), (6, 4));
        // luminal lactate sample
        assert_eq!(x.row(5).to_vec(), vec![1.0, 1.0, 0.0, 1.0]);
        // basal virgin sample is the baseline
        assert_eq!(x.row(0).to_vec(), vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_reference_level_follows_declared_order() {
        let design = Design::new().factor("Status", &["lactate", "virgin", "pregnant"]);
        let (_, info) = design.model_matrix(&samples()).unwrap();
        assert_eq!(
            info.coef_names,
            vec!["Intercept", "Status_virgin_vs_lactate", "Status_pregnant_vs_lactate"]
        );
    }

    #[test]
    fn test_interaction_columns() {
        let data = SampleInfo::new((1..=8).map(|i| format!("s{}", i)).collect())
            .unwrap()
            .with_column("CellType", &["basal", "basal", "basal", "basal", "luminal", "luminal", "luminal", "luminal"])
            .unwrap()
            .with_column("Status", &["virgin", "virgin", "lactate", "lactate", "virgin", "virgin", "lactate", "lactate"])
            .unwrap();
        let design = Design::new()
            .factor("CellType", &["basal", "luminal"])
            .factor("Status", &["virgin", "lactate"])
            .with_interaction();
        let (x, info) = design.model_matrix(&data).unwrap();

        assert_eq!(info.coef_names[3], "CellType_luminal_x_Status_lactate");
        assert_eq!(x.row(6).to_vec(), vec![1.0, 1.0, 1.0, 1.0]);
        assert_eq!(x.row(2).to_vec(), vec![1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_undeclared_level_is_rejected() {
        let design = Design::new().factor("Status", &["virgin", "pregnant"]);
        let err = design.model_matrix(&samples()).unwrap_err();
        assert!(matches!(err, DeError::InvalidDesign { .. }));
    }

    #[test]
    fn test_empty_level_is_rank_deficient() {
        let design = Design::new().factor("Status", &["virgin", "pregnant", "lactate", "involution"]);
        let err = design.model_matrix(&samples()).unwrap_err();
        assert!(matches!(err, DeError::InvalidDesign { .. }));
    }

    #[test]
    fn test_structural_validation() {
        let dup = Design::new().factor("Status", &["a", "a"]);
        assert!(dup.validate().is_err());
        let lone = Design::new().factor("Status", &["a", "b"]).with_interaction();
        assert!(lone.validate().is_err());
        let unknown = Design::new().factor("Batch", &["1", "2"]);
        assert!(matches!(unknown.model_matrix(&samples()), Err(DeError::InvalidDesign { .. })));
    }

    #[test]
    fn test_level_contrast_between_non_reference_levels() {
        let design = Design::new().factor("CellType", &["basal", "luminal"]).with_factor(status());
        let (_, info) = design.model_matrix(&samples()).unwrap();

        let c = info.level_contrast("Status", "lactate", "pregnant").unwrap();
        assert_eq!(c.to_vec(), vec![0.0, 0.0, -1.0, 1.0]);

        let c = info.level_contrast("Status", "virgin", "pregnant").unwrap();
        assert_eq!(c.to_vec(), vec![0.0, 0.0, -1.0, 0.0]);

        assert!(matches!(
            info.level_contrast("Status", "virgin", "virgin"),
            Err(DeError::InvalidContrast { .. })
        ));
        assert!(matches!(
            info.level_contrast("Status", "involution", "virgin"),
            Err(DeError::InvalidContrast { .. })
        ));
        assert!(matches!(
            info.level_contrast("Batch", "a", "b"),
            Err(DeError::InvalidContrast { .. })
        ));
    }

    #[test]
    fn test_strict_subset() {
        let full = Design::new().factor("CellType", &["basal", "luminal"]).with_factor(status());
        let reduced = Design::new().factor("CellType", &["basal", "luminal"]);
        let other_ref = Design::new().factor("CellType", &["luminal", "basal"]);
        let (_, full_info) = full.model_matrix(&samples()).unwrap();
        let (_, reduced_info) = reduced.model_matrix(&samples()).unwrap();
        let (_, other_info) = other_ref.model_matrix(&samples()).unwrap();

        assert!(reduced_info.is_strict_subset_of(&full_info));
        assert!(!full_info.is_strict_subset_of(&reduced_info));
        assert!(!full_info.is_strict_subset_of(&full_info));
        assert!(!other_info.is_strict_subset_of(&full_info));
        assert!(full_info.coefficient_index("Status_lactate_vs_virgin").is_ok());
        assert!(matches!(
            full_info.coefficient_index("Status_lactate_vs_pregnant"),
            Err(DeError::InvalidContrast { .. })
        ));
    }
}
