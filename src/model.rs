//! The fitted model: counts, design and every stage output as one value
//!
//! Stages run in a fixed order (size factors, dispersions, GLM) and each one
//! consumes the model and returns a new one, so a model can never be
//! half-updated or refit in place. A different design means a different
//! model; see [`FittedModel::with_design`].

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::data::{CountMatrix, PreparedData, SampleInfo};
use crate::dispersion::{self, DispersionEstimates, DispersionParams};
use crate::error::{DeError, Result};
use crate::glm::{fit_nb_glm, Design, DesignInfo, GlmFit, GlmFitParams};
use crate::normalization::{self, SizeFactorMethod};

/// Parameters of all three fitting stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineParams {
    pub size_factor_method: SizeFactorMethod,
    pub dispersion: DispersionParams,
    pub glm: GlmFitParams,
}

/// Counts, sample info and design together with the outputs of the stages
/// applied so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    data: PreparedData,
    design: Design,
    design_info: DesignInfo,
    model_matrix: Array2<f64>,
    size_factors: Option<Array1<f64>>,
    dispersions: Option<DispersionEstimates>,
    fit: Option<GlmFit>,
    glm_params: Option<GlmFitParams>,
}

impl FittedModel {
    /// Resolve `design` against the sample info. Nothing is fit yet.
    pub fn new(data: PreparedData, design: Design) -> Result<Self> {
        let (model_matrix, design_info) = design.model_matrix(&data.sample_info)?;
        log::info!(
            "model {}: {} genes, {} samples, {} coefficients",
            design.formula(),
            data.n_genes(),
            data.n_samples(),
            design_info.n_coefs()
        );
        Ok(Self {
            data,
            design,
            design_info,
            model_matrix,
            size_factors: None,
            dispersions: None,
            fit: None,
            glm_params: None,
        })
    }

    /// A new, unfitted model over the same counts and sample info
    pub fn with_design(&self, design: Design) -> Result<FittedModel> {
        FittedModel::new(self.data.clone(), design)
    }

    pub fn estimate_size_factors(mut self, method: SizeFactorMethod) -> Result<Self> {
        if self.size_factors.is_some() {
            return Err(DeError::StageOrder {
                reason: "size factors have already been estimated".to_string(),
            });
        }
        let sf = normalization::estimate_size_factors(self.data.counts.counts(), method)?;
        self.size_factors = Some(sf);
        Ok(self)
    }

    pub fn estimate_dispersions(mut self, params: &DispersionParams) -> Result<Self> {
        if self.dispersions.is_some() {
            return Err(DeError::StageOrder {
                reason: "dispersions have already been estimated".to_string(),
            });
        }
        let sf = self.size_factors.as_ref().ok_or_else(|| DeError::StageOrder {
            reason: "estimate size factors before dispersions".to_string(),
        })?;
        let est = dispersion::estimate_dispersions(
            self.data.counts.counts(),
            sf.view(),
            self.model_matrix.view(),
            params,
        )?;
        self.dispersions = Some(est);
        Ok(self)
    }

    pub fn fit_glm(mut self, params: &GlmFitParams) -> Result<Self> {
        if self.fit.is_some() {
            return Err(DeError::StageOrder {
                reason: "the GLM has already been fit".to_string(),
            });
        }
        let (sf, disp) = match (&self.size_factors, &self.dispersions) {
            (Some(sf), Some(disp)) => (sf, disp),
            _ => {
                return Err(DeError::StageOrder {
                    reason: "estimate size factors and dispersions before fitting the GLM".to_string(),
                })
            }
        };
        let fit = fit_nb_glm(
            self.data.counts.counts(),
            self.model_matrix.view(),
            sf.view(),
            disp.dispersions.view(),
            params,
        );
        self.fit = Some(fit);
        self.glm_params = Some(params.clone());
        Ok(self)
    }

    pub fn is_fitted(&self) -> bool {
        self.fit.is_some()
    }

    pub fn data(&self) -> &PreparedData {
        &self.data
    }

    pub fn counts(&self) -> &CountMatrix {
        &self.data.counts
    }

    pub fn sample_info(&self) -> &SampleInfo {
        &self.data.sample_info
    }

    pub fn gene_ids(&self) -> &[String] {
        self.data.counts.gene_ids()
    }

    pub fn design(&self) -> &Design {
        &self.design
    }

    pub fn design_info(&self) -> &DesignInfo {
        &self.design_info
    }

    pub fn model_matrix(&self) -> ArrayView2<'_, f64> {
        self.model_matrix.view()
    }

    /// Coefficient names, usable in a coefficient contrast
    pub fn results_names(&self) -> &[String] {
        &self.design_info.coef_names
    }

    pub fn size_factors(&self) -> Option<&Array1<f64>> {
        self.size_factors.as_ref()
    }

    pub fn dispersions(&self) -> Option<&DispersionEstimates> {
        self.dispersions.as_ref()
    }

    pub fn fit(&self) -> Option<&GlmFit> {
        self.fit.as_ref()
    }

    /// Parameters the GLM was fit with
    pub fn glm_params(&self) -> Option<&GlmFitParams> {
        self.glm_params.as_ref()
    }

    /// The GLM fit, or `StageOrder` if the model has not been fit
    pub fn require_fit(&self) -> Result<&GlmFit> {
        self.fit.as_ref().ok_or_else(|| DeError::StageOrder {
            reason: "the model has not been fit".to_string(),
        })
    }

    fn require_size_factors(&self) -> Result<&Array1<f64>> {
        self.size_factors.as_ref().ok_or_else(|| DeError::StageOrder {
            reason: "size factors have not been estimated".to_string(),
        })
    }

    /// Mean of the normalized counts of each gene
    pub fn base_means(&self) -> Result<Vec<f64>> {
        let sf = self.require_size_factors()?;
        Ok(normalization::base_means(self.data.counts.counts(), sf.view()))
    }

    pub fn normalized_counts(&self) -> Result<Array2<f64>> {
        let sf = self.require_size_factors()?;
        Ok(normalization::normalized_counts(self.data.counts.counts(), sf.view()))
    }
}

/// Fit all stages with default parameters
pub fn run_pipeline(data: PreparedData, design: Design) -> Result<FittedModel> {
    run_pipeline_with(data, design, &PipelineParams::default())
}

/// Fit all stages; identical to calling the stages one after another
pub fn run_pipeline_with(data: PreparedData, design: Design, params: &PipelineParams) -> Result<FittedModel> {
    let model = FittedModel::new(data, design)?
        .estimate_size_factors(params.size_factor_method)?
        .estimate_dispersions(&params.dispersion)?
        .fit_glm(&params.glm)?;
    let fit = model.require_fit()?;
    let n_degenerate = fit.log_likelihood.iter().filter(|l| !l.is_finite()).count();
    if n_degenerate > 0 {
        log::info!("{} genes could not be fit and carry NA statistics", n_degenerate);
    }
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_one_call_equals_staged() {
        let one_call = run_pipeline(fixtures::mammary(), fixtures::cell_and_status()).unwrap();
        let staged = FittedModel::new(fixtures::mammary(), fixtures::cell_and_status())
            .unwrap()
            .estimate_size_factors(SizeFactorMethod::Ratio)
            .unwrap()
            .estimate_dispersions(&DispersionParams::default())
            .unwrap()
            .fit_glm(&GlmFitParams::default())
            .unwrap();

        let a = one_call.fit().unwrap();
        let b = staged.fit().unwrap();
        assert_eq!(one_call.size_factors(), staged.size_factors());
        for (x, y) in a.coefficients.iter().zip(b.coefficients.iter()) {
            assert!((x.is_nan() && y.is_nan()) || x == y);
        }
        for (x, y) in one_call
            .dispersions()
            .unwrap()
            .dispersions
            .iter()
            .zip(staged.dispersions().unwrap().dispersions.iter())
        {
            assert!((x.is_nan() && y.is_nan()) || x == y);
        }
        assert_eq!(one_call.results_names(), staged.results_names());
        assert_eq!(one_call.glm_params(), Some(&GlmFitParams::default()));
    }

    #[test]
    fn test_stage_order_is_enforced() {
        let model = FittedModel::new(fixtures::mammary(), fixtures::cell_and_status()).unwrap();
        assert!(matches!(
            model.clone().estimate_dispersions(&DispersionParams::default()),
            Err(DeError::StageOrder { .. })
        ));
        assert!(matches!(
            model.clone().fit_glm(&GlmFitParams::default()),
            Err(DeError::StageOrder { .. })
        ));
        assert!(matches!(model.base_means(), Err(DeError::StageOrder { .. })));

        let sized = model.estimate_size_factors(SizeFactorMethod::Ratio).unwrap();
        assert!(matches!(
            sized.clone().estimate_size_factors(SizeFactorMethod::Ratio),
            Err(DeError::StageOrder { .. })
        ));
        assert_eq!(sized.base_means().unwrap().len(), fixtures::N_GENES);
    }

    #[test]
    fn test_all_zero_gene_is_degenerate() {
        let model = run_pipeline(fixtures::mammary(), fixtures::cell_and_status()).unwrap();
        let fit = model.fit().unwrap();
        assert!(fit.coefficients.row(fixtures::ZERO_GENE).iter().all(|b| b.is_nan()));
        assert!(fit.coefficients.row(0).iter().all(|b| b.is_finite()));
    }

    #[test]
    fn test_with_design_starts_unfitted() {
        let model = run_pipeline(fixtures::mammary(), fixtures::cell_and_status()).unwrap();
        let reduced = model.with_design(fixtures::cell_only()).unwrap();
        assert!(!reduced.is_fitted());
        assert!(reduced.size_factors().is_none());
        assert_eq!(reduced.results_names(), ["Intercept", "CellType_luminal_vs_basal"]);
        assert_eq!(model.results_names().len(), 4);
    }

    #[test]
    fn test_undeclared_level_is_rejected() {
        // lactate samples are present but not declared
        let design = Design::new().factor("Status", &["virgin", "pregnant"]);
        assert!(matches!(
            FittedModel::new(fixtures::mammary(), design),
            Err(DeError::InvalidDesign { .. })
        ));
    }
}
