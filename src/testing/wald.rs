//! Wald test for differential expression

use std::f64::consts::LN_2;

use ndarray::{ArrayView1, ArrayView2};

use super::fdr::benjamini_hochberg;
use super::pvalue::calculate_pvalue;
use super::table::{ContrastSpec, ResultsTable, TestKind};
use crate::error::Result;
use crate::linalg::quadratic_form;
use crate::model::FittedModel;

/// Per-gene Wald statistics for `contrast'beta`.
///
/// Log fold changes and standard errors are reported on the log2 scale; the
/// statistic is scale free. Genes that could not be fit get `NaN` in every
/// column and are left out of the multiple-testing adjustment.
pub fn results(model: &FittedModel, contrast: &ContrastSpec) -> Result<ResultsTable> {
    let fit = model.require_fit()?;
    let c = contrast.resolve(model.design_info())?;
    let base_means = model.base_means()?;
    let dispersions = model
        .dispersions()
        .map(|d| d.dispersions.to_vec())
        .unwrap_or_else(|| vec![f64::NAN; model.gene_ids().len()]);

    let n_genes = fit.coefficients.nrows();
    let mut log2_fold_changes = vec![f64::NAN; n_genes];
    let mut lfc_se = vec![f64::NAN; n_genes];
    let mut stat = vec![f64::NAN; n_genes];

    for i in 0..n_genes {
        let beta = fit.coefficients.row(i);
        if beta.iter().any(|b| !b.is_finite()) {
            continue;
        }
        let (estimate, variance) = contrast_estimate(beta, fit.covariance(i), c.view());
        if !variance.is_finite() || variance <= 0.0 {
            continue;
        }
        let se = variance.sqrt();
        log2_fold_changes[i] = estimate / LN_2;
        lfc_se[i] = se / LN_2;
        stat[i] = estimate / se;
    }

    let pvalues: Vec<f64> = stat.iter().map(|&z| calculate_pvalue(z)).collect();
    let padj = benjamini_hochberg(&pvalues);

    let n_tested = pvalues.iter().filter(|p| p.is_finite()).count();
    log::info!(
        "Wald test {}: {} of {} genes tested",
        contrast.description(),
        n_tested,
        n_genes
    );

    Ok(ResultsTable {
        gene_ids: model.gene_ids().to_vec(),
        base_means,
        log2_fold_changes,
        lfc_se,
        stat,
        pvalues,
        padj,
        dispersions,
        description: format!("log2 fold change (MLE): {}", contrast.description()),
        test: TestKind::Wald,
    })
}

/// `(c'beta, c'Sigma c)` on the natural log scale
fn contrast_estimate(beta: ArrayView1<f64>, covariance: ArrayView2<f64>, c: ArrayView1<f64>) -> (f64, f64) {
    (c.dot(&beta), quadratic_form(covariance, c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeError;
    use crate::fixtures;
    use crate::glm::Design;
    use crate::model::run_pipeline;

    fn fitted() -> FittedModel {
        run_pipeline(fixtures::mammary(), fixtures::cell_and_status()).unwrap()
    }

    #[test]
    fn test_pregnancy_gene_is_up() {
        let model = fitted();
        let res = results(&model, &ContrastSpec::levels("Status", "pregnant", "virgin")).unwrap();
        assert_eq!(res.n_genes(), fixtures::N_GENES);
        // gene01 is four times higher in pregnancy
        assert!(res.log2_fold_changes[1] > 1.5 && res.log2_fold_changes[1] < 2.5);
        assert!(res.padj[1] < 0.01);
        assert_eq!(res.description, "log2 fold change (MLE): Status pregnant vs virgin");
    }

    #[test]
    fn test_swapping_levels_flips_sign() {
        let model = fitted();
        let forward = results(&model, &ContrastSpec::levels("Status", "pregnant", "virgin")).unwrap();
        let reverse = results(&model, &ContrastSpec::levels("Status", "virgin", "pregnant")).unwrap();
        for i in 0..forward.n_genes() {
            if forward.stat[i].is_nan() {
                assert!(reverse.stat[i].is_nan());
                continue;
            }
            assert!((forward.log2_fold_changes[i] + reverse.log2_fold_changes[i]).abs() < 1e-12);
            assert!((forward.stat[i] + reverse.stat[i]).abs() < 1e-12);
            assert_eq!(forward.lfc_se[i], reverse.lfc_se[i]);
            assert_eq!(forward.pvalues[i], reverse.pvalues[i]);
        }
    }

    #[test]
    fn test_non_reference_pair_matches_reparameterised_model() {
        let model = fitted();
        let res = results(&model, &ContrastSpec::levels("Status", "lactate", "pregnant")).unwrap();

        let releveled = Design::new()
            .factor("CellType", &["basal", "luminal"])
            .factor("Status", &["pregnant", "virgin", "lactate"]);
        let other = run_pipeline(fixtures::mammary(), releveled).unwrap();
        let coef = results(&other, &ContrastSpec::coefficient("Status_lactate_vs_pregnant")).unwrap();

        for i in 0..res.n_genes() {
            if res.stat[i].is_nan() {
                assert!(coef.stat[i].is_nan());
                continue;
            }
            assert!(
                (res.log2_fold_changes[i] - coef.log2_fold_changes[i]).abs() < 1e-3,
                "gene {}: {} vs {}",
                i,
                res.log2_fold_changes[i],
                coef.log2_fold_changes[i]
            );
            assert!((res.stat[i] - coef.stat[i]).abs() < 1e-2 * (1.0 + res.stat[i].abs()));
        }
    }

    #[test]
    fn test_coefficient_matches_level_contrast_against_reference() {
        let model = fitted();
        let by_name = results(&model, &ContrastSpec::coefficient("Status_lactate_vs_virgin")).unwrap();
        let by_levels = results(&model, &ContrastSpec::levels("Status", "lactate", "virgin")).unwrap();
        assert_eq!(by_name.log2_fold_changes[..fixtures::ZERO_GENE], by_levels.log2_fold_changes[..fixtures::ZERO_GENE]);
        assert_eq!(by_name.pvalues[..fixtures::ZERO_GENE], by_levels.pvalues[..fixtures::ZERO_GENE]);
    }

    #[test]
    fn test_degenerate_gene_is_na() {
        let res = results(&fitted(), &ContrastSpec::coefficient("CellType_luminal_vs_basal")).unwrap();
        let z = fixtures::ZERO_GENE;
        assert_eq!(res.base_means[z], 0.0);
        assert!(res.log2_fold_changes[z].is_nan());
        assert!(res.pvalues[z].is_nan());
        assert!(res.padj[z].is_nan());
        // gene00 is three times higher in luminal cells; the shift moves the
        // luminal size factors, so compare against unchanged gene01
        let relative = res.log2_fold_changes[0] - res.log2_fold_changes[1];
        assert!(relative > 1.3 && relative < 1.9, "relative lfc {}", relative);
    }

    #[test]
    fn test_invalid_contrasts() {
        let model = fitted();
        let cases = [
            ContrastSpec::coefficient("Status_lactating_vs_virgin"),
            ContrastSpec::levels("Batch", "b", "a"),
            ContrastSpec::levels("Status", "weaned", "virgin"),
            ContrastSpec::levels("Status", "virgin", "virgin"),
            ContrastSpec::numeric(vec![0.0, 1.0]),
            ContrastSpec::numeric(vec![0.0; 4]),
        ];
        for contrast in &cases {
            assert!(
                matches!(results(&model, contrast), Err(DeError::InvalidContrast { .. })),
                "{:?} should be rejected",
                contrast
            );
        }
    }

    #[test]
    fn test_unfitted_model_is_stage_error() {
        let model = FittedModel::new(fixtures::mammary(), fixtures::cell_and_status()).unwrap();
        assert!(matches!(
            results(&model, &ContrastSpec::coefficient("Intercept")),
            Err(DeError::StageOrder { .. })
        ));
    }
}
