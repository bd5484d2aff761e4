//! Shared test data: a small two-factor experiment

use ndarray::Array2;

use crate::data::{CountMatrix, PreparedData, SampleInfo};
use crate::glm::Design;

const DEPTH: [f64; 12] = [1.0, 1.3, 0.8, 1.1, 0.9, 1.2, 1.05, 0.95, 1.15, 0.85, 1.0, 1.25];
const WOBBLE: [f64; 12] = [0.82, 1.15, 0.97, 1.08, 0.9, 1.2, 0.87, 1.03, 1.12, 0.93, 1.05, 0.95];

pub(crate) const N_GENES: usize = 25;
/// Row of the gene with no reads at all
pub(crate) const ZERO_GENE: usize = 24;

/// Twelve samples: CellType {basal, luminal} x Status {virgin, pregnant,
/// lactate}, two replicates each. Genes divisible by 3 are higher in
/// luminal cells, genes with `g % 4 == 1` rise in pregnancy and genes with
/// `g % 4 == 2` fall in lactation. The last gene is all zeros.
pub(crate) fn mammary() -> PreparedData {
    let status = ["virgin", "virgin", "pregnant", "pregnant", "lactate", "lactate"];
    let mut counts = Array2::zeros((N_GENES, 12));
    for g in 0..ZERO_GENE {
        let base = 20.0 * (1.0 + g as f64 * 1.7);
        for s in 0..12 {
            let cell = if s >= 6 && g % 3 == 0 { 3.0 } else { 1.0 };
            let effect = match (status[s % 6], g % 4) {
                ("pregnant", 1) => 4.0,
                ("lactate", 2) => 0.25,
                _ => 1.0,
            };
            counts[[g, s]] = (base * cell * effect * DEPTH[s] * WOBBLE[(g * 5 + s) % 12]).round();
        }
    }

    let gene_ids = (0..N_GENES).map(|g| format!("gene{:02}", g)).collect();
    let sample_ids: Vec<String> = (1..=12).map(|s| format!("s{}", s)).collect();
    let counts = CountMatrix::new(counts, gene_ids, sample_ids.clone()).unwrap();

    let cell_type: Vec<&str> = (0..12).map(|s| if s < 6 { "basal" } else { "luminal" }).collect();
    let status_col: Vec<&str> = (0..12).map(|s| status[s % 6]).collect();
    let info = SampleInfo::new(sample_ids)
        .unwrap()
        .with_column("CellType", &cell_type)
        .unwrap()
        .with_column("Status", &status_col)
        .unwrap();
    PreparedData::new(counts, info).unwrap()
}

/// `~CellType + Status` with basal and virgin as references
pub(crate) fn cell_and_status() -> Design {
    Design::new()
        .factor("CellType", &["basal", "luminal"])
        .factor("Status", &["virgin", "pregnant", "lactate"])
}

/// `~CellType`
pub(crate) fn cell_only() -> Design {
    Design::new().factor("CellType", &["basal", "luminal"])
}
