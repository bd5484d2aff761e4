//! Joining external gene annotation onto a results table
//!
//! Annotation services may return no record or several records for one
//! gene identifier. Neither is an error here: misses keep empty annotation
//! fields and multiple hits duplicate the result row.

mod table;

pub use table::AnnotationTable;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{DeError, Result};
use crate::shrinkage::ShrunkenLfc;
use crate::testing::ResultsTable;

/// One record as returned by an annotation service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    #[serde(rename = "ensembl_gene_id", alias = "GeneID", alias = "gene_id")]
    pub gene_id: String,
    #[serde(rename = "entrezgene_id", alias = "Entrez", default)]
    pub entrez_id: Option<String>,
    #[serde(rename = "external_gene_name", alias = "Symbol", default)]
    pub symbol: Option<String>,
    #[serde(alias = "Description", default)]
    pub description: Option<String>,
    #[serde(rename = "chromosome_name", alias = "Chr", default)]
    pub chromosome: Option<String>,
    #[serde(rename = "start_position", alias = "Start", default)]
    pub start: Option<u64>,
    #[serde(rename = "end_position", alias = "End", default)]
    pub end: Option<u64>,
    #[serde(alias = "Strand", default)]
    pub strand: Option<i8>,
    #[serde(rename = "gene_biotype", alias = "Biotype", default)]
    pub biotype: Option<String>,
}

/// Anything that can answer an annotation query.
///
/// `lookup` returns zero or more records per requested identifier, in any
/// order. Records for identifiers that were not requested are ignored.
pub trait AnnotationSource {
    fn lookup(&self, gene_ids: &[String]) -> Result<Vec<AnnotationRecord>>;
}

/// Column names of the annotated output table
pub const OUTPUT_COLUMNS: [&str; 15] = [
    "GeneID",
    "Entrez",
    "Symbol",
    "Description",
    "Chr",
    "Start",
    "End",
    "Strand",
    "Biotype",
    "baseMean",
    "logFC",
    "lfcSE",
    "stat",
    "pvalue",
    "FDR",
];

/// Extra column written when shrunken fold changes are attached
pub const SHRUNK_COLUMN: &str = "shrunkLogFC";

/// One output row: a result row and at most one annotation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedRow {
    /// Row of the source results table
    pub result_index: usize,
    pub gene_id: String,
    pub annotation: Option<AnnotationRecord>,
    pub base_mean: f64,
    pub log2_fold_change: f64,
    pub lfc_se: f64,
    pub stat: f64,
    pub pvalue: f64,
    pub padj: f64,
    pub shrunk_log2_fold_change: Option<f64>,
}

/// Results left-joined with annotation, in results row order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedResults {
    pub description: String,
    pub rows: Vec<AnnotatedRow>,
    /// Genes with no annotation record
    pub unmatched: usize,
    /// Genes with more than one annotation record
    pub multi_hit: usize,
    pub has_shrunk: bool,
}

impl AnnotatedResults {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Left join of `results` with the records `source` returns for its genes.
///
/// `shrunk`, when given, must come from the same table and is carried as an
/// extra column.
pub fn annotate(
    results: &ResultsTable,
    source: &dyn AnnotationSource,
    shrunk: Option<&ShrunkenLfc>,
) -> Result<AnnotatedResults> {
    if let Some(s) = shrunk {
        if s.gene_ids != results.gene_ids {
            return Err(DeError::InvalidInput {
                reason: "shrunken fold changes were computed for a different table".to_string(),
            });
        }
    }

    let requested: HashSet<&str> = results.gene_ids.iter().map(|g| g.as_str()).collect();
    let mut hits: HashMap<String, Vec<AnnotationRecord>> = HashMap::new();
    for record in source.lookup(&results.gene_ids)? {
        if requested.contains(record.gene_id.as_str()) {
            hits.entry(record.gene_id.clone()).or_default().push(record);
        }
    }

    let mut rows = Vec::with_capacity(results.n_genes());
    let (mut unmatched, mut multi_hit) = (0, 0);
    for (i, gene_id) in results.gene_ids.iter().enumerate() {
        let row = |annotation: Option<AnnotationRecord>| AnnotatedRow {
            result_index: i,
            gene_id: gene_id.clone(),
            annotation,
            base_mean: results.base_means[i],
            log2_fold_change: results.log2_fold_changes[i],
            lfc_se: results.lfc_se[i],
            stat: results.stat[i],
            pvalue: results.pvalues[i],
            padj: results.padj[i],
            shrunk_log2_fold_change: shrunk.map(|s| s.log2_fold_changes[i]),
        };
        match hits.get(gene_id) {
            None => {
                unmatched += 1;
                rows.push(row(None));
            }
            Some(records) => {
                if records.len() > 1 {
                    multi_hit += 1;
                }
                rows.extend(records.iter().cloned().map(|r| row(Some(r))));
            }
        }
    }

    log::info!(
        "annotated {} genes into {} rows: {} without annotation, {} with several records",
        results.n_genes(),
        rows.len(),
        unmatched,
        multi_hit
    );

    Ok(AnnotatedResults {
        description: results.description.clone(),
        rows,
        unmatched,
        multi_hit,
        has_shrunk: shrunk.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestKind;

    fn results() -> ResultsTable {
        ResultsTable {
            gene_ids: vec!["ENSMUSG01".into(), "ENSMUSG02".into(), "ENSMUSG03".into()],
            base_means: vec![120.0, 45.0, 8.0],
            log2_fold_changes: vec![2.1, -1.3, 0.2],
            lfc_se: vec![0.3, 0.4, 0.9],
            stat: vec![7.0, -3.2, 0.2],
            pvalues: vec![1e-12, 0.001, 0.84],
            padj: vec![3e-12, 0.0015, f64::NAN],
            dispersions: vec![0.05, 0.1, 0.6],
            description: "log2 fold change (MLE): Status pregnant vs virgin".into(),
            test: TestKind::Wald,
        }
    }

    fn record(gene_id: &str, symbol: &str) -> AnnotationRecord {
        AnnotationRecord {
            gene_id: gene_id.to_string(),
            symbol: Some(symbol.to_string()),
            ..AnnotationRecord::default()
        }
    }

    #[test]
    fn test_left_join_keeps_misses_and_duplicates_hits() {
        let source = AnnotationTable::new(vec![
            record("ENSMUSG03", "Csn2"),
            record("ENSMUSG01", "Wap"),
            record("ENSMUSG03", "Csn2-ps"),
            record("ENSMUSG99", "Unrelated"),
        ]);
        let annotated = annotate(&results(), &source, None).unwrap();

        assert_eq!(annotated.len(), 4);
        assert_eq!(annotated.unmatched, 1);
        assert_eq!(annotated.multi_hit, 1);
        let ids: Vec<&str> = annotated.rows.iter().map(|r| r.gene_id.as_str()).collect();
        assert_eq!(ids, vec!["ENSMUSG01", "ENSMUSG02", "ENSMUSG03", "ENSMUSG03"]);
        assert!(annotated.rows[1].annotation.is_none());
        assert_eq!(annotated.rows[1].padj, 0.0015);
        assert_eq!(
            annotated.rows[3].annotation.as_ref().and_then(|a| a.symbol.as_deref()),
            Some("Csn2-ps")
        );
        assert!(annotated.rows[2].padj.is_nan());
    }

    #[test]
    fn test_shrunk_column_must_match() {
        let res = results();
        let shrunk = crate::shrinkage::shrink_lfc_normal(&res);
        let source = AnnotationTable::new(vec![]);
        let annotated = annotate(&res, &source, Some(&shrunk)).unwrap();
        assert!(annotated.has_shrunk);
        assert_eq!(annotated.unmatched, 3);
        assert_eq!(annotated.rows[0].shrunk_log2_fold_change, Some(shrunk.log2_fold_changes[0]));

        let other = res.reorder(&[1, 0, 2]);
        assert!(matches!(
            annotate(&other, &source, Some(&shrunk)),
            Err(DeError::InvalidInput { .. })
        ));
    }
}
