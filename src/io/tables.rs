//! Tab-separated inputs and outputs

use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::Path;

use ndarray::Array2;
use serde::Serialize;

use super::{format_value, NA};
use crate::annotation::{AnnotatedResults, OUTPUT_COLUMNS, SHRUNK_COLUMN};
use crate::data::{reconcile, CountMatrix, LoadOptions, PreparedData, SampleInfo};
use crate::error::{DeError, Result};
use crate::plots::{Heatmap, Pca};
use crate::testing::{ResultsSummary, ResultsTable};

/// Gene annotation columns of a featureCounts table; never treated as samples
pub const FEATURE_COUNTS_COLUMNS: [&str; 5] = ["Chr", "Start", "End", "Strand", "Length"];

fn tsv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::default()
        .delimiter(b'\t')
        .has_headers(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader)
}

fn tsv_writer<P: AsRef<Path>>(path: P) -> Result<csv::Writer<BufWriter<File>>> {
    Ok(csv::WriterBuilder::default()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(BufWriter::new(File::create(path)?)))
}

/// Read a gene-by-sample count table.
///
/// Lines starting with `#` are skipped. The first column holds gene ids;
/// featureCounts annotation columns are dropped and every other column is a
/// sample.
pub fn read_count_table<P: AsRef<Path>>(path: P) -> Result<CountMatrix> {
    parse_count_table(File::open(path)?)
}

fn parse_count_table<R: Read>(reader: R) -> Result<CountMatrix> {
    let mut rdr = tsv_reader(reader);
    let headers = rdr.headers()?.clone();
    if headers.len() < 2 {
        return Err(DeError::InvalidCountMatrix {
            reason: "the header needs a gene id column and at least one sample".to_string(),
        });
    }
    let sample_cols: Vec<usize> = (1..headers.len())
        .filter(|&j| !FEATURE_COUNTS_COLUMNS.contains(&&headers[j]))
        .collect();
    let sample_ids: Vec<String> = sample_cols.iter().map(|&j| headers[j].to_string()).collect();

    let mut gene_ids = Vec::new();
    let mut values = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let gene_id = record.get(0).unwrap_or_default().to_string();
        for &j in &sample_cols {
            let field = record.get(j).unwrap_or_default();
            let count: f64 = field.parse().map_err(|_| DeError::InvalidCountMatrix {
                reason: format!("gene '{}', sample '{}': '{}' is not a count", gene_id, &headers[j], field),
            })?;
            values.push(count);
        }
        gene_ids.push(gene_id);
    }
    if gene_ids.is_empty() {
        return Err(DeError::EmptyData {
            reason: "count table has no genes".to_string(),
        });
    }

    let counts = Array2::from_shape_vec((gene_ids.len(), sample_ids.len()), values).map_err(|e| {
        DeError::InvalidCountMatrix {
            reason: e.to_string(),
        }
    })?;
    log::info!("read {} genes x {} samples", gene_ids.len(), sample_ids.len());
    CountMatrix::new(counts, gene_ids, sample_ids)
}

/// Read a sample sheet; `id_column` names the column matching the count
/// table's sample names and every other column becomes a categorical column.
pub fn read_sample_info<P: AsRef<Path>>(path: P, id_column: &str) -> Result<SampleInfo> {
    parse_sample_info(File::open(path)?, id_column)
}

fn parse_sample_info<R: Read>(reader: R, id_column: &str) -> Result<SampleInfo> {
    let mut rdr = tsv_reader(reader);
    let headers = rdr.headers()?.clone();
    let id_idx = headers
        .iter()
        .position(|h| h == id_column)
        .ok_or_else(|| DeError::InvalidSampleInfo {
            reason: format!(
                "no column '{}' in sample sheet (columns: {})",
                id_column,
                headers.iter().collect::<Vec<_>>().join(", ")
            ),
        })?;

    let mut ids = Vec::new();
    let mut columns: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in rdr.records() {
        let record = record?;
        for (j, field) in record.iter().enumerate() {
            if j == id_idx {
                ids.push(field.to_string());
            } else {
                columns[j].push(field.to_string());
            }
        }
    }
    if ids.is_empty() {
        return Err(DeError::EmptyData {
            reason: "sample sheet has no records".to_string(),
        });
    }

    let mut info = SampleInfo::new(ids)?;
    for (j, values) in columns.into_iter().enumerate() {
        if j != id_idx {
            info.add_column(&headers[j], values)?;
        }
    }
    Ok(info)
}

/// Read a count table and a sample sheet and reconcile them.
///
/// The sheet is keyed by `options.sample_id_column`.
pub fn load_inputs<P: AsRef<Path>, Q: AsRef<Path>>(
    counts_path: P,
    samples_path: Q,
    options: &LoadOptions,
) -> Result<PreparedData> {
    let counts = read_count_table(counts_path)?;
    let sample_info = read_sample_info(samples_path, &options.sample_id_column)?;
    reconcile(counts, sample_info, options)
}

/// Write a results table, one row per gene, `NA` for values that do not apply
pub fn write_results_table<P: AsRef<Path>>(path: P, results: &ResultsTable) -> Result<()> {
    let mut wtr = tsv_writer(path)?;
    wtr.write_record(["gene_id", "baseMean", "log2FoldChange", "lfcSE", "stat", "pvalue", "padj"])?;
    for i in 0..results.n_genes() {
        wtr.write_record([
            results.gene_ids[i].clone(),
            format_value(results.base_means[i]),
            format_value(results.log2_fold_changes[i]),
            format_value(results.lfc_se[i]),
            format_value(results.stat[i]),
            format_value(results.pvalues[i]),
            format_value(results.padj[i]),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn opt<T: ToString>(v: &Option<T>) -> String {
    v.as_ref().map_or_else(|| NA.to_string(), |x| x.to_string())
}

/// Write the annotated table with the external column names
pub fn write_annotated_results<P: AsRef<Path>>(path: P, annotated: &AnnotatedResults) -> Result<()> {
    let mut wtr = tsv_writer(path)?;
    let mut header: Vec<&str> = OUTPUT_COLUMNS.to_vec();
    if annotated.has_shrunk {
        header.push(SHRUNK_COLUMN);
    }
    wtr.write_record(&header)?;

    for row in &annotated.rows {
        let a = row.annotation.as_ref();
        let mut fields = vec![
            row.gene_id.clone(),
            opt(&a.and_then(|a| a.entrez_id.clone())),
            opt(&a.and_then(|a| a.symbol.clone())),
            opt(&a.and_then(|a| a.description.clone())),
            opt(&a.and_then(|a| a.chromosome.clone())),
            opt(&a.and_then(|a| a.start)),
            opt(&a.and_then(|a| a.end)),
            opt(&a.and_then(|a| a.strand)),
            opt(&a.and_then(|a| a.biotype.clone())),
            format_value(row.base_mean),
            format_value(row.log2_fold_change),
            format_value(row.lfc_se),
            format_value(row.stat),
            format_value(row.pvalue),
            format_value(row.padj),
        ];
        if annotated.has_shrunk {
            fields.push(format_value(row.shrunk_log2_fold_change.unwrap_or(f64::NAN)));
        }
        wtr.write_record(&fields)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_summary_json<P: AsRef<Path>>(path: P, summary: &ResultsSummary) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, summary)?;
    Ok(())
}

/// One row per point, columns named after the struct fields
pub fn write_points<T: Serialize, P: AsRef<Path>>(path: P, points: &[T]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::default()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)?;
    for point in points {
        wtr.serialize(point)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_pca<P: AsRef<Path>>(path: P, pca: &Pca) -> Result<()> {
    let mut wtr = tsv_writer(path)?;
    let n_components = pca.scores.ncols();
    let mut header = vec!["sample_id".to_string()];
    header.extend((0..n_components).map(|c| format!("PC{} ({:.1}%)", c + 1, pca.percent_variance[c])));
    wtr.write_record(&header)?;
    for (j, sample_id) in pca.sample_ids.iter().enumerate() {
        let mut fields = vec![sample_id.clone()];
        fields.extend(pca.scores.row(j).iter().map(|&v| format_value(v)));
        wtr.write_record(&fields)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_heatmap<P: AsRef<Path>>(path: P, heatmap: &Heatmap) -> Result<()> {
    let mut wtr = tsv_writer(path)?;
    let mut header = vec!["gene_id".to_string()];
    header.extend(heatmap.sample_ids.iter().cloned());
    wtr.write_record(&header)?;
    for (i, gene_id) in heatmap.gene_ids.iter().enumerate() {
        let mut fields = vec![gene_id.clone()];
        fields.extend(heatmap.values.row(i).iter().map(|&v| format_value(v)));
        wtr.write_record(&fields)?;
    }
    wtr.flush()?;
    Ok(())
}
