//! rnaseq_de command-line interface

use std::path::Path;

use clap::Parser;
use log::{info, warn, LevelFilter};

use rnaseq_de::cli::{build_design, selected_contrast, Cli, Commands, ModelArgs, OutputArgs};
use rnaseq_de::prelude::*;

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads.max(1))
        .build_global()
    {
        warn!("could not configure the thread pool: {}", e);
    }

    let result = match cli.command {
        Commands::Prepare {
            counts,
            samples,
            id_column,
            min_total,
            strip_suffixes,
            output,
        } => run_prepare(&counts, &samples, &id_column, min_total, strip_suffixes, &output),
        Commands::Test {
            model,
            coef,
            contrast,
            output,
        } => selected_contrast(coef, contrast).and_then(|spec| run_test(&model, &spec, &output)),
        Commands::Lrt { model, reduced, output } => run_lrt(&model, &reduced, &output),
        Commands::Annotate {
            bundle,
            annotation,
            top,
            shrunk,
            output,
        } => run_annotate(&bundle, &annotation, top, shrunk, &output),
        Commands::PlotData {
            bundle,
            output_dir,
            n_top,
            heatmap_genes,
            alpha,
            shrunk,
        } => run_plot_data(&bundle, &output_dir, n_top, heatmap_genes, alpha, shrunk),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_prepare(
    counts_path: &Path,
    samples_path: &Path,
    id_column: &str,
    min_total: f64,
    strip_suffixes: Vec<String>,
    output: &Path,
) -> Result<()> {
    let mut options = LoadOptions {
        min_total_count: min_total,
        sample_id_column: id_column.to_string(),
        ..LoadOptions::default()
    };
    if !strip_suffixes.is_empty() {
        options.strip_suffixes = strip_suffixes;
    }
    info!(
        "Loading {} with sample sheet {}",
        counts_path.display(),
        samples_path.display()
    );
    let prepared = load_inputs(counts_path, samples_path, &options)?;
    info!(
        "Prepared {} genes x {} samples",
        prepared.n_genes(),
        prepared.n_samples()
    );
    save_bundle(output, &prepared)
}

fn fit_model(args: &ModelArgs, design: Design) -> Result<FittedModel> {
    info!("Loading prepared data from: {}", args.input.display());
    let data: PreparedData = load_bundle(&args.input)?;
    let mut params = PipelineParams {
        size_factor_method: args.sf_type.into(),
        ..PipelineParams::default()
    };
    params.dispersion.trend = args.fit_type.into();
    let model = run_pipeline_with(data, design, &params)?;
    info!("Coefficients: {}", model.results_names().join(", "));
    Ok(model)
}

/// Filter, shrink, write the table and the bundle
fn finish(model: FittedModel, mut res: ResultsTable, output: &OutputArgs) -> Result<()> {
    let params = FilterParams {
        alpha: output.alpha,
        enabled: !output.no_independent_filtering,
        ..FilterParams::default()
    };
    let filter = independent_filtering(&mut res, &params);
    let shrunk = shrink_lfc_normal(&res);

    let summary = res.summary(output.alpha);
    println!("{}", summary);

    write_results_table(&output.output, &res)?;
    info!("Results written to: {}", output.output.display());
    if let Some(path) = &output.summary {
        write_summary_json(path, &summary)?;
    }

    let bundle = AnalysisBundle {
        results: res,
        shrunk: Some(shrunk),
        filter: Some(filter),
        model,
    };
    save_bundle(&output.bundle, &bundle)
}

fn run_test(args: &ModelArgs, contrast: &ContrastSpec, output: &OutputArgs) -> Result<()> {
    let model = fit_model(args, build_design(&args.factors, args.interaction))?;
    let res = results(&model, contrast)?;
    finish(model, res, output)
}

fn run_lrt(args: &ModelArgs, reduced: &[Factor], output: &OutputArgs) -> Result<()> {
    let full = fit_model(args, build_design(&args.factors, args.interaction))?;
    let reduced = full.with_design(build_design(reduced, false))?;
    let res = nested_lrt(&full, &reduced)?;
    finish(full, res, output)
}

fn run_annotate(bundle_path: &Path, annotation_path: &Path, top: Option<usize>, shrunk: bool, output: &Path) -> Result<()> {
    let bundle: AnalysisBundle = load_bundle(bundle_path)?;
    let source = AnnotationTable::from_path(annotation_path)?;
    info!("{} annotation records loaded", source.len());

    let order = match top {
        Some(n) => top_n(&bundle.results, n),
        None => rank_by_padj(&bundle.results),
    };
    let ranked = bundle.results.reorder(&order);
    let ranked_shrunk = match (&bundle.shrunk, shrunk) {
        (Some(s), true) => Some(ShrunkenLfc {
            gene_ids: ranked.gene_ids.clone(),
            log2_fold_changes: order.iter().map(|&i| s.log2_fold_changes[i]).collect(),
            lfc_se: order.iter().map(|&i| s.lfc_se[i]).collect(),
            prior_var: s.prior_var,
        }),
        (None, true) => {
            warn!("bundle has no shrunken fold changes; column skipped");
            None
        }
        _ => None,
    };

    let annotated = annotate(&ranked, &source, ranked_shrunk.as_ref())?;
    write_annotated_results(output, &annotated)?;
    info!("Annotated results written to: {}", output.display());
    Ok(())
}

fn run_plot_data(
    bundle_path: &Path,
    output_dir: &Path,
    n_top: usize,
    heatmap_genes: usize,
    alpha: f64,
    shrunk: bool,
) -> Result<()> {
    let bundle: AnalysisBundle = load_bundle(bundle_path)?;
    std::fs::create_dir_all(output_dir)?;
    let shrunk = if shrunk { bundle.shrunk.as_ref() } else { None };

    write_points(output_dir.join("ma.tsv"), &ma_points(&bundle.results, alpha, shrunk))?;
    write_points(output_dir.join("volcano.tsv"), &volcano_points(&bundle.results, alpha))?;
    write_pca(output_dir.join("pca.tsv"), &pca(&bundle.model, n_top, 2)?)?;

    let top = top_n(&bundle.results, heatmap_genes);
    if top.is_empty() {
        warn!("no gene has an adjusted p-value; heatmap skipped");
    } else {
        write_heatmap(output_dir.join("heatmap.tsv"), &heatmap_matrix(&bundle.model, &top)?)?;
    }
    info!("Plot tables written to: {}", output_dir.display());
    Ok(())
}
