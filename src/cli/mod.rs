//! Command-line interface for rnaseq_de

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

use crate::dispersion::TrendFitMethod;
use crate::error::{DeError, Result};
use crate::glm::{Design, Factor};
use crate::normalization::SizeFactorMethod;
use crate::testing::ContrastSpec;

#[derive(Parser, Debug)]
#[command(name = "rnaseq_de")]
#[command(version)]
#[command(about = "Negative-binomial differential expression for RNA-seq count tables")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Worker threads for per-gene fits
    #[arg(short = 't', long, global = true, default_value = "1")]
    pub threads: usize,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile a count table with a sample sheet and save the prepared bundle
    #[command(after_long_help = "\
Examples:
  rnaseq_de prepare -c GSE60450_Lactation-GenewiseCounts.txt -s SampleInfo.txt \\
    --id-column FileName -o prepared.bin")]
    Prepare {
        /// Tab-separated count table (featureCounts output is accepted)
        #[arg(short, long)]
        counts: PathBuf,

        /// Tab-separated sample sheet
        #[arg(short, long)]
        samples: PathBuf,

        /// Sample sheet column matching the count table's column names
        #[arg(long, default_value = "FileName")]
        id_column: String,

        /// Genes with a total count at or below this are dropped
        #[arg(long, default_value = "5")]
        min_total: f64,

        /// Suffix removed from count column names before matching (repeatable)
        #[arg(long = "strip-suffix", value_name = "SUFFIX")]
        strip_suffixes: Vec<String>,

        /// Output bundle
        #[arg(short, long, default_value = "prepared.bin")]
        output: PathBuf,
    },

    /// Fit a design and run a Wald test for one coefficient or level pair
    #[command(
        group(ArgGroup::new("what").required(true).args(["coef", "contrast"])),
        after_long_help = "\
Examples:
  rnaseq_de test -i prepared.bin \\
    --factor CellType=basal,luminal --factor Status=virgin,pregnant,lactate \\
    --contrast Status,pregnant,virgin -o pregnant_vs_virgin.tsv

  rnaseq_de test -i prepared.bin --factor CellType=basal,luminal \\
    --coef CellType_luminal_vs_basal"
    )]
    Test {
        #[command(flatten)]
        model: ModelArgs,

        /// Coefficient name, as listed in the log after fitting
        #[arg(long)]
        coef: Option<String>,

        /// FACTOR,NUMERATOR,DENOMINATOR
        #[arg(long, value_parser = parse_contrast)]
        contrast: Option<ContrastSpec>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Likelihood ratio test of a full design against a nested one
    #[command(after_long_help = "\
Examples:
  rnaseq_de lrt -i prepared.bin \\
    --factor CellType=basal,luminal --factor Status=virgin,pregnant,lactate \\
    --reduced CellType=basal,luminal -o status_lrt.tsv")]
    Lrt {
        #[command(flatten)]
        model: ModelArgs,

        /// Factor of the reduced design (repeatable; none means intercept only)
        #[arg(long = "reduced", value_name = "NAME=L1,L2,...", value_parser = parse_factor)]
        reduced: Vec<Factor>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Join annotation onto the results of a test run
    Annotate {
        /// Analysis bundle written by `test` or `lrt`
        #[arg(short, long)]
        bundle: PathBuf,

        /// Tab-separated annotation export keyed by gene id
        #[arg(short, long)]
        annotation: PathBuf,

        /// Keep only the N genes with the smallest adjusted p-values
        #[arg(long)]
        top: Option<usize>,

        /// Add the shrunken fold change column
        #[arg(long)]
        shrunk: bool,

        #[arg(short, long, default_value = "annotated_results.tsv")]
        output: PathBuf,
    },

    /// Write MA, volcano, PCA and heatmap tables for plotting
    PlotData {
        /// Analysis bundle written by `test` or `lrt`
        #[arg(short, long)]
        bundle: PathBuf,

        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Most variable genes used for PCA
        #[arg(long, default_value = "500")]
        n_top: usize,

        /// Top-ranked genes in the heatmap
        #[arg(long, default_value = "50")]
        heatmap_genes: usize,

        #[arg(long, default_value = "0.05")]
        alpha: f64,

        /// Use shrunken fold changes on the MA plot
        #[arg(long)]
        shrunk: bool,
    },
}

/// Arguments shared by the fitting commands
#[derive(Args, Debug)]
pub struct ModelArgs {
    /// Prepared bundle written by `prepare`
    #[arg(short, long)]
    pub input: PathBuf,

    /// Factor with its levels, reference first (repeatable, order kept)
    #[arg(long = "factor", value_name = "NAME=L1,L2,...", value_parser = parse_factor, required = true)]
    pub factors: Vec<Factor>,

    /// Add the interaction of the two factors
    #[arg(long)]
    pub interaction: bool,

    #[arg(long, value_enum, default_value_t = SfType::Ratio)]
    pub sf_type: SfType,

    #[arg(long, value_enum, default_value_t = FitType::Parametric)]
    pub fit_type: FitType,
}

/// Arguments shared by the testing commands
#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Significance level for independent filtering and the summary
    #[arg(short, long, default_value = "0.1")]
    pub alpha: f64,

    /// Adjust every tested gene together
    #[arg(long)]
    pub no_independent_filtering: bool,

    /// Results table
    #[arg(short, long, default_value = "results.tsv")]
    pub output: PathBuf,

    /// Analysis bundle for `annotate` and `plot-data`
    #[arg(long, default_value = "analysis.bin")]
    pub bundle: PathBuf,

    /// Also write the summary as JSON
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SfType {
    Ratio,
    Poscounts,
}

impl From<SfType> for SizeFactorMethod {
    fn from(t: SfType) -> Self {
        match t {
            SfType::Ratio => SizeFactorMethod::Ratio,
            SfType::Poscounts => SizeFactorMethod::PosCounts,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FitType {
    Parametric,
    Mean,
}

impl From<FitType> for TrendFitMethod {
    fn from(t: FitType) -> Self {
        match t {
            FitType::Parametric => TrendFitMethod::Parametric,
            FitType::Mean => TrendFitMethod::Mean,
        }
    }
}

/// `NAME=L1,L2,...`; the first level is the reference
pub fn parse_factor(s: &str) -> std::result::Result<Factor, String> {
    let (name, levels) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=L1,L2,..., got '{}'", s))?;
    let levels: Vec<&str> = levels.split(',').map(str::trim).filter(|l| !l.is_empty()).collect();
    if name.trim().is_empty() || levels.len() < 2 {
        return Err(format!("factor '{}' needs a name and at least two levels", s));
    }
    Ok(Factor::new(name.trim(), &levels))
}

/// `FACTOR,NUMERATOR,DENOMINATOR`
pub fn parse_contrast(s: &str) -> std::result::Result<ContrastSpec, String> {
    match s.split(',').map(str::trim).collect::<Vec<_>>()[..] {
        [factor, numerator, denominator] if !factor.is_empty() => {
            Ok(ContrastSpec::levels(factor, numerator, denominator))
        }
        _ => Err(format!("expected FACTOR,NUMERATOR,DENOMINATOR, got '{}'", s)),
    }
}

pub fn build_design(factors: &[Factor], interaction: bool) -> Design {
    let design = factors
        .iter()
        .cloned()
        .fold(Design::new(), |design, factor| design.with_factor(factor));
    if interaction {
        design.with_interaction()
    } else {
        design
    }
}

/// The contrast selected by `--coef` or `--contrast`
pub fn selected_contrast(coef: Option<String>, contrast: Option<ContrastSpec>) -> Result<ContrastSpec> {
    match (coef, contrast) {
        (Some(name), None) => Ok(ContrastSpec::Coefficient(name)),
        (None, Some(spec)) => Ok(spec),
        _ => Err(DeError::InvalidInput {
            reason: "give exactly one of --coef and --contrast".to_string(),
        }),
    }
}
