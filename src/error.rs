//! Error types for rnaseq_de

use thiserror::Error;

/// Main error type for the differential expression workflow
#[derive(Error, Debug)]
pub enum DeError {
    #[error("Invalid count matrix: {reason}")]
    InvalidCountMatrix { reason: String },

    #[error("Invalid sample info: {reason}")]
    InvalidSampleInfo { reason: String },

    /// Count columns and sample records disagree. Raised before any fitting.
    #[error("Input mismatch: {reason}")]
    InputMismatch { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Invalid design: {reason}")]
    InvalidDesign { reason: String },

    #[error("Invalid contrast: {reason}")]
    InvalidContrast { reason: String },

    /// Nested-model comparison between incompatible models
    #[error("Invalid model comparison: {reason}")]
    InvalidComparison { reason: String },

    #[error("Stage order violated: {reason}")]
    StageOrder { reason: String },

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    #[error("Size factor estimation failed: {reason}")]
    SizeFactorFailed { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Bundle encoding error: {0}")]
    BundleError(#[from] bincode::Error),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, DeError>;
