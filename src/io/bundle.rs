//! Binary bundles handed between workflow steps

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::data::SampleInfo;
use crate::error::Result;
use crate::filter::FilterOutcome;
use crate::model::FittedModel;
use crate::shrinkage::ShrunkenLfc;
use crate::testing::ResultsTable;

/// Everything the annotation and plotting steps need from a test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisBundle {
    pub results: ResultsTable,
    pub shrunk: Option<ShrunkenLfc>,
    pub filter: Option<FilterOutcome>,
    pub model: FittedModel,
}

impl AnalysisBundle {
    pub fn sample_info(&self) -> &SampleInfo {
        self.model.sample_info()
    }
}

/// Write any serialisable value with `bincode`
pub fn save_bundle<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, value)?;
    log::info!("wrote {}", path.display());
    Ok(())
}

pub fn load_bundle<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(reader)?)
}
