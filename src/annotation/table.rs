//! Annotation records exported from an annotation service as a TSV file

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use super::{AnnotationRecord, AnnotationSource};
use crate::error::Result;

/// In-memory annotation source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationTable {
    records: Vec<AnnotationRecord>,
}

impl AnnotationTable {
    pub fn new(records: Vec<AnnotationRecord>) -> Self {
        Self { records }
    }

    /// Read a tab-separated export with a header row. Empty fields are
    /// missing values.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let records = csv::ReaderBuilder::default()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(false)
            .from_reader(reader)
            .deserialize::<AnnotationRecord>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        log::debug!("read {} annotation records", records.len());
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[AnnotationRecord] {
        &self.records
    }
}

impl AnnotationSource for AnnotationTable {
    fn lookup(&self, gene_ids: &[String]) -> Result<Vec<AnnotationRecord>> {
        let wanted: HashSet<&str> = gene_ids.iter().map(|g| g.as_str()).collect();
        Ok(self
            .records
            .iter()
            .filter(|r| wanted.contains(r.gene_id.as_str()))
            .cloned()
            .collect())
    }
}
