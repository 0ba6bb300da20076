//! Input source interface and implementations
//!
//! An input source yields the ordered, finite sequence of records to
//! collect. Sources are restartable: `records(offset)` may be called any
//! number of times and always re-yields the sequence starting at `offset`,
//! which is how a crashed run resumes without reprocessing.

use csv::StringRecord;
use harvest_common::{error::HarvestError, types::InputRecord, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Ordered, restartable, finite sequence of input records.
pub trait InputSource {
    /// Yield the sequence starting at `offset` (0 = from the beginning).
    ///
    /// An `Err` item mid-iteration means the source failed where more
    /// records were expected; the scheduler treats it as fatal.
    fn records(
        &self,
        offset: usize,
    ) -> Result<Box<dyn Iterator<Item = Result<InputRecord>> + Send + '_>>;
}

/// Row shape expected in the input CSV.
#[derive(Debug, Deserialize)]
struct CsvRow {
    name: String,
    url: String,
    category: String,
}

/// Input source backed by a CSV file with `name,url,category` headers.
///
/// Fields are trimmed; rows that fail to deserialize are skipped with a
/// warning rather than aborting the run. Extra columns are ignored.
#[derive(Debug, Clone)]
pub struct CsvInputSource {
    path: PathBuf,
}

impl CsvInputSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InputSource for CsvInputSource {
    fn records(
        &self,
        offset: usize,
    ) -> Result<Box<dyn Iterator<Item = Result<InputRecord>> + Send + '_>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| {
                HarvestError::input(format!("cannot open {}: {}", self.path.display(), e))
            })?;

        let headers = reader
            .headers()
            .map_err(|e| HarvestError::input(format!("invalid CSV header: {}", e)))?
            .clone();

        info!(path = %self.path.display(), offset, "Reading input records from CSV");

        let path = self.path.clone();
        let iter = reader
            .into_records()
            .filter_map(move |row| match row {
                Ok(row) => deserialize_row(&row, &headers, &path),
                Err(e) => Some(Err(HarvestError::input(format!(
                    "CSV read error in {}: {}",
                    path.display(),
                    e
                )))),
            })
            .skip(offset);

        Ok(Box::new(iter))
    }
}

fn deserialize_row(
    row: &StringRecord,
    headers: &StringRecord,
    path: &Path,
) -> Option<Result<InputRecord>> {
    match row.deserialize::<CsvRow>(Some(headers)) {
        Ok(parsed) => Some(Ok(InputRecord::new(parsed.url, parsed.name, parsed.category))),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping malformed CSV row");
            None
        },
    }
}

/// In-memory input source, used in tests and embedding scenarios.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<InputRecord>,
}

impl MemorySource {
    pub fn new(records: Vec<InputRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl InputSource for MemorySource {
    fn records(
        &self,
        offset: usize,
    ) -> Result<Box<dyn Iterator<Item = Result<InputRecord>> + Send + '_>> {
        Ok(Box::new(
            self.records.iter().skip(offset).cloned().map(Ok),
        ))
    }
}
