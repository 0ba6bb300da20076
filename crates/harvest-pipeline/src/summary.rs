//! Run summary accumulation and the final report
//!
//! [`RunSummary`] is fed per-identifier outcomes as the scheduler produces
//! them; [`RunSummary::finalize`] turns it into an immutable [`RunReport`]
//! snapshot exactly once, at run end. The report file is written atomically
//! (temp file then rename) so a reader never observes a partial summary.

use chrono::{DateTime, Utc};
use harvest_common::types::FailureEntry;
use harvest_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

/// File name of the report inside the output directory
pub const SUMMARY_FILE: &str = "summary.json";

/// Counts for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub batch_number: u64,
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// One shard file as listed in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardFileInfo {
    pub file: String,
    pub records: u64,
}

/// Mutable accumulator updated while the run is in flight.
#[derive(Debug)]
pub struct RunSummary {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    batches: Vec<BatchStats>,
    failures: Vec<FailureEntry>,
    category_counts: BTreeMap<String, u64>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            batches: Vec::new(),
            failures: Vec::new(),
            category_counts: BTreeMap::new(),
        }
    }

    fn batch_mut(&mut self, batch_number: u64) -> &mut BatchStats {
        if self
            .batches
            .last()
            .map(|b| b.batch_number != batch_number)
            .unwrap_or(true)
        {
            self.batches.push(BatchStats {
                batch_number,
                ..BatchStats::default()
            });
        }
        let last = self.batches.len() - 1;
        &mut self.batches[last]
    }

    /// Count one successful collection
    pub fn record_success(&mut self, batch_number: u64, category: &str) {
        let stats = self.batch_mut(batch_number);
        stats.attempted += 1;
        stats.succeeded += 1;
        *self.category_counts.entry(category.to_string()).or_insert(0) += 1;
    }

    /// Count one failed collection
    pub fn record_failure(&mut self, batch_number: u64, identifier: &str, reason: &str) {
        let stats = self.batch_mut(batch_number);
        stats.attempted += 1;
        stats.failed += 1;
        self.failures.push(FailureEntry {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
            batch_number,
        });
    }

    pub fn total_attempted(&self) -> u64 {
        self.batches.iter().map(|b| b.attempted).sum()
    }

    pub fn total_succeeded(&self) -> u64 {
        self.batches.iter().map(|b| b.succeeded).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.batches.iter().map(|b| b.failed).sum()
    }

    /// Produce the immutable end-of-run snapshot.
    ///
    /// `shards` lists the shard files present after the run; `fatal_error`
    /// carries the failure marker when the run was terminated by a fatal
    /// error rather than input exhaustion.
    pub fn finalize(self, shards: Vec<ShardFileInfo>, fatal_error: Option<String>) -> RunReport {
        let finished_at = Utc::now();
        let total_attempted = self.total_attempted();
        let total_succeeded = self.total_succeeded();
        let total_failed = self.total_failed();

        let success_rate = if total_attempted == 0 {
            "0.00%".to_string()
        } else {
            format!(
                "{:.2}%",
                total_succeeded as f64 / total_attempted as f64 * 100.0
            )
        };

        RunReport {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at,
            duration_secs: (finished_at - self.started_at).num_milliseconds() as f64 / 1000.0,
            total_attempted,
            total_succeeded,
            total_failed,
            success_rate,
            batches: self.batches,
            category_breakdown: self.category_counts,
            failures: self.failures,
            shard_files: shards,
            fatal_error,
        }
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable end-of-run report, written once to `summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub total_attempted: u64,
    pub total_succeeded: u64,
    pub total_failed: u64,
    pub success_rate: String,
    pub batches: Vec<BatchStats>,
    pub category_breakdown: BTreeMap<String, u64>,
    pub failures: Vec<FailureEntry>,
    pub shard_files: Vec<ShardFileInfo>,

    /// Set when the run was halted by a fatal error; the report then covers
    /// the work completed up to the last durable flush
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
}

impl RunReport {
    /// Write the report atomically into the output directory.
    pub fn write(&self, output_dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        let tmp = output_dir.join(format!(".{}.tmp", SUMMARY_FILE));
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, output_dir.join(SUMMARY_FILE))?;
        Ok(())
    }

    /// Load a previously written report
    pub fn load(output_dir: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(output_dir.join(SUMMARY_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }
}
