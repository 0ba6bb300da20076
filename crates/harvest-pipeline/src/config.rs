//! Pipeline configuration
//!
//! Batch size, pacing, and shard capacity are product defaults carried over
//! from the original collection runs, not structural constraints; all of
//! them can be overridden via setters, CLI flags, or `HARVEST_*` environment
//! variables.

use harvest_common::{error::HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

/// Default number of records collected per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default pause between batches, to bound request rate.
pub const DEFAULT_PACING_SECS: u64 = 2;

/// Default maximum number of records per shard file.
pub const DEFAULT_SHARD_CAPACITY: usize = 100_000;

/// Default shard file prefix (`records_001.jsonl`, ...).
pub const DEFAULT_SHARD_PREFIX: &str = "records";

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum records per batch
    pub batch_size: usize,

    /// Delay between batches; applied unconditionally after every batch
    pub pacing: Duration,

    /// Maximum records per shard before rotation
    pub shard_capacity: usize,

    /// Directory for shards, cursor, and summary
    pub output_dir: PathBuf,

    /// Shard file name prefix
    pub shard_prefix: String,

    /// Concurrent collector calls within a batch (1 = sequential);
    /// clamped to `batch_size`
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            pacing: Duration::from_secs(DEFAULT_PACING_SECS),
            shard_capacity: DEFAULT_SHARD_CAPACITY,
            output_dir: PathBuf::from("./data_source"),
            shard_prefix: DEFAULT_SHARD_PREFIX.to_string(),
            concurrency: 1,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from environment variables
    ///
    /// Recognized variables: `HARVEST_BATCH_SIZE`, `HARVEST_PACING_SECS`,
    /// `HARVEST_SHARD_CAPACITY`, `HARVEST_OUTPUT_DIR`, `HARVEST_SHARD_PREFIX`,
    /// `HARVEST_CONCURRENCY`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("HARVEST_BATCH_SIZE") {
            config.batch_size = parse_env("HARVEST_BATCH_SIZE", &v)?;
        }
        if let Ok(v) = std::env::var("HARVEST_PACING_SECS") {
            config.pacing = Duration::from_secs(parse_env("HARVEST_PACING_SECS", &v)?);
        }
        if let Ok(v) = std::env::var("HARVEST_SHARD_CAPACITY") {
            config.shard_capacity = parse_env("HARVEST_SHARD_CAPACITY", &v)?;
        }
        if let Ok(v) = std::env::var("HARVEST_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("HARVEST_SHARD_PREFIX") {
            config.shard_prefix = v;
        }
        if let Ok(v) = std::env::var("HARVEST_CONCURRENCY") {
            config.concurrency = parse_env("HARVEST_CONCURRENCY", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants the pipeline relies on
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(HarvestError::config("batch size must be at least 1"));
        }
        if self.shard_capacity == 0 {
            return Err(HarvestError::config("shard capacity must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(HarvestError::config("concurrency must be at least 1"));
        }
        Ok(())
    }

    /// Concurrency limit actually used: never wider than a batch
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.min(self.batch_size)
    }

    pub fn set_output_dir(&mut self, dir: impl Into<PathBuf>) {
        self.output_dir = dir.into();
    }

    pub fn set_batch_size(&mut self, size: usize) {
        self.batch_size = size;
    }

    pub fn set_pacing(&mut self, pacing: Duration) {
        self.pacing = pacing;
    }

    pub fn set_shard_capacity(&mut self, capacity: usize) {
        self.shard_capacity = capacity;
    }

    pub fn set_concurrency(&mut self, concurrency: usize) {
        self.concurrency = concurrency;
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| HarvestError::config(format!("invalid value for {}: '{}'", name, value)))
}
