//! Error types for harvest
//!
//! The taxonomy mirrors how failures propagate through the pipeline:
//! per-record collection failures are data (absorbed by the scheduler and
//! counted, never fatal), while writer and input-source errors terminate
//! the run.

use thiserror::Error;

/// Result type alias for harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Main error type for harvest
#[derive(Error, Debug)]
pub enum HarvestError {
    /// File system operation failed. Fatal when raised by the shard writer:
    /// durability can no longer be guaranteed past this point.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The input source could not produce records where some were expected.
    #[error("Input source exhausted: {0}")]
    InputExhausted(String),

    /// Input file could not be read or parsed.
    #[error("Input error: {0}. Check the input file path and its header row.")]
    Input(String),

    /// Detected post-hoc by the integrity verifier; reported, never
    /// auto-repaired.
    #[error("Integrity failure in {shard}: {reason}")]
    Integrity { shard: String, reason: String },

    #[error("Configuration error: {0}. Check flags and HARVEST_* environment variables.")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl HarvestError {
    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        HarvestError::Config(msg.into())
    }

    /// Shorthand for an input error
    pub fn input(msg: impl Into<String>) -> Self {
        HarvestError::Input(msg.into())
    }
}
