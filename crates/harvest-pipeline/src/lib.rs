//! Harvest Pipeline Library
//!
//! Resumable batch collection pipeline: partitions an input sequence into
//! batches, drives a rate-limited record collector with per-record failure
//! isolation, and persists successful results incrementally into
//! size-bounded JSONL shards with end-of-run integrity verification.
//!
//! # Components
//!
//! - [`scheduler`]: batch partitioning, pacing, and the run driver
//! - [`writer`]: crash-safe incremental shard writer
//! - [`verify`]: read-only shard integrity verification
//! - [`summary`]: run statistics accumulation and the final report
//! - [`source`]: input source interface and CSV implementation
//! - [`collector`]: record collector interface and HTTP implementation
//! - [`cursor`]: resume cursor persistence
//!
//! # Example
//!
//! ```no_run
//! use harvest_pipeline::{config::PipelineConfig, scheduler::PipelineRunner};
//! use harvest_pipeline::source::MemorySource;
//! use harvest_pipeline::collector::HttpCollector;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::from_env()?;
//!     let source = MemorySource::new(vec![]);
//!     let collector = HttpCollector::new(None)?;
//!     let runner = PipelineRunner::new(config);
//!     let report = runner
//!         .run(source, &collector, CancellationToken::new())
//!         .await?;
//!     println!("collected {} records", report.total_succeeded);
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod cursor;
pub mod scheduler;
pub mod source;
pub mod summary;
pub mod verify;
pub mod writer;
