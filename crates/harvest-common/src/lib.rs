//! Harvest Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the harvest workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all harvest
//! workspace members:
//!
//! - **Error Handling**: The [`HarvestError`] taxonomy and [`Result`] alias
//! - **Logging**: Centralized `tracing` subscriber configuration
//! - **Types**: The record data model shared between the pipeline and its
//!   collaborators
//!
//! # Example
//!
//! ```no_run
//! use harvest_common::{Result, types::InputRecord};
//!
//! fn describe(record: &InputRecord) -> Result<String> {
//!     Ok(format!("{} ({})", record.name, record.category))
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{HarvestError, Result};
