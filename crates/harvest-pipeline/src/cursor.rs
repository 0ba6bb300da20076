//! Resume cursor persistence
//!
//! The cursor marks the last input position fully committed (all of its
//! batch's results written or counted as failures). It is saved after every
//! batch commit, so a restarted run continues at the next unprocessed input
//! record instead of reprocessing from the start.

use chrono::{DateTime, Utc};
use harvest_common::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the cursor marker inside the output directory
pub const CURSOR_FILE: &str = "cursor.json";

/// Persisted marker of the last processed input position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeCursor {
    /// Number of input records fully processed (the next run starts at this
    /// offset)
    pub position: usize,

    /// Identifier of the last processed input record, for sanity checks and
    /// operator visibility
    pub last_identifier: Option<String>,

    /// Number of batches completed so far
    pub batches_completed: u64,

    /// When the cursor was last updated
    pub updated_at: DateTime<Utc>,
}

impl ResumeCursor {
    /// Cursor at the start of the input
    pub fn start() -> Self {
        Self {
            position: 0,
            last_identifier: None,
            batches_completed: 0,
            updated_at: Utc::now(),
        }
    }

    /// Load the cursor from the output directory, or start fresh when no
    /// marker exists.
    pub fn load_or_start(output_dir: &Path) -> Result<Self> {
        let path = output_dir.join(CURSOR_FILE);
        if !path.exists() {
            return Ok(Self::start());
        }
        let content = std::fs::read_to_string(&path)?;
        let cursor = serde_json::from_str(&content)?;
        Ok(cursor)
    }

    /// Persist the cursor into the output directory.
    ///
    /// Written to a temp file first and renamed into place, so a crash
    /// mid-save never leaves a torn `cursor.json` behind.
    pub fn save(&self, output_dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        let tmp = output_dir.join(format!(".{}.tmp", CURSOR_FILE));
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, output_dir.join(CURSOR_FILE))?;
        Ok(())
    }

    /// Advance past `count` more processed records
    pub fn advance(&mut self, count: usize, last_identifier: Option<String>) {
        self.position += count;
        if last_identifier.is_some() {
            self.last_identifier = last_identifier;
        }
        self.batches_completed += 1;
        self.updated_at = Utc::now();
    }
}
