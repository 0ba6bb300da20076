//! Shard integrity verification
//!
//! Re-reads every shard line by line and reports, per shard: the line count,
//! parse failures with their line numbers, and whether `record_index` values
//! are strictly increasing (a non-increasing index means interleaved or
//! corrupted writes). Verification is read-only and idempotent; a failed
//! check is reported, never auto-repaired.
//!
//! A trailing line without a terminating newline is what a crash mid-append
//! leaves behind, so it is reported as a warning rather than an error.

use crate::writer::list_shards;
use harvest_common::{error::HarvestError, types::OutputRecord, Result};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// One unparseable line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineIssue {
    /// 1-based line number within the shard
    pub line: usize,
    pub reason: String,
}

/// Verification result for one shard file
#[derive(Debug, Clone, Serialize)]
pub struct ShardReport {
    pub file: String,
    /// Complete (newline-terminated) lines
    pub total_lines: usize,
    /// Lines that failed to parse as a full output record
    pub parse_errors: Vec<LineIssue>,
    /// Whether `record_index` values are strictly increasing within the shard
    pub indices_strictly_increasing: bool,
    /// Non-fatal observations (e.g. a torn trailing line)
    pub warnings: Vec<String>,
}

impl ShardReport {
    pub fn is_ok(&self) -> bool {
        self.parse_errors.is_empty() && self.indices_strictly_increasing
    }
}

/// Verification result for a whole shard directory
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub shards: Vec<ShardReport>,
}

impl VerifyReport {
    /// True when no shard has errors (warnings are allowed)
    pub fn is_ok(&self) -> bool {
        self.shards.iter().all(ShardReport::is_ok)
    }

    /// Total parseable records across all shards
    pub fn total_records(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| (s.total_lines - s.parse_errors.len()) as u64)
            .sum()
    }

    pub fn total_errors(&self) -> usize {
        self.shards.iter().map(|s| s.parse_errors.len()).sum()
    }

    /// Turn the first failing shard into an [`HarvestError::Integrity`]
    pub fn ensure_ok(&self) -> Result<()> {
        if let Some(bad) = self.shards.iter().find(|s| !s.is_ok()) {
            let reason = if bad.parse_errors.is_empty() {
                "record_index values are not strictly increasing".to_string()
            } else {
                format!(
                    "{} unparseable line(s), first at line {}",
                    bad.parse_errors.len(),
                    bad.parse_errors[0].line
                )
            };
            return Err(HarvestError::Integrity {
                shard: bad.file.clone(),
                reason,
            });
        }
        Ok(())
    }
}

/// Verify every shard under `dir`.
///
/// Safe to run repeatedly, including against the shard directory of a run
/// still in progress or one that crashed mid-append.
pub fn verify_shards(dir: &Path, prefix: &str) -> Result<VerifyReport> {
    let mut shards = Vec::new();

    for (number, path) in list_shards(dir, prefix)? {
        debug!(shard = number, path = %path.display(), "Verifying shard");
        shards.push(verify_shard(&path)?);
    }

    let report = VerifyReport { shards };
    info!(
        shards = report.shards.len(),
        records = report.total_records(),
        errors = report.total_errors(),
        "Shard verification finished"
    );
    Ok(report)
}

fn verify_shard(path: &Path) -> Result<ShardReport> {
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let content = std::fs::read_to_string(path)?;

    let mut report = ShardReport {
        file,
        total_lines: 0,
        parse_errors: Vec::new(),
        indices_strictly_increasing: true,
        warnings: Vec::new(),
    };

    let torn_tail = !content.is_empty() && !content.ends_with('\n');
    let mut segments: Vec<&str> = content.split('\n').collect();
    let tail = segments.pop();

    let mut previous_index: Option<u64> = None;
    for (offset, line) in segments.iter().enumerate() {
        report.total_lines += 1;
        match serde_json::from_str::<OutputRecord>(line) {
            Ok(record) => {
                if let Some(prev) = previous_index {
                    if record.record_index <= prev {
                        report.indices_strictly_increasing = false;
                    }
                }
                previous_index = Some(record.record_index);
            },
            Err(e) => report.parse_errors.push(LineIssue {
                line: offset + 1,
                reason: e.to_string(),
            }),
        }
    }

    if torn_tail {
        if let Some(tail) = tail {
            report.warnings.push(format!(
                "trailing incomplete line at line {} ({} bytes, no terminating newline)",
                report.total_lines + 1,
                tail.len()
            ));
        }
    }

    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::writer::{shard_path, PendingRecord, ShardWriter};
    use chrono::Utc;
    use harvest_common::types::InputRecord;
    use serde_json::json;
    use std::io::Write;

    fn write_records(dir: &Path, capacity: usize, count: u64) {
        let mut writer = ShardWriter::open(dir, "records", capacity).unwrap();
        for n in 0..count {
            writer
                .append(PendingRecord {
                    source: InputRecord::new(format!("id-{}", n), format!("r{}", n), "t"),
                    payload: json!({ "n": n }),
                    captured_at: Utc::now(),
                    batch_number: 1,
                })
                .unwrap();
        }
    }

    #[test]
    fn test_clean_directory_verifies() {
        let dir = tempfile::tempdir().unwrap();
        write_records(dir.path(), 5, 12);

        let report = verify_shards(dir.path(), "records").unwrap();
        assert!(report.is_ok());
        assert_eq!(report.shards.len(), 3);
        assert_eq!(report.total_records(), 12);
        assert_eq!(report.shards[0].total_lines, 5);
        assert_eq!(report.shards[2].total_lines, 2);
    }

    #[test]
    fn test_corrupt_line_reported_with_position() {
        let dir = tempfile::tempdir().unwrap();
        write_records(dir.path(), 100, 3);

        // Corrupt the middle line of the shard.
        let path = shard_path(dir.path(), "records", 1);
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = content.lines().map(String::from).collect();
        lines[1] = "{not json".to_string();
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        let report = verify_shards(dir.path(), "records").unwrap();
        assert!(!report.is_ok());
        assert_eq!(report.total_errors(), 1);
        assert_eq!(report.shards[0].parse_errors[0].line, 2);
        assert_eq!(report.total_records(), 2);

        match report.ensure_ok() {
            Err(HarvestError::Integrity { shard, reason }) => {
                assert_eq!(shard, "records_001.jsonl");
                assert!(reason.contains("line 2"));
            },
            other => panic!("expected integrity error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_missing_envelope_field_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // Valid JSON, but no record_index.
        let line = json!({
            "source": {"identifier": "a", "name": "A", "category": "x"},
            "payload": {},
            "scraping_timestamp": Utc::now(),
            "batch_number": 1
        });
        std::fs::write(
            shard_path(dir.path(), "records", 1),
            format!("{}\n", line),
        )
        .unwrap();

        let report = verify_shards(dir.path(), "records").unwrap();
        assert_eq!(report.total_errors(), 1);
        assert!(report.shards[0].parse_errors[0]
            .reason
            .contains("record_index"));
    }

    #[test]
    fn test_non_increasing_indices_detected() {
        let dir = tempfile::tempdir().unwrap();
        write_records(dir.path(), 100, 3);

        let path = shard_path(dir.path(), "records", 1);
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = content.lines().map(String::from).collect();
        // Duplicate the first line at the end: valid JSON, index goes backwards.
        lines.push(lines[0].clone());
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        let report = verify_shards(dir.path(), "records").unwrap();
        assert!(!report.is_ok());
        assert!(!report.shards[0].indices_strictly_increasing);
        assert!(report.shards[0].parse_errors.is_empty());
    }

    #[test]
    fn test_torn_trailing_line_is_warning_not_error() {
        let dir = tempfile::tempdir().unwrap();
        write_records(dir.path(), 100, 2);

        let path = shard_path(dir.path(), "records", 1);
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"source\":{\"ident").unwrap();
        drop(file);

        let report = verify_shards(dir.path(), "records").unwrap();
        assert!(report.is_ok());
        assert_eq!(report.shards[0].total_lines, 2);
        assert_eq!(report.shards[0].warnings.len(), 1);
        assert!(report.shards[0].warnings[0].contains("line 3"));
    }

    #[test]
    fn test_verification_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_records(dir.path(), 4, 9);

        let first = verify_shards(dir.path(), "records").unwrap();
        let second = verify_shards(dir.path(), "records").unwrap();

        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[test]
    fn test_empty_directory_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let report = verify_shards(dir.path(), "records").unwrap();
        assert!(report.is_ok());
        assert_eq!(report.total_records(), 0);
        assert!(report.shards.is_empty());
    }
}
