//! Incremental chunk writer
//!
//! Appends completed records to the active shard file, one self-contained
//! JSON object per line, and rotates to a new shard once the configured
//! capacity is reached. Every append is flushed and synced before it
//! returns, so a crash can lose at most the record currently being written
//! and never corrupts previously written lines.
//!
//! On startup the writer scans the output directory and resumes after the
//! highest existing shard: existing files are never overwritten or
//! truncated, and the global `record_index` counter continues from the
//! highest value found on disk.

use chrono::{DateTime, Utc};
use harvest_common::{
    types::{InputRecord, OutputRecord},
    Result,
};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Width of the zero-padded shard number in file names
/// (`records_001.jsonl`); keeps lexicographic order equal to numeric order.
const SHARD_NUMBER_WIDTH: usize = 3;

/// A record accepted for writing but not yet assigned its global index.
#[derive(Debug, Clone)]
pub struct PendingRecord {
    pub source: InputRecord,
    pub payload: serde_json::Value,
    pub captured_at: DateTime<Utc>,
    pub batch_number: u64,
}

impl PendingRecord {
    fn into_output(self, record_index: u64) -> OutputRecord {
        OutputRecord {
            source: self.source,
            payload: self.payload,
            scraping_timestamp: self.captured_at,
            batch_number: self.batch_number,
            record_index,
        }
    }
}

/// Build the path of shard `number` under `dir`.
pub fn shard_path(dir: &Path, prefix: &str, number: u64) -> PathBuf {
    dir.join(format!(
        "{}_{:0width$}.jsonl",
        prefix,
        number,
        width = SHARD_NUMBER_WIDTH
    ))
}

/// List existing shard files under `dir`, sorted by shard number.
pub fn list_shards(dir: &Path, prefix: &str) -> Result<Vec<(u64, PathBuf)>> {
    let mut shards = Vec::new();
    if !dir.exists() {
        return Ok(shards);
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(middle) = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('_'))
            .and_then(|rest| rest.strip_suffix(".jsonl"))
        else {
            continue;
        };
        match middle.parse::<u64>() {
            Ok(number) => shards.push((number, path)),
            Err(_) => warn!(file = %name, "Ignoring file with non-numeric shard suffix"),
        }
    }

    shards.sort_by_key(|(number, _)| *number);
    Ok(shards)
}

/// State recovered from one existing shard file.
struct ShardScan {
    /// Complete (newline-terminated) lines in the file
    complete_lines: usize,
    /// `record_index` of the last parseable complete line
    last_index: Option<u64>,
    /// File has trailing bytes without a terminating newline
    torn_tail: bool,
}

fn scan_shard(path: &Path) -> Result<ShardScan> {
    let content = std::fs::read_to_string(path)?;

    let torn_tail = !content.is_empty() && !content.ends_with('\n');
    let mut complete_lines = 0usize;
    let mut last_index = None;

    let mut segments: Vec<&str> = content.split('\n').collect();
    // split leaves one trailing segment: empty when terminated, the torn
    // tail otherwise
    segments.pop();

    for line in segments {
        complete_lines += 1;
        if let Ok(record) = serde_json::from_str::<OutputRecord>(line) {
            last_index = Some(record.record_index);
        }
    }

    Ok(ShardScan {
        complete_lines,
        last_index,
        torn_tail,
    })
}

/// The single writer instance for a run.
///
/// All appends are serialized through `&mut self`; one append completes,
/// including its durable flush, before the next begins. This makes
/// `record_index` assignment a total order with no races.
pub struct ShardWriter {
    dir: PathBuf,
    prefix: String,
    capacity: usize,
    shard_number: u64,
    records_in_shard: usize,
    next_index: u64,
    total_records: u64,
    file: File,
    /// The active shard ends in a torn line that must be terminated before
    /// the next append (never truncated; the verifier will report it).
    needs_terminator: bool,
}

impl ShardWriter {
    /// Open a writer over `dir`, resuming after any existing shards.
    pub fn open(dir: impl Into<PathBuf>, prefix: impl Into<String>, capacity: usize) -> Result<Self> {
        let dir = dir.into();
        let prefix = prefix.into();
        std::fs::create_dir_all(&dir)?;

        let shards = list_shards(&dir, &prefix)?;

        let mut shard_number = 1;
        let mut records_in_shard = 0;
        let mut next_index = 0;
        let mut total_records = 0u64;
        let mut needs_terminator = false;

        if let Some((last_number, _)) = shards.last() {
            shard_number = *last_number;
            for (number, path) in &shards {
                let scan = scan_shard(path)?;
                total_records += scan.complete_lines as u64;
                if let Some(index) = scan.last_index {
                    // Indices increase across shards, so the last parseable
                    // line seen wins.
                    next_index = index + 1;
                }
                if *number == shard_number {
                    records_in_shard = scan.complete_lines;
                    needs_terminator = scan.torn_tail;
                }
            }
            info!(
                shard = shard_number,
                records_in_shard,
                next_index,
                "Resuming writer after existing shards"
            );
        }

        let path = shard_path(&dir, &prefix, shard_number);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "Opened active shard");

        Ok(Self {
            dir,
            prefix,
            capacity,
            shard_number,
            records_in_shard,
            next_index,
            total_records,
            file,
            needs_terminator,
        })
    }

    /// Append one record, assigning its global index.
    ///
    /// Serializes to exactly one line, writes it to the active shard, and
    /// flushes to durable storage before returning. Rotates to a fresh
    /// shard first when the active one is at capacity.
    pub fn append(&mut self, record: PendingRecord) -> Result<OutputRecord> {
        if self.records_in_shard >= self.capacity {
            self.rotate()?;
        }

        if self.needs_terminator {
            warn!(
                shard = self.shard_number,
                "Active shard ends in a torn line; terminating it before appending"
            );
            self.file.write_all(b"\n")?;
            self.needs_terminator = false;
        }

        let output = record.into_output(self.next_index);

        // Compact JSON never contains raw newlines, so the line is
        // self-contained by construction.
        let mut line = serde_json::to_vec(&output)?;
        line.push(b'\n');

        self.file.write_all(&line)?;
        self.file.flush()?;
        self.file.sync_data()?;

        self.next_index += 1;
        self.records_in_shard += 1;
        self.total_records += 1;

        Ok(output)
    }

    /// Seal the active shard and open the next one.
    fn rotate(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.shard_number += 1;
        self.records_in_shard = 0;
        self.needs_terminator = false;

        let path = shard_path(&self.dir, &self.prefix, self.shard_number);
        self.file = OpenOptions::new().create(true).append(true).open(&path)?;

        info!(shard = self.shard_number, path = %path.display(), "Rotated to new shard");
        Ok(())
    }

    /// Number of the active shard (1-based)
    pub fn active_shard(&self) -> u64 {
        self.shard_number
    }

    /// Records currently in the active shard
    pub fn records_in_active_shard(&self) -> usize {
        self.records_in_shard
    }

    /// Index the next appended record will receive
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Total records on disk across all shards
    pub fn total_records(&self) -> u64 {
        self.total_records
    }
}
