//! End-to-end tests for the harvest binary's verify and status commands
//!
//! These run the compiled binary against shard directories prepared through
//! the writer, checking exit codes and environment-driven configuration.

use assert_cmd::Command;
use chrono::Utc;
use harvest_common::types::InputRecord;
use harvest_pipeline::writer::{PendingRecord, ShardWriter};
use predicates::prelude::*;
use serde_json::json;
use std::path::Path;

/// Write `count` well-formed records under the given shard prefix.
fn seed_shards(dir: &Path, prefix: &str, count: usize) {
    let mut writer = ShardWriter::open(dir, prefix, 100).unwrap();
    for i in 0..count {
        writer
            .append(PendingRecord {
                source: InputRecord::new(
                    format!("https://example.com/item/{i}"),
                    format!("Item {i}"),
                    "general".to_string(),
                ),
                payload: json!({ "name": format!("Item {i}") }),
                captured_at: Utc::now(),
                batch_number: 1,
            })
            .unwrap();
    }
}

#[test]
fn test_verify_honors_shard_prefix_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    seed_shards(dir.path(), "profiles", 3);

    let mut cmd = Command::cargo_bin("harvest").unwrap();
    cmd.env("HARVEST_SHARD_PREFIX", "profiles")
        .arg("verify")
        .arg("--output")
        .arg(dir.path())
        .arg("--expect-count")
        .arg("3");

    cmd.assert().success();
}

#[test]
fn test_verify_with_default_prefix_misses_renamed_shards() {
    let dir = tempfile::tempdir().unwrap();
    seed_shards(dir.path(), "profiles", 3);

    // Without the prefix override the expected records are not found.
    let mut cmd = Command::cargo_bin("harvest").unwrap();
    cmd.env_remove("HARVEST_SHARD_PREFIX")
        .arg("verify")
        .arg("--output")
        .arg(dir.path())
        .arg("--expect-count")
        .arg("3");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("expected 3"));
}

#[test]
fn test_verify_fails_on_corrupt_shard() {
    let dir = tempfile::tempdir().unwrap();
    seed_shards(dir.path(), "records", 2);

    let shard = dir.path().join("records_001.jsonl");
    let mut content = std::fs::read_to_string(&shard).unwrap();
    content.push_str("{ not json }\n");
    std::fs::write(&shard, content).unwrap();

    let mut cmd = Command::cargo_bin("harvest").unwrap();
    cmd.arg("verify").arg("--output").arg(dir.path());

    cmd.assert().failure();
}

#[test]
fn test_status_runs_against_fresh_directory() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = Command::cargo_bin("harvest").unwrap();
    cmd.arg("status").arg("--output").arg(dir.path());

    cmd.assert().success();
}
