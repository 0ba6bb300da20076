//! Batch scheduler and run driver
//!
//! Partitions the input sequence into contiguous batches, drives the record
//! collector with bounded per-batch concurrency, hands successful results to
//! the shard writer in input order, and paces between batches to bound the
//! request rate against the external source.
//!
//! Failure policy: a collector failure for one identifier is isolated; it
//! is logged and counted, and the run continues. Only writer I/O errors and
//! input source errors are fatal; both leave the shards and resume cursor
//! reflecting exactly the work committed so far.

use crate::collector::RecordCollector;
use crate::config::PipelineConfig;
use crate::cursor::ResumeCursor;
use crate::source::InputSource;
use crate::summary::{RunReport, RunSummary, ShardFileInfo};
use crate::verify::verify_shards;
use crate::writer::{PendingRecord, ShardWriter};
use futures::{stream, StreamExt};
use harvest_common::{
    types::{CollectionResult, InputRecord},
    Result,
};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// One contiguous slice of the input sequence.
#[derive(Debug, Clone)]
pub struct Batch {
    /// 1-based batch number, monotonic across resumed runs
    pub number: u64,
    pub records: Vec<InputRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Drives a whole collection run.
pub struct PipelineRunner {
    config: PipelineConfig,
    show_progress: bool,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            show_progress: false,
        }
    }

    /// Show an indicatif spinner while the run progresses
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    /// Run the pipeline to completion (or cancellation).
    ///
    /// Resumes from the persisted cursor when one exists in the output
    /// directory. On a fatal error the summary is still written best-effort,
    /// with a failure marker, before the error propagates.
    pub async fn run<S, C>(
        &self,
        source: S,
        collector: &C,
        cancel: CancellationToken,
    ) -> Result<RunReport>
    where
        S: InputSource,
        C: RecordCollector + ?Sized,
    {
        self.config.validate()?;
        std::fs::create_dir_all(&self.config.output_dir)?;

        let mut cursor = ResumeCursor::load_or_start(&self.config.output_dir)?;
        if cursor.position > 0 {
            info!(
                position = cursor.position,
                batches_completed = cursor.batches_completed,
                "Resuming from persisted cursor"
            );
        }

        let mut writer = ShardWriter::open(
            &self.config.output_dir,
            &self.config.shard_prefix,
            self.config.shard_capacity,
        )?;
        let mut summary = RunSummary::new();

        let outcome = self
            .drive(source, collector, &cancel, &mut cursor, &mut writer, &mut summary)
            .await;

        match outcome {
            Ok(()) => {
                // End-of-run integrity pass over everything on disk.
                let verification =
                    verify_shards(&self.config.output_dir, &self.config.shard_prefix)?;
                if !verification.is_ok() {
                    error!(
                        errors = verification.total_errors(),
                        "Integrity verification found problems; shards are left untouched"
                    );
                }

                let shard_files = verification
                    .shards
                    .iter()
                    .map(|s| ShardFileInfo {
                        file: s.file.clone(),
                        records: (s.total_lines - s.parse_errors.len()) as u64,
                    })
                    .collect();

                let report = summary.finalize(shard_files, None);
                report.write(&self.config.output_dir)?;
                info!(
                    attempted = report.total_attempted,
                    succeeded = report.total_succeeded,
                    failed = report.total_failed,
                    success_rate = %report.success_rate,
                    "Run complete"
                );
                Ok(report)
            },
            Err(e) => {
                // Durable state already reflects the last committed batch;
                // record the failure marker best-effort and propagate.
                error!(error = %e, "Run halted by fatal error");
                let shard_files = self.shard_files_best_effort();
                let report = summary.finalize(shard_files, Some(e.to_string()));
                if let Err(write_err) = report.write(&self.config.output_dir) {
                    warn!(error = %write_err, "Could not write failure summary");
                }
                Err(e)
            },
        }
    }

    /// The batch loop proper. Returns `Ok(())` on input exhaustion or
    /// cancellation; any `Err` is fatal.
    async fn drive<S, C>(
        &self,
        source: S,
        collector: &C,
        cancel: &CancellationToken,
        cursor: &mut ResumeCursor,
        writer: &mut ShardWriter,
        summary: &mut RunSummary,
    ) -> Result<()>
    where
        S: InputSource,
        C: RecordCollector + ?Sized,
    {
        let mut input = source.records(cursor.position)?;
        let concurrency = self.config.effective_concurrency();

        let progress = self.make_progress();

        let mut batch = next_batch(&mut input, self.config.batch_size, cursor.batches_completed)?;

        while !batch.is_empty() {
            info!(
                batch = batch.number,
                records = batch.len(),
                concurrency,
                "Collecting batch"
            );
            progress.set_message(format!("batch {}", batch.number));

            // All records of the batch resolve before anything else happens;
            // buffered() keeps results in input order even when concurrent.
            let outcomes: Vec<(InputRecord, CollectionResult)> =
                stream::iter(batch.records.iter().cloned().map(|record| async move {
                    let result = collector.collect(&record).await;
                    (record, result)
                }))
                .buffered(concurrency)
                .collect()
                .await;

            let mut batch_succeeded = 0u64;
            for (record, result) in outcomes {
                progress.inc(1);
                match result {
                    CollectionResult::Success {
                        payload,
                        captured_at,
                    } => {
                        writer.append(PendingRecord {
                            source: record.clone(),
                            payload,
                            captured_at,
                            batch_number: batch.number,
                        })?;
                        summary.record_success(batch.number, &record.category);
                        batch_succeeded += 1;
                    },
                    CollectionResult::Failure { identifier, reason } => {
                        warn!(%identifier, %reason, batch = batch.number, "Record collection failed");
                        summary.record_failure(batch.number, &identifier, &reason);
                    },
                }
            }

            // Commit the batch: cursor moves only after every result is
            // written or counted.
            let last_identifier = batch.records.last().map(|r| r.identifier.clone());
            cursor.advance(batch.len(), last_identifier);
            cursor.save(&self.config.output_dir)?;

            info!(
                batch = batch.number,
                succeeded = batch_succeeded,
                failed = batch.len() as u64 - batch_succeeded,
                "Batch committed"
            );

            if cancel.is_cancelled() {
                info!("Cancellation requested; stopping at batch boundary");
                break;
            }

            batch = next_batch(&mut input, self.config.batch_size, cursor.batches_completed)?;
            if !batch.is_empty() {
                // Unconditional pacing before the next batch, regardless of
                // how this one went.
                tokio::select! {
                    _ = tokio::time::sleep(self.config.pacing) => {},
                    _ = cancel.cancelled() => {
                        info!("Cancellation requested during pacing; stopping");
                        break;
                    },
                }
            }
        }

        progress.finish_and_clear();
        Ok(())
    }

    fn make_progress(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {pos} records collected ({msg})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }

    fn shard_files_best_effort(&self) -> Vec<ShardFileInfo> {
        verify_shards(&self.config.output_dir, &self.config.shard_prefix)
            .map(|v| {
                v.shards
                    .iter()
                    .map(|s| ShardFileInfo {
                        file: s.file.clone(),
                        records: (s.total_lines - s.parse_errors.len()) as u64,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Pull at most `batch_size` records from the input iterator.
///
/// An `Err` item from the source is fatal and propagates.
fn next_batch(
    input: &mut (dyn Iterator<Item = Result<InputRecord>> + Send + '_),
    batch_size: usize,
    batches_completed: u64,
) -> Result<Batch> {
    let mut records = Vec::with_capacity(batch_size);
    for item in input.take(batch_size) {
        records.push(item?);
    }
    Ok(Batch {
        number: batches_completed + 1,
        records,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use async_trait::async_trait;
    use harvest_common::{error::HarvestError, types::OutputRecord};
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Collector that fails at fixed 1-based call positions and records the
    /// order identifiers were requested in.
    struct ScriptedCollector {
        fail_at: HashSet<usize>,
        calls: Mutex<Vec<String>>,
        delay: Option<Duration>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl ScriptedCollector {
        fn new(fail_at: impl IntoIterator<Item = usize>) -> Self {
            Self {
                fail_at: fail_at.into_iter().collect(),
                calls: Mutex::new(Vec::new()),
                delay: None,
                cancel_after: None,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RecordCollector for ScriptedCollector {
        async fn collect(&self, record: &InputRecord) -> CollectionResult {
            let position = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(record.identifier.clone());
                calls.len()
            };
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some((after, token)) = &self.cancel_after {
                if position == *after {
                    token.cancel();
                }
            }
            if self.fail_at.contains(&position) {
                CollectionResult::failure(&record.identifier, "scripted failure")
            } else {
                CollectionResult::success(json!({ "id": record.identifier }))
            }
        }
    }

    fn make_input(count: usize) -> Vec<InputRecord> {
        (1..=count)
            .map(|n| {
                InputRecord::new(
                    format!("https://example.com/{}", n),
                    format!("record {}", n),
                    if n % 2 == 0 { "even" } else { "odd" },
                )
            })
            .collect()
    }

    fn runner(dir: &std::path::Path, batch_size: usize, capacity: usize) -> PipelineRunner {
        let mut config = PipelineConfig::default();
        config.set_output_dir(dir);
        config.set_batch_size(batch_size);
        config.set_shard_capacity(capacity);
        config.set_pacing(Duration::from_secs(2));
        PipelineRunner::new(config)
    }

    fn written_records(dir: &std::path::Path) -> Vec<OutputRecord> {
        let mut records = Vec::new();
        for (_, path) in crate::writer::list_shards(dir, "records").unwrap() {
            let content = std::fs::read_to_string(path).unwrap();
            for line in content.lines() {
                records.push(serde_json::from_str(line).unwrap());
            }
        }
        records
    }

    #[tokio::test(start_paused = true)]
    async fn test_23_records_batch_10_with_3_failures() {
        let dir = tempfile::tempdir().unwrap();
        let input = make_input(23);
        let collector = ScriptedCollector::new([5, 14, 23]);

        let report = runner(dir.path(), 10, 100_000)
            .run(
                MemorySource::new(input.clone()),
                &collector,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.total_attempted, 23);
        assert_eq!(report.total_succeeded, 20);
        assert_eq!(report.total_failed, 3);
        assert_eq!(report.batches.len(), 3);
        assert_eq!(report.batches[0].attempted, 10);
        assert_eq!(report.batches[1].attempted, 10);
        assert_eq!(report.batches[2].attempted, 3);
        assert_eq!(report.failures.len(), 3);

        // every input collected exactly once, in input order
        let expected: Vec<String> = input.iter().map(|r| r.identifier.clone()).collect();
        assert_eq!(collector.calls(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_index_contiguous_over_successes() {
        let dir = tempfile::tempdir().unwrap();
        let collector = ScriptedCollector::new([2, 3]);

        runner(dir.path(), 4, 100_000)
            .run(
                MemorySource::new(make_input(10)),
                &collector,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let records = written_records(dir.path());
        assert_eq!(records.len(), 8);
        for (n, record) in records.iter().enumerate() {
            assert_eq!(record.record_index, n as u64);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_collection_preserves_write_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut collector = ScriptedCollector::new([]);
        collector.delay = Some(Duration::from_millis(50));

        let mut config = PipelineConfig::default();
        config.set_output_dir(dir.path());
        config.set_batch_size(6);
        config.set_concurrency(6);
        config.set_pacing(Duration::from_millis(10));

        let input = make_input(12);
        PipelineRunner::new(config)
            .run(
                MemorySource::new(input.clone()),
                &collector,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let records = written_records(dir.path());
        let written: Vec<&str> = records.iter().map(|r| r.source.identifier.as_str()).collect();
        let expected: Vec<&str> = input.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(written, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shard_rotation_capacity_5_with_12_successes() {
        let dir = tempfile::tempdir().unwrap();
        let collector = ScriptedCollector::new([]);

        let report = runner(dir.path(), 10, 5)
            .run(
                MemorySource::new(make_input(12)),
                &collector,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.shard_files.len(), 3);
        assert_eq!(report.shard_files[0].records, 5);
        assert_eq!(report.shard_files[1].records, 5);
        assert_eq!(report.shard_files[2].records, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_honored_at_batch_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let mut collector = ScriptedCollector::new([]);
        // cancel mid-batch: the batch must still finish and commit
        collector.cancel_after = Some((3, token.clone()));

        let report = runner(dir.path(), 10, 100_000)
            .run(MemorySource::new(make_input(25)), &collector, token)
            .await
            .unwrap();

        assert_eq!(report.total_attempted, 10);
        assert_eq!(collector.calls().len(), 10);

        let cursor = ResumeCursor::load_or_start(dir.path()).unwrap();
        assert_eq!(cursor.position, 10);
        assert_eq!(cursor.batches_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_skips_processed_records() {
        let dir = tempfile::tempdir().unwrap();
        let input = make_input(25);

        let token = CancellationToken::new();
        let mut first = ScriptedCollector::new([]);
        first.cancel_after = Some((1, token.clone()));
        runner(dir.path(), 10, 100_000)
            .run(MemorySource::new(input.clone()), &first, token)
            .await
            .unwrap();

        let second = ScriptedCollector::new([]);
        let report = runner(dir.path(), 10, 100_000)
            .run(
                MemorySource::new(input.clone()),
                &second,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        // second run processed only records 11..=25
        assert_eq!(report.total_attempted, 15);
        assert_eq!(second.calls()[0], "https://example.com/11");

        // on disk: the full 25, each exactly once, indices contiguous
        let records = written_records(dir.path());
        assert_eq!(records.len(), 25);
        for (n, record) in records.iter().enumerate() {
            assert_eq!(record.record_index, n as u64);
            assert_eq!(record.source.identifier, format!("https://example.com/{}", n + 1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_input_writes_empty_summary() {
        let dir = tempfile::tempdir().unwrap();
        let collector = ScriptedCollector::new([]);

        let report = runner(dir.path(), 10, 100_000)
            .run(
                MemorySource::new(vec![]),
                &collector,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.total_attempted, 0);
        assert!(dir.path().join(crate::summary::SUMMARY_FILE).exists());
    }

    /// Source that fails partway through iteration.
    struct BrokenSource {
        good: usize,
    }

    impl crate::source::InputSource for BrokenSource {
        fn records(
            &self,
            offset: usize,
        ) -> Result<Box<dyn Iterator<Item = Result<InputRecord>> + Send + '_>> {
            let good = self.good;
            let iter = (0..good + 1).skip(offset).map(move |n| {
                if n < good {
                    Ok(InputRecord::new(format!("id-{}", n), format!("r{}", n), "t"))
                } else {
                    Err(HarvestError::InputExhausted("source truncated".to_string()))
                }
            });
            Ok(Box::new(iter))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_source_error_is_fatal_with_failure_marker() {
        let dir = tempfile::tempdir().unwrap();
        let collector = ScriptedCollector::new([]);

        let result = runner(dir.path(), 10, 100_000)
            .run(BrokenSource { good: 5 }, &collector, CancellationToken::new())
            .await;

        assert!(matches!(result, Err(HarvestError::InputExhausted(_))));

        // failure summary was still written, with the marker set
        let report = RunReport::load(dir.path()).unwrap();
        assert!(report.fatal_error.is_some());
    }
}
