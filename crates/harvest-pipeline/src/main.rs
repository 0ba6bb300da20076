//! harvest - resumable batch record collection

use anyhow::Result;
use clap::Parser;
use harvest_common::logging::{init_logging, LogConfig, LogLevel};
use harvest_pipeline::collector::HttpCollector;
use harvest_pipeline::config::PipelineConfig;
use harvest_pipeline::cursor::ResumeCursor;
use harvest_pipeline::scheduler::PipelineRunner;
use harvest_pipeline::source::CsvInputSource;
use harvest_pipeline::verify::verify_shards;
use harvest_pipeline::writer::list_shards;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(author, version, about = "Resumable batch record collection pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Collect all records from an input CSV into JSONL shards
    Run {
        /// Input CSV file (name,url,category headers)
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory for shards, cursor, and summary
        #[arg(short, long, default_value = "./data_source")]
        output: PathBuf,

        /// Records per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Seconds to pause between batches
        #[arg(long)]
        pacing_secs: Option<u64>,

        /// Records per shard before rotation
        #[arg(long)]
        shard_capacity: Option<usize>,

        /// Concurrent collector calls within a batch
        #[arg(long)]
        concurrency: Option<usize>,

        /// Extraction API endpoint; identifiers are fetched directly when
        /// omitted
        #[arg(long, env = "HARVEST_ENDPOINT")]
        endpoint: Option<String>,
    },

    /// Verify shard integrity in an output directory
    Verify {
        /// Output directory to verify
        #[arg(short, long, default_value = "./data_source")]
        output: PathBuf,

        /// Fail unless exactly this many records are present
        #[arg(long)]
        expect_count: Option<u64>,
    },

    /// Show cursor position and shard totals
    Status {
        /// Output directory to inspect
        #[arg(short, long, default_value = "./data_source")]
        output: PathBuf,
    },
}

/// Apply the `--verbose` flag on top of an environment-derived log config.
fn apply_verbosity(mut config: LogConfig, verbose: bool) -> LogConfig {
    if verbose {
        config.level = LogLevel::Debug;
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = apply_verbosity(LogConfig::from_env()?, cli.verbose);
    init_logging(&log_config)?;

    match cli.command {
        Command::Run {
            input,
            output,
            batch_size,
            pacing_secs,
            shard_capacity,
            concurrency,
            endpoint,
        } => {
            let mut config = PipelineConfig::from_env()?;
            config.set_output_dir(output);
            if let Some(size) = batch_size {
                config.set_batch_size(size);
            }
            if let Some(secs) = pacing_secs {
                config.set_pacing(Duration::from_secs(secs));
            }
            if let Some(capacity) = shard_capacity {
                config.set_shard_capacity(capacity);
            }
            if let Some(limit) = concurrency {
                config.set_concurrency(limit);
            }

            let cancel = CancellationToken::new();
            let signal_token = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received; finishing the current batch before stopping");
                    signal_token.cancel();
                }
            });

            let source = CsvInputSource::new(input);
            let collector = HttpCollector::new(endpoint)?;
            let runner = PipelineRunner::new(config).with_progress(true);

            let report = runner.run(source, &collector, cancel).await?;
            info!(
                succeeded = report.total_succeeded,
                failed = report.total_failed,
                duration_secs = report.duration_secs,
                "Collection finished"
            );
            // Partial success (some failures) still exits 0: failures are
            // data, recorded in the summary.
        },
        Command::Verify {
            output,
            expect_count,
        } => {
            let config = PipelineConfig::from_env()?;
            let report = verify_shards(&output, &config.shard_prefix)?;

            for shard in &report.shards {
                info!(
                    file = %shard.file,
                    lines = shard.total_lines,
                    errors = shard.parse_errors.len(),
                    increasing = shard.indices_strictly_increasing,
                    "Shard verified"
                );
                for issue in &shard.parse_errors {
                    warn!(file = %shard.file, line = issue.line, reason = %issue.reason, "Parse failure");
                }
                for warning in &shard.warnings {
                    warn!(file = %shard.file, "{}", warning);
                }
            }

            report.ensure_ok()?;
            if let Some(expected) = expect_count {
                let found = report.total_records();
                if found != expected {
                    anyhow::bail!(
                        "record count mismatch: expected {}, found {}",
                        expected,
                        found
                    );
                }
            }
            info!(records = report.total_records(), "Verification passed");
        },
        Command::Status { output } => {
            let config = PipelineConfig::from_env()?;
            let cursor = ResumeCursor::load_or_start(&output)?;
            let shards = list_shards(&output, &config.shard_prefix)?;

            info!(
                position = cursor.position,
                batches_completed = cursor.batches_completed,
                last_identifier = cursor.last_identifier.as_deref().unwrap_or("-"),
                shards = shards.len(),
                "Pipeline status"
            );
        },
    }

    Ok(())
}
