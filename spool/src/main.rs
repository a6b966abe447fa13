use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, ValueEnum};
use object_store::local::LocalFileSystem;
use snafu::ResultExt;
use spool_core::{
    DecodeFailurePolicy, DryRunSink, FieldMapping, FlushTrigger, ObjectStoreSink, Pipeline,
    PipelineOptions, RetryPolicy, RowSchema, SinkFailurePolicy, SinkRef, TargetTable,
    options::{
        DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKER_COUNT,
    },
};
use spool_observability::init_observability;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{
    InvalidArgumentSnafu, IoSnafu, ObjectStoreSnafu, ObservabilitySnafu, PipelineSnafu, Result,
};

mod error;

#[derive(Parser)]
#[command(name = "spool")]
#[command(about = "Batch newline-delimited json events into a table")]
#[command(version)]
struct Cli {
    /// The target table, as project.dataset.table.
    ///
    /// Required unless --dry-run is set.
    target: Option<String>,
    /// Read events from this file instead of stdin.
    #[arg(long)]
    input: Option<PathBuf>,
    /// Print batches to stdout instead of storing them.
    #[arg(long)]
    dry_run: bool,
    /// Fail the whole batch on the first record that does not fit the table.
    ///
    /// Without this flag unknown fields are ignored and invalid records are
    /// skipped.
    #[arg(long)]
    strict: bool,
    /// Log every delivered batch.
    #[arg(long)]
    debug: bool,
    /// Root directory of the table store.
    #[arg(long, env = "SPOOL_STORE_ROOT")]
    store_root: Option<PathBuf>,
    /// Extra payload column, as name:type.
    ///
    /// Repeat this flag to add multiple columns.
    #[arg(long = "column", value_name = "NAME:TYPE")]
    columns: Vec<FieldMapping>,
    /// Number of delivery workers.
    #[arg(long, default_value_t = DEFAULT_WORKER_COUNT)]
    workers: usize,
    /// Maximum number of events waiting for a worker.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,
    /// Maximum number of events in one batch.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    /// How long a worker accumulates events before flushing.
    #[arg(long, default_value_t = DEFAULT_FLUSH_INTERVAL.as_millis() as u64)]
    flush_interval_ms: u64,
    #[arg(long, value_enum, default_value_t = FlushTriggerArg::Ticker)]
    flush_trigger: FlushTriggerArg,
    #[arg(long, value_enum, default_value_t = DecodeErrorArg::Skip)]
    on_decode_error: DecodeErrorArg,
    #[arg(long, value_enum, default_value_t = SinkErrorArg::Fail)]
    on_sink_error: SinkErrorArg,
    /// Deliver every batch up to this many times before failing.
    #[arg(long)]
    retry_attempts: Option<u32>,
    /// Delay before the first retry. Doubles on every retry.
    #[arg(long, default_value = "100")]
    retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FlushTriggerArg {
    /// Flush on a fixed interval.
    Ticker,
    /// Flush when the batch is full or the interval elapsed.
    Wake,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DecodeErrorArg {
    /// Log the line and continue.
    Skip,
    /// Stop with an error.
    Fail,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SinkErrorArg {
    /// Stop with an error.
    Fail,
    /// Log and drop the batch.
    Drop,
}

#[tokio::main]
#[snafu::report]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _telemetry = init_observability(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        .context(ObservabilitySnafu {})?;

    let ct = CancellationToken::new();

    tokio::spawn({
        let ct = ct.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            warn!("interrupted. Draining accepted events");
            ct.cancel();
        }
    });

    let options = cli.pipeline_options();
    let sink = cli.new_sink()?;
    let pipeline = Pipeline::new(options, sink).context(PipelineSnafu {})?;

    let input = cli.open_input().await?;
    let report = pipeline.run(input, ct).await.context(PipelineSnafu {})?;

    info!(
        lines = report.reader.lines,
        accepted = report.reader.accepted,
        decode_errors = report.reader.decode_errors,
        batches = report.batches_delivered,
        records = report.records_delivered,
        dropped = report.records_dropped,
        largest_batch = report.largest_batch,
        interrupted = report.reader.interrupted,
        "done"
    );

    Ok(())
}

impl Cli {
    fn pipeline_options(&self) -> PipelineOptions {
        let retry = self
            .retry_attempts
            .map(|attempts| RetryPolicy::new(attempts, Duration::from_millis(self.retry_backoff_ms)));

        PipelineOptions::default()
            .with_worker_count(self.workers)
            .with_queue_capacity(self.queue_capacity)
            .with_batch_size(self.batch_size)
            .with_flush_interval(Duration::from_millis(self.flush_interval_ms))
            .with_flush_trigger(self.flush_trigger.into())
            .with_decode_failure(self.on_decode_error.into())
            .with_sink_failure(self.on_sink_error.into())
            .with_sink_retry(retry)
            .with_debug(self.debug)
    }

    fn new_sink(&self) -> Result<SinkRef> {
        if self.dry_run {
            return Ok(Arc::new(DryRunSink::stdout()));
        }

        let Some(target) = &self.target else {
            return InvalidArgumentSnafu {
                name: "target",
                message: "a target table is required unless --dry-run is set",
            }
            .fail();
        };
        let target: TargetTable = target.parse().context(PipelineSnafu {})?;

        let Some(store_root) = &self.store_root else {
            return InvalidArgumentSnafu {
                name: "store-root",
                message: "a store root is required unless --dry-run is set",
            }
            .fail();
        };

        std::fs::create_dir_all(store_root).context(IoSnafu { path: store_root })?;
        let store = LocalFileSystem::new_with_prefix(store_root).context(ObjectStoreSnafu {})?;

        let schema = self
            .columns
            .iter()
            .cloned()
            .fold(RowSchema::event_log(), RowSchema::with_field);

        info!(%target, store_root = %store_root.display(), strict = self.strict, "storing batches");

        Ok(Arc::new(ObjectStoreSink::new_ulid(
            Arc::new(store),
            target,
            Arc::new(schema),
            self.strict,
        )))
    }

    async fn open_input(&self) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
        let Some(path) = &self.input else {
            return Ok(Box::new(BufReader::new(tokio::io::stdin())));
        };

        let file = tokio::fs::File::open(path)
            .await
            .context(IoSnafu { path })?;

        Ok(Box::new(BufReader::new(file)))
    }
}

impl From<FlushTriggerArg> for FlushTrigger {
    fn from(arg: FlushTriggerArg) -> Self {
        match arg {
            FlushTriggerArg::Ticker => FlushTrigger::Ticker,
            FlushTriggerArg::Wake => FlushTrigger::Wake,
        }
    }
}

impl From<DecodeErrorArg> for DecodeFailurePolicy {
    fn from(arg: DecodeErrorArg) -> Self {
        match arg {
            DecodeErrorArg::Skip => DecodeFailurePolicy::Skip,
            DecodeErrorArg::Fail => DecodeFailurePolicy::FailFast,
        }
    }
}

impl From<SinkErrorArg> for SinkFailurePolicy {
    fn from(arg: SinkErrorArg) -> Self {
        match arg {
            SinkErrorArg::Fail => SinkFailurePolicy::Fatal,
            SinkErrorArg::Drop => SinkFailurePolicy::Drop,
        }
    }
}
