use std::sync::Arc;

use tokio::io::AsyncBufRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    batch::WorkerId,
    error::{PipelineError, Result},
    event::Event,
    metrics::PipelineMetrics,
    options::PipelineOptions,
    queue,
    reader::{InputReader, ReaderReport},
    shutdown::ShutdownCoordinator,
    sink::{RetryingSink, SinkRef},
    worker::{DeliveryWorker, WorkerOptions, WorkerReport},
};

/// Totals of a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub reader: ReaderReport,
    pub batches_delivered: u64,
    pub records_delivered: u64,
    pub batches_dropped: u64,
    pub records_dropped: u64,
    pub largest_batch: usize,
    /// Events left in the queue after every worker exited.
    pub residual_queue_len: usize,
}

/// Reader, queue and delivery workers wired to one sink.
pub struct Pipeline {
    options: PipelineOptions,
    sink: SinkRef,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    /// Creates a pipeline, validating the options.
    ///
    /// When the options carry a retry policy the sink is wrapped in a
    /// [`RetryingSink`].
    pub fn new(options: PipelineOptions, sink: SinkRef) -> Result<Self> {
        options.validate()?;

        let sink: SinkRef = match options.sink_retry {
            Some(policy) => Arc::new(RetryingSink::new(sink, policy)),
            None => sink,
        };

        Ok(Self {
            options,
            sink,
            metrics: Arc::new(PipelineMetrics::default()),
        })
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Runs until the input is exhausted and every accepted event was
    /// delivered, or until a fatal error.
    ///
    /// Cancelling `ct` stops reading and then drains what was already
    /// accepted.
    pub async fn run<R>(self, input: R, ct: CancellationToken) -> Result<PipelineReport>
    where
        R: AsyncBufRead + Unpin,
    {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let abort = CancellationToken::new();
        let (queue_tx, queue_rx) = queue::bounded::<Event>(self.options.queue_capacity);
        let worker_options = WorkerOptions::from(&self.options);

        let mut workers = Vec::with_capacity(self.options.worker_count);
        for id in 1..=self.options.worker_count {
            let worker = DeliveryWorker::new(
                WorkerId(id),
                queue_rx.clone(),
                self.sink.clone(),
                shutdown.clone(),
                worker_options,
                self.metrics.clone(),
            );
            let handle = shutdown.spawn_worker(worker.run(abort.clone()));
            workers.push((WorkerId(id), handle));
        }

        debug!(
            workers = self.options.worker_count,
            queue_capacity = self.options.queue_capacity,
            batch_size = self.options.batch_size,
            "pipeline started"
        );

        let reader = InputReader::new(
            input,
            self.options.decoder(),
            self.options.decode_failure,
            self.metrics.clone(),
        );
        let reader_result = reader.run(queue_tx, &shutdown, ct, abort.clone()).await;

        if reader_result.is_err() {
            abort.cancel();
        }

        shutdown.wait_for_workers().await;

        let mut report = PipelineReport::default();
        let mut worker_error = None;

        for (id, handle) in workers {
            let result = handle
                .await
                .unwrap_or_else(|_| Err(PipelineError::WorkerPanicked { worker: id }));

            match result {
                Ok(worker) => report.add_worker(&worker),
                Err(err) => worker_error = pick_error(worker_error, err),
            }
        }

        let reader_report = match reader_result {
            Ok(reader_report) => reader_report,
            Err(err) if err.is_aborted() => return Err(worker_error.unwrap_or(err)),
            Err(err) => return Err(err),
        };

        if let Some(err) = worker_error {
            return Err(err);
        }

        report.reader = reader_report;
        report.residual_queue_len = queue_rx.len().await;

        info!(
            lines = report.reader.lines,
            decode_errors = report.reader.decode_errors,
            batches = report.batches_delivered,
            records = report.records_delivered,
            dropped = report.records_dropped,
            "pipeline drained"
        );

        Ok(report)
    }
}

impl PipelineReport {
    fn add_worker(&mut self, worker: &WorkerReport) {
        self.batches_delivered += worker.batches;
        self.records_delivered += worker.records;
        self.batches_dropped += worker.dropped_batches;
        self.records_dropped += worker.dropped_records;
        self.largest_batch = self.largest_batch.max(worker.largest_batch);
    }
}

/// Keeps the error that caused the failure over the aborts it triggered.
fn pick_error(current: Option<PipelineError>, new: PipelineError) -> Option<PipelineError> {
    match current {
        Some(current) if !current.is_aborted() || new.is_aborted() => Some(current),
        _ => Some(new),
    }
}
