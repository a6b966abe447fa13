//! Delivery workers.
//!
//! Every worker competes with its siblings for events on the shared queue,
//! accumulates what it drained into a batch and hands the batch to the sink.
//! A worker cycles between accumulating and flushing until the reader has
//! signalled that the input is exhausted and the queue is empty.
use std::{sync::Arc, time::Duration};

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    batch::{Batch, WorkerId},
    error::{AbortedSnafu, PipelineError, Result},
    event::Event,
    metrics::PipelineMetrics,
    options::{FlushTrigger, PipelineOptions, SinkFailurePolicy},
    queue::{Dequeued, QueueReceiver},
    shutdown::ShutdownCoordinator,
    sink::SinkRef,
};

/// The subset of the pipeline options a worker needs.
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub flush_trigger: FlushTrigger,
    pub sink_failure: SinkFailurePolicy,
    pub debug: bool,
}

/// What a worker did before exiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub batches: u64,
    pub records: u64,
    pub dropped_batches: u64,
    pub dropped_records: u64,
    /// Size of the largest batch handed to the sink.
    pub largest_batch: usize,
}

pub struct DeliveryWorker {
    id: WorkerId,
    queue: QueueReceiver<Event>,
    sink: SinkRef,
    shutdown: Arc<ShutdownCoordinator>,
    options: WorkerOptions,
    metrics: Arc<PipelineMetrics>,
    report: WorkerReport,
    sequence: u64,
}

impl DeliveryWorker {
    pub fn new(
        id: WorkerId,
        queue: QueueReceiver<Event>,
        sink: SinkRef,
        shutdown: Arc<ShutdownCoordinator>,
        options: WorkerOptions,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            id,
            queue,
            sink,
            shutdown,
            options,
            metrics,
            report: WorkerReport::default(),
            sequence: 0,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Runs the worker until the input is drained.
    ///
    /// Returns early with [`PipelineError::Aborted`] when `abort` is
    /// cancelled, and cancels `abort` itself on a fatal sink error.
    pub async fn run(mut self, abort: CancellationToken) -> Result<WorkerReport> {
        let result = match self.options.flush_trigger {
            FlushTrigger::Ticker => self.run_ticker(&abort).await,
            FlushTrigger::Wake => self.run_wake(&abort).await,
        };

        if self.options.debug {
            info!(worker = %self.id, batches = self.report.batches, "worker is finished");
        } else {
            debug!(worker = %self.id, batches = self.report.batches, "worker is finished");
        }

        result.map(|_| self.report)
    }

    async fn run_ticker(&mut self, abort: &CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.options.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = abort.cancelled() => return AbortedSnafu {}.fail(),
                _ = ticker.tick() => {}
            }

            // Read the signal before draining. If it was already set, every
            // event has been enqueued and an empty drain means we are done.
            let finished = self.shutdown.is_finished();

            let mut batch = self.new_batch();
            self.queue
                .drain_into(self.options.batch_size, batch.events_mut())
                .await;

            if !batch.is_empty() {
                self.flush(batch, abort).await?;
            } else if finished {
                return Ok(());
            }
        }
    }

    async fn run_wake(&mut self, abort: &CancellationToken) -> Result<()> {
        let batch_size = self.options.batch_size;

        loop {
            let deadline = Instant::now() + self.options.flush_interval;
            let mut batch = self.new_batch();

            while batch.len() < batch_size {
                let dequeued = tokio::select! {
                    biased;
                    _ = abort.cancelled() => return AbortedSnafu {}.fail(),
                    dequeued = self.queue.dequeue_until(deadline) => dequeued,
                };

                match dequeued {
                    Dequeued::Item(event) => {
                        batch.push(event);
                        // A sibling parked in dequeue_until holds the queue;
                        // take what is free now and wait below instead.
                        let room = batch_size - batch.len();
                        self.queue.try_drain_into(room, batch.events_mut());
                    }
                    Dequeued::TimedOut | Dequeued::Closed => break,
                }
            }

            if batch.is_empty() {
                if self.shutdown.is_finished() {
                    self.queue.drain_into(batch_size, batch.events_mut()).await;
                    if batch.is_empty() {
                        return Ok(());
                    }
                } else {
                    // Only reached early when the queue closed without the
                    // finished signal, which means the reader failed.
                    tokio::select! {
                        biased;
                        _ = abort.cancelled() => return AbortedSnafu {}.fail(),
                        _ = tokio::time::sleep_until(deadline) => continue,
                    }
                }
            }

            self.flush(batch, abort).await?;
        }
    }

    fn new_batch(&self) -> Batch {
        Batch::new(self.id, self.sequence, 0)
    }

    /// Delivers the batch. A flush that started is never cancelled.
    async fn flush(&mut self, batch: Batch, abort: &CancellationToken) -> Result<()> {
        let rows = batch.len();
        let number = batch.sequence();
        self.sequence += 1;

        if self.options.debug {
            info!(worker = %self.id, batch = number, rows, "delivering batch");
        } else {
            debug!(worker = %self.id, batch = number, rows, "delivering batch");
        }

        let result = self.sink.deliver(&batch).await;
        drop(batch);

        match result {
            Ok(()) => {
                self.report.batches += 1;
                self.report.records += rows as u64;
                self.report.largest_batch = self.report.largest_batch.max(rows);
                self.metrics.delivered_batches.add(1, &[]);
                self.metrics.delivered_rows.add(rows as u64, &[]);
                self.metrics.batch_size.record(rows as u64, &[]);
                Ok(())
            }
            Err(err) => match self.options.sink_failure {
                SinkFailurePolicy::Fatal => {
                    error!(
                        worker = %self.id,
                        batch = number,
                        rows,
                        error = %err,
                        "batch delivery failed"
                    );
                    abort.cancel();
                    Err(PipelineError::Sink {
                        worker: self.id,
                        source: err,
                    })
                }
                SinkFailurePolicy::Drop => {
                    error!(
                        worker = %self.id,
                        batch = number,
                        rows,
                        error = %err,
                        "dropping batch after delivery failure"
                    );
                    self.report.dropped_batches += 1;
                    self.report.dropped_records += rows as u64;
                    self.metrics.dropped_rows.add(rows as u64, &[]);
                    Ok(())
                }
            },
        }
    }
}

impl From<&PipelineOptions> for WorkerOptions {
    fn from(options: &PipelineOptions) -> Self {
        Self {
            batch_size: options.batch_size,
            flush_interval: options.flush_interval,
            flush_trigger: options.flush_trigger,
            sink_failure: options.sink_failure,
            debug: options.debug,
        }
    }
}
