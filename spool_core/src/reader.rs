use std::sync::Arc;

use chrono::Utc;
use snafu::ResultExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    decode::EventDecoder,
    error::{AbortedSnafu, DecodeError, InvalidUtf8Snafu, IoSnafu, PipelineError, Result},
    event::Event,
    metrics::PipelineMetrics,
    options::DecodeFailurePolicy,
    queue::QueueSender,
    shutdown::ShutdownCoordinator,
};

/// What the reader saw before the input ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderReport {
    /// Lines read, including undecodable ones.
    pub lines: u64,
    /// Events pushed onto the queue.
    pub accepted: u64,
    /// Lines that failed to decode. Blank lines count here too.
    pub decode_errors: u64,
    /// Reading stopped on request before the end of the input.
    pub interrupted: bool,
}

/// Reads newline-delimited json and feeds the queue.
///
/// Runs on a single task. Each line is stamped with the current time,
/// decoded, and enqueued, waiting for room when the queue is full.
pub struct InputReader<R> {
    input: R,
    decoder: EventDecoder,
    decode_failure: DecodeFailurePolicy,
    metrics: Arc<PipelineMetrics>,
}

impl<R: AsyncBufRead + Unpin> InputReader<R> {
    pub fn new(
        input: R,
        decoder: EventDecoder,
        decode_failure: DecodeFailurePolicy,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            input,
            decoder,
            decode_failure,
            metrics,
        }
    }

    /// Reads until the end of the input, then sets the finished signal.
    ///
    /// `stop` ends reading early but still sets the finished signal, so
    /// everything already enqueued is delivered. `abort` ends reading
    /// without setting it.
    pub async fn run(
        mut self,
        queue: QueueSender<Event>,
        shutdown: &ShutdownCoordinator,
        stop: CancellationToken,
        abort: CancellationToken,
    ) -> Result<ReaderReport> {
        let mut report = ReaderReport::default();
        let mut buf = Vec::with_capacity(4096);

        loop {
            buf.clear();

            let read = tokio::select! {
                biased;
                _ = abort.cancelled() => return AbortedSnafu {}.fail(),
                _ = stop.cancelled() => {
                    report.interrupted = true;
                    break;
                }
                read = self.input.read_until(b'\n', &mut buf) => read.context(IoSnafu {})?,
            };

            if read == 0 {
                break;
            }

            report.lines += 1;
            self.metrics.input_lines.add(1, &[]);
            let line_number = report.lines;

            let event = match self.decode(trim_line_ending(&buf)) {
                Ok(event) => event,
                Err(err) => {
                    report.decode_errors += 1;
                    self.metrics.decode_errors.add(1, &[]);

                    match self.decode_failure {
                        DecodeFailurePolicy::Skip => {
                            warn!(line_number, error = %err, "skipping line that failed to decode");
                            continue;
                        }
                        DecodeFailurePolicy::FailFast => {
                            error!(line_number, error = %err, "failed to decode line");
                            return Err(PipelineError::Decode {
                                line_number,
                                source: err,
                            });
                        }
                    }
                }
            };

            tokio::select! {
                biased;
                _ = abort.cancelled() => return AbortedSnafu {}.fail(),
                sent = queue.enqueue(event) => {
                    // Every worker is gone, which only happens after a failure.
                    if sent.is_err() {
                        return AbortedSnafu {}.fail();
                    }
                }
            }

            report.accepted += 1;
        }

        shutdown.mark_finished();

        debug!(
            lines = report.lines,
            accepted = report.accepted,
            decode_errors = report.decode_errors,
            interrupted = report.interrupted,
            "input is exhausted"
        );

        Ok(report)
    }

    fn decode(&self, line: &[u8]) -> Result<Event, DecodeError> {
        let line = std::str::from_utf8(line).context(InvalidUtf8Snafu {})?;
        self.decoder.decode(line, Utc::now())
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
