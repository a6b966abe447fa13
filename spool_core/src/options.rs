use std::{fmt, str::FromStr, time::Duration};

use crate::{
    decode::{DEFAULT_DENYLIST_SUFFIXES, DEFAULT_TIME_KEY, EventDecoder},
    error::{ConfigurationSnafu, Result},
    sink::RetryPolicy,
};

pub const DEFAULT_WORKER_COUNT: usize = 16;
pub const DEFAULT_QUEUE_CAPACITY: usize = 5000;
pub const DEFAULT_BATCH_SIZE: usize = 5000;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound on the number of delivery workers.
pub const MAX_WORKER_COUNT: usize = 1024;
/// Largest queue tokio's bounded channel can allocate.
pub const MAX_QUEUE_CAPACITY: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// What the reader does with a line it cannot decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeFailurePolicy {
    /// Log the error and continue with the next line.
    #[default]
    Skip,
    /// Stop the whole pipeline.
    FailFast,
}

/// What a worker does when the sink rejects a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SinkFailurePolicy {
    /// Stop the whole pipeline. The failed batch is lost.
    #[default]
    Fatal,
    /// Log the error, drop the batch and keep going.
    Drop,
}

/// When a worker flushes its batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Wake up every flush interval, drain what is ready and flush it.
    #[default]
    Ticker,
    /// Wait on the queue and flush when the batch is full or the flush
    /// interval has elapsed since the window opened.
    Wake,
}

/// Settings of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Number of delivery workers.
    pub worker_count: usize,
    /// Maximum number of events waiting between the reader and the workers.
    pub queue_capacity: usize,
    /// Maximum number of events in one delivered batch.
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub flush_trigger: FlushTrigger,
    pub decode_failure: DecodeFailurePolicy,
    pub sink_failure: SinkFailurePolicy,
    /// Retries around the sink. `None` delivers every batch once.
    pub sink_retry: Option<RetryPolicy>,
    /// Log every delivered batch at info level.
    pub debug: bool,
    /// Payload key holding the millisecond epoch timestamp.
    pub time_key: String,
    /// Payload keys ending with any of these are dropped.
    pub denylist_suffixes: Vec<String>,
}

/// Fully qualified sink table: `project.dataset.table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTable {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            flush_trigger: FlushTrigger::default(),
            decode_failure: DecodeFailurePolicy::default(),
            sink_failure: SinkFailurePolicy::default(),
            sink_retry: None,
            debug: false,
            time_key: DEFAULT_TIME_KEY.to_string(),
            denylist_suffixes: DEFAULT_DENYLIST_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl PipelineOptions {
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    pub fn with_flush_trigger(mut self, flush_trigger: FlushTrigger) -> Self {
        self.flush_trigger = flush_trigger;
        self
    }

    pub fn with_decode_failure(mut self, policy: DecodeFailurePolicy) -> Self {
        self.decode_failure = policy;
        self
    }

    pub fn with_sink_failure(mut self, policy: SinkFailurePolicy) -> Self {
        self.sink_failure = policy;
        self
    }

    pub fn with_sink_retry(mut self, policy: Option<RetryPolicy>) -> Self {
        self.sink_retry = policy;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_time_key(mut self, time_key: impl Into<String>) -> Self {
        self.time_key = time_key.into();
        self
    }

    pub fn with_denylist_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.denylist_suffixes = suffixes;
        self
    }

    pub fn decoder(&self) -> EventDecoder {
        EventDecoder::new(self.time_key.clone(), self.denylist_suffixes.clone())
    }

    /// Checks the tunables before anything is spawned.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("worker count", self.worker_count),
            ("queue capacity", self.queue_capacity),
            ("batch size", self.batch_size),
        ];

        for (name, value) in positive {
            if value == 0 {
                return ConfigurationSnafu {
                    message: format!("{name} must be greater than zero"),
                }
                .fail();
            }
        }

        let bounded = [
            ("worker count", self.worker_count, MAX_WORKER_COUNT),
            ("queue capacity", self.queue_capacity, MAX_QUEUE_CAPACITY),
        ];

        for (name, value, max) in bounded {
            if value > max {
                return ConfigurationSnafu {
                    message: format!("{name} must be at most {max}, got {value}"),
                }
                .fail();
            }
        }

        if self.flush_interval.is_zero() {
            return ConfigurationSnafu {
                message: "flush interval must be greater than zero",
            }
            .fail();
        }

        if self.time_key.is_empty() {
            return ConfigurationSnafu {
                message: "time key must not be empty",
            }
            .fail();
        }

        if self.denylist_suffixes.iter().any(|s| s.is_empty()) {
            return ConfigurationSnafu {
                message: "denylisted suffixes must not be empty",
            }
            .fail();
        }

        if let Some(retry) = &self.sink_retry {
            if retry.max_attempts == 0 {
                return ConfigurationSnafu {
                    message: "retry attempts must be greater than zero",
                }
                .fail();
            }
        }

        Ok(())
    }
}

impl TargetTable {
    /// Object path prefix for the table, `project/dataset/table`.
    pub fn prefix(&self) -> String {
        format!("{}/{}/{}", self.project, self.dataset, self.table)
    }
}

impl FromStr for TargetTable {
    type Err = crate::error::PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<_> = s.split('.').collect();

        let [project, dataset, table] = parts.as_slice() else {
            return ConfigurationSnafu {
                message: format!("target {s:?} is not of the form project.dataset.table"),
            }
            .fail();
        };

        if [project, dataset, table].iter().any(|p| p.is_empty()) {
            return ConfigurationSnafu {
                message: format!("target {s:?} has an empty component"),
            }
            .fail();
        }

        Ok(Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
        })
    }
}

impl fmt::Display for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}
