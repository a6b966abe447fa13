//! Concurrent batch ingestion of newline-delimited json events.
//!
//! ## Data flow
//!
//! **Reader**: input lines -> [`Event`] -> bounded queue.
//!
//! **Workers**: bounded queue -> [`Batch`] -> [`Sink`].
//!
//! The reader sets the finished signal once the input is exhausted. Workers
//! exit only when they see that signal and find the queue empty, and the
//! pipeline returns only after every worker has exited.
pub mod batch;
pub mod decode;
pub mod error;
pub mod event;
pub mod metrics;
pub mod options;
pub mod pipeline;
pub mod queue;
pub mod reader;
pub mod schema;
pub mod shutdown;
pub mod sink;
pub mod worker;

#[cfg(test)]
pub mod test_utils;

pub use batch::{Batch, WorkerId};
pub use decode::EventDecoder;
pub use error::{DecodeError, PipelineError, Result, RowError, SinkError};
pub use event::{Event, FieldValue};
pub use options::{
    DecodeFailurePolicy, FlushTrigger, PipelineOptions, SinkFailurePolicy, TargetTable,
};
pub use pipeline::{Pipeline, PipelineReport};
pub use schema::{FieldMapping, FieldSource, FieldType, RowSchema};
pub use shutdown::ShutdownCoordinator;
pub use sink::{DryRunSink, ObjectStoreSink, RetryPolicy, RetryingSink, Sink, SinkRef};
