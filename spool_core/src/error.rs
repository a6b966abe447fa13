use std::sync::Arc;

use snafu::Snafu;

use crate::batch::WorkerId;

/// A single input line could not be turned into an event.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum DecodeError {
    #[snafu(display("invalid json: {source}"))]
    InvalidJson {
        #[snafu(source(from(serde_json::Error, Arc::new)))]
        source: Arc<serde_json::Error>,
    },
    #[snafu(display("expected a json object, found {found}"))]
    NotAnObject { found: &'static str },
    #[snafu(display("line is not valid utf-8: {source}"))]
    InvalidUtf8 { source: std::str::Utf8Error },
}

/// A record does not fit the row schema.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum RowError {
    #[snafu(display("missing required field {field}"))]
    MissingField { field: String },
    #[snafu(display("field {field} expected {expected}, found {found}"))]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    #[snafu(display("unknown field {field}"))]
    UnknownField { field: String },
}

/// Sink error types.
///
/// Every error returned by a sink means the whole batch was not committed.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// The sink could not be reached or refused the call.
    #[snafu(display("sink unavailable: {message}"))]
    Unavailable { message: String },
    /// A record in the batch failed validation in strict mode.
    #[snafu(display("invalid record at index {index}: {source}"))]
    InvalidRecord { index: usize, source: RowError },
    #[snafu(display("failed to encode batch: {source}"))]
    Encode {
        #[snafu(source(from(serde_json::Error, Arc::new)))]
        source: Arc<serde_json::Error>,
    },
    /// Object store error.
    #[snafu(display("object store error: {message}"))]
    ObjectStore {
        message: &'static str,
        #[snafu(source(from(object_store::Error, Arc::new)))]
        source: Arc<object_store::Error>,
    },
    #[snafu(display("delivery failed after {attempts} attempts"))]
    RetriesExhausted {
        attempts: u32,
        #[snafu(source(from(SinkError, Box::new)))]
        source: Box<SinkError>,
    },
}

/// Pipeline error types.
///
/// Any of these ends the run with a non-zero exit status.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Invalid startup parameters. Detected before any task is spawned.
    #[snafu(display("configuration error: {message}"))]
    Configuration { message: String },
    /// Decode failure in fail-fast mode.
    #[snafu(display("failed to decode line {line_number}"))]
    Decode {
        line_number: u64,
        source: DecodeError,
    },
    /// Fatal delivery failure.
    #[snafu(display("worker {worker} failed to deliver batch"))]
    Sink { worker: WorkerId, source: SinkError },
    #[snafu(display("failed to read input"))]
    Io { source: std::io::Error },
    /// The task stopped because a sibling task failed.
    #[snafu(display("pipeline aborted"))]
    Aborted,
    #[snafu(display("worker {worker} panicked"))]
    WorkerPanicked { worker: WorkerId },
}

impl PipelineError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, PipelineError::Aborted)
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
