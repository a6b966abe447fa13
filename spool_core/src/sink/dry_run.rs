use std::{
    io::{self, Write},
    sync::Mutex,
};

use async_trait::async_trait;
use snafu::ResultExt;
use tracing::debug;

use crate::{
    batch::Batch,
    error::{EncodeSnafu, SinkError},
    sink::Sink,
};

/// Prints every event instead of delivering it.
///
/// Each record is written on its own line, prefixed by the worker that
/// drained it: `[03] {"time":...}`. The lines of one batch are never
/// interleaved with another batch.
pub struct DryRunSink<W> {
    out: Mutex<W>,
}

impl DryRunSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send + 'static> DryRunSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<W: Write + Send + 'static> Sink for DryRunSink<W> {
    async fn deliver(&self, batch: &Batch) -> Result<(), SinkError> {
        let worker = batch.worker();

        let mut block = String::new();
        for event in batch.iter() {
            let line = event.to_json_line().context(EncodeSnafu {})?;
            block.push_str(&format!("[{worker}] {line}\n"));
        }

        debug!(%worker, batch = batch.sequence(), rows = batch.len(), "dry-run batch");

        let mut out = self.out.lock().map_err(|_| SinkError::Unavailable {
            message: "dry-run output lock poisoned".to_string(),
        })?;

        out.write_all(block.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|err| SinkError::Unavailable {
                message: format!("failed to write dry-run output: {err}"),
            })
    }
}
