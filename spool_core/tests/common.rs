#![allow(dead_code)]

use std::{
    io::Write,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use spool_core::{Batch, FieldValue, PipelineOptions, Sink, SinkError};
use tokio::sync::watch;

/// `count` well-formed event lines, `seq` running from 0.
pub fn event_lines(count: u64) -> String {
    (0..count)
        .map(|seq| {
            format!(
                "{{\"time\":{},\"type\":\"t{}\",\"seq\":{seq}}}\n",
                1_700_000_000_000u64 + seq,
                seq % 3
            )
        })
        .collect()
}

pub fn test_options() -> PipelineOptions {
    PipelineOptions::default()
        .with_worker_count(4)
        .with_queue_capacity(16)
        .with_batch_size(7)
        .with_flush_interval(Duration::from_millis(5))
}

fn seq_of(field: Option<&FieldValue>) -> u64 {
    match field {
        Some(FieldValue::Number(n)) => n.as_u64().unwrap_or(u64::MAX),
        _ => u64::MAX,
    }
}

/// Records the `seq` of every delivered event, batch by batch.
#[derive(Default)]
pub struct CollectingSink {
    batches: Mutex<Vec<Vec<u64>>>,
}

impl CollectingSink {
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(|b| b.len()).collect()
    }

    /// Every delivered `seq`, sorted.
    pub fn sorted_sequences(&self) -> Vec<u64> {
        let mut seqs: Vec<_> = self.batches.lock().unwrap().iter().flatten().copied().collect();
        seqs.sort_unstable();
        seqs
    }

    pub fn records(&self) -> usize {
        self.batches.lock().unwrap().iter().map(|b| b.len()).sum()
    }
}

#[async_trait]
impl Sink for CollectingSink {
    async fn deliver(&self, batch: &Batch) -> Result<(), SinkError> {
        let seqs = batch.iter().map(|e| seq_of(e.get("seq"))).collect();
        self.batches.lock().unwrap().push(seqs);
        Ok(())
    }
}

/// Rejects every batch and counts the attempts.
#[derive(Default)]
pub struct FailingSink {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Sink for FailingSink {
    async fn deliver(&self, _batch: &Batch) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Unavailable {
            message: "table not found".to_string(),
        })
    }
}

/// Fails the first `failures` calls, then behaves like [`CollectingSink`].
pub struct FlakySink {
    failures: u32,
    calls: AtomicU32,
    pub inner: CollectingSink,
}

impl FlakySink {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
            inner: CollectingSink::default(),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sink for FlakySink {
    async fn deliver(&self, batch: &Batch) -> Result<(), SinkError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(SinkError::Unavailable {
                message: "backend error".to_string(),
            });
        }
        self.inner.deliver(batch).await
    }
}

/// Holds every delivery until the gate is opened.
pub struct GatedSink {
    open: watch::Receiver<bool>,
    pub started: AtomicUsize,
    pub inner: CollectingSink,
}

impl GatedSink {
    pub fn new() -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let sink = Self {
            open: rx,
            started: AtomicUsize::new(0),
            inner: CollectingSink::default(),
        };
        (sink, tx)
    }
}

#[async_trait]
impl Sink for GatedSink {
    async fn deliver(&self, batch: &Batch) -> Result<(), SinkError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.clone();
        open.wait_for(|open| *open)
            .await
            .map_err(|_| SinkError::Unavailable {
                message: "gate dropped".to_string(),
            })?;
        self.inner.deliver(batch).await
    }
}

/// An in-memory writer that can be inspected while a sink owns it.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).expect("utf-8 output")
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
