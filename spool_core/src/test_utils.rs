use std::{
    io::Write,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    batch::Batch,
    decode::EventDecoder,
    error::SinkError,
    event::{Event, FieldValue},
    sink::Sink,
};

/// Builds an event with the given `seq` field.
pub fn test_event(seq: u64) -> Event {
    let line = format!(r#"{{"time":1700000000000,"type":"test","seq":{seq}}}"#);
    EventDecoder::default()
        .decode(&line, Utc::now())
        .expect("valid test line")
}

/// Records the `seq` field of every delivered event, batch by batch.
#[derive(Default)]
pub struct CollectingSink {
    batches: Mutex<Vec<Vec<u64>>>,
    numbers: Mutex<Vec<u64>>,
}

impl CollectingSink {
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(|b| b.len()).collect()
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.batches.lock().unwrap().iter().flatten().copied().collect()
    }

    pub fn records(&self) -> usize {
        self.batches.lock().unwrap().iter().map(|b| b.len()).sum()
    }

    /// [`Batch::sequence`] of every delivered batch, in delivery order.
    pub fn batch_numbers(&self) -> Vec<u64> {
        self.numbers.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sink for CollectingSink {
    async fn deliver(&self, batch: &Batch) -> Result<(), SinkError> {
        let seqs = batch
            .iter()
            .map(|event| match event.get("seq") {
                Some(FieldValue::Number(n)) => n.as_u64().unwrap_or(u64::MAX),
                _ => u64::MAX,
            })
            .collect();
        self.batches.lock().unwrap().push(seqs);
        self.numbers.lock().unwrap().push(batch.sequence());
        Ok(())
    }
}

/// Rejects every batch.
pub struct FailingSink;

#[async_trait]
impl Sink for FailingSink {
    async fn deliver(&self, _batch: &Batch) -> Result<(), SinkError> {
        Err(SinkError::Unavailable {
            message: "sink is down".to_string(),
        })
    }
}

/// Formatted log output, shared with the subscriber that writes it.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// A subscriber that writes INFO and above into this capture.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + use<> {
        let capture = self.clone();
        tracing_subscriber::fmt()
            .with_writer(move || capture.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
