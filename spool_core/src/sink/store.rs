use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload, path::Path};
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::{
    batch::Batch,
    error::{EncodeSnafu, InvalidRecordSnafu, ObjectStoreSnafu, SinkError},
    options::TargetTable,
    schema::RowSchema,
    sink::Sink,
};

/// Trait for generating unique names for uploaded batches.
pub trait BatchIdGenerator: Send + Sync + 'static {
    fn generate_id(&self) -> String;
}

/// Generates unique IDs using the ULID algorithm.
#[derive(Debug, Clone)]
pub struct UlidBatchIdGenerator;

/// Uploads every batch as one newline-delimited json object.
///
/// Objects are written at `<project>/<dataset>/<table>/<id>.jsonl` with
/// create-only semantics, so a batch is either fully stored or not at all.
#[derive(Clone)]
pub struct ObjectStoreSink {
    object_store: Arc<dyn ObjectStore>,
    target: TargetTable,
    schema: Arc<RowSchema>,
    strict: bool,
    id_generator: Arc<dyn BatchIdGenerator>,
}

impl ObjectStoreSink {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        target: TargetTable,
        schema: Arc<RowSchema>,
        strict: bool,
        id_generator: Arc<dyn BatchIdGenerator>,
    ) -> Self {
        Self {
            object_store,
            target,
            schema,
            strict,
            id_generator,
        }
    }

    pub fn new_ulid(
        object_store: Arc<dyn ObjectStore>,
        target: TargetTable,
        schema: Arc<RowSchema>,
        strict: bool,
    ) -> Self {
        Self::new(
            object_store,
            target,
            schema,
            strict,
            Arc::new(UlidBatchIdGenerator),
        )
    }

    /// Path of a new object for the target table.
    pub fn new_object_path(&self) -> Path {
        let id = self.id_generator.generate_id();
        Path::from(format!("{}/{id}.jsonl", self.target.prefix()))
    }

    /// Serializes the rows of the batch.
    ///
    /// Returns the encoded rows and how many records were skipped.
    fn encode_batch(&self, batch: &Batch) -> Result<(BytesMut, usize), SinkError> {
        let mut content = BytesMut::with_capacity(batch.len() * 256);
        let mut skipped = 0;

        for (index, event) in batch.iter().enumerate() {
            let row = match self.schema.to_row(event, self.strict) {
                Ok(row) => row,
                Err(err) if self.strict => {
                    return Err(err).context(InvalidRecordSnafu { index });
                }
                Err(err) => {
                    warn!(
                        worker = %batch.worker(),
                        index,
                        error = %err,
                        "skipping invalid record"
                    );
                    skipped += 1;
                    continue;
                }
            };

            let line = serde_json::to_vec(&row).context(EncodeSnafu {})?;
            content.extend_from_slice(&line);
            content.extend_from_slice(b"\n");
        }

        Ok((content, skipped))
    }
}

#[async_trait]
impl Sink for ObjectStoreSink {
    async fn deliver(&self, batch: &Batch) -> Result<(), SinkError> {
        let (content, skipped) = self.encode_batch(batch)?;

        if content.is_empty() {
            debug!(worker = %batch.worker(), skipped, "no valid records in batch");
            return Ok(());
        }

        let path = self.new_object_path();
        let size = bytesize::ByteSize(content.len() as u64);

        self.object_store
            .put_opts(
                &path,
                PutPayload::from_bytes(content.freeze()),
                PutOptions {
                    mode: PutMode::Create,
                    ..Default::default()
                },
            )
            .await
            .context(ObjectStoreSnafu {
                message: "failed to upload batch",
            })?;

        debug!(
            worker = %batch.worker(),
            rows = batch.len() - skipped,
            skipped,
            %size,
            %path,
            "uploaded batch"
        );

        Ok(())
    }
}

impl BatchIdGenerator for UlidBatchIdGenerator {
    fn generate_id(&self) -> String {
        ulid::Ulid::new().to_string()
    }
}
