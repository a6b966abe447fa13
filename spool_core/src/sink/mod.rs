//! Destinations for delivered batches.
//!
//! Workers only see the two outcomes of [`Sink::deliver`]: the batch was
//! committed, or it was not. Which sink is used never changes how workers
//! accumulate and flush.
use std::sync::Arc;

use async_trait::async_trait;

use crate::{batch::Batch, error::SinkError};

mod dry_run;
mod retry;
mod store;

pub use self::dry_run::DryRunSink;
pub use self::retry::{RetryPolicy, RetryingSink};
pub use self::store::{BatchIdGenerator, ObjectStoreSink, UlidBatchIdGenerator};

/// A destination that commits whole batches.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    /// Delivers every event of the batch in a single all-or-nothing call.
    async fn deliver(&self, batch: &Batch) -> Result<(), SinkError>;
}

pub type SinkRef = Arc<dyn Sink>;

#[async_trait]
impl<S: Sink + ?Sized> Sink for Arc<S> {
    async fn deliver(&self, batch: &Batch) -> Result<(), SinkError> {
        self.as_ref().deliver(batch).await
    }
}
